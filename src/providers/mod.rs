//! Packet providers
//!
//! - [`TcpProvider`] accepts one client on a bound address and reads its packets
//! - [`StreamProvider`] reads packets from any async byte stream (pipes, test duplexes)

mod stream;
mod tcp;

pub use stream::StreamProvider;
pub use tcp::TcpProvider;
