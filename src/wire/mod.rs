//! Binary framing for the capture stream.
//!
//! [`format`] knows the 18-byte header layout; [`PacketReader`] pulls complete
//! records off any `AsyncRead` and turns a short read into "connection closed".

pub mod format;
mod reader;

pub use format::DEFAULT_MAX_PAYLOAD;
pub use reader::PacketReader;
