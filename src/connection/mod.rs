//! Consumer-facing connection handles

mod receiver;
#[cfg(test)]
mod tests;

pub use receiver::ReceiverConnection;
