//! Core types for the RGB + depth receiver.
//!
//! - [`FramePacket`] / [`PacketHeader`] are one demultiplexed wire record
//! - [`SessionMetadata`] is the one-time session description that sizes everything else
//! - [`Frame`] is a fully decoded pixel buffer as published to consumers
//! - [`UpdateRate`] controls how often a consumer sees latest-frame updates
//!
//! ```rust
//! use depthwire::types::{Frame, FrameGeometry, PixelFormat};
//!
//! let geometry = FrameGeometry::new(640, 480);
//! let frame = Frame::new(640, 480, PixelFormat::Bgr24, vec![0; geometry.frame_size()]).unwrap();
//! assert_eq!(frame.geometry(), geometry);
//! ```

mod frame;
mod metadata;
mod packet;
mod update_rate;

pub use frame::{Frame, FrameGeometry, PixelFormat, StreamKind};
pub use metadata::{ColorEncoding, MAX_DIMENSION, SessionMetadata};
pub use packet::{FramePacket, HEADER_SIZE, PacketHeader, PacketKind};
pub use update_rate::UpdateRate;
