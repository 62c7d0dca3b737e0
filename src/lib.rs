//! Drive a pan-tilt-zoom camera over a serial VISCA link.
//!
//! [`visca`] turns camera operations into frames and replies back into values,
//! [`link::CameraLink`] runs the request/reply transactions on a
//! [`channel::ByteChannel`], and [`handle::spawn_link`] shares a link between
//! tasks.

pub mod channel;
pub mod handle;
pub mod link;
pub mod protos;
pub mod serial;
pub mod visca;
pub mod viscaerror;

pub use crate::channel::{ByteChannel, StreamChannel};
pub use crate::handle::{spawn_link, LinkHandle};
pub use crate::link::{CameraLink, LinkConfig};
pub use crate::protos::{Operation, Position};
pub use crate::serial::{open_port, SerialProfile};
pub use crate::visca::{Direction, ZoomDirection};
pub use crate::viscaerror::{ViscaError, ViscaResult};
