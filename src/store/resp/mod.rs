//! RESP (Redis serialization protocol, v2) client backend.

pub mod client;
pub mod codec;
pub mod frame;

pub use client::{RespOptions, RespStore};
pub use codec::RespCodec;
pub use frame::Frame;
