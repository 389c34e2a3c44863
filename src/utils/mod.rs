//! Utility modules

pub mod error;
pub mod resp;

pub use error::{ConnectionError, RouteError};
pub use resp::{RespDecoder, RespEncoder, RespValue};
