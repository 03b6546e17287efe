#![forbid(unsafe_code)]

//! Remote origin access seam.
//!
//! Remote repositories talk to their origin server exclusively through the
//! [`Origin`] trait, so the engine can be tested against a mock origin and
//! the HTTP client stays a replaceable detail.

mod client;
mod error;
mod traits;
mod types;

pub use client::HttpOrigin;
pub use error::{NetError, NetResult};
pub use traits::Origin;
pub use types::{Headers, OriginOptions};

#[cfg(feature = "mock")]
pub use traits::OriginMock;
