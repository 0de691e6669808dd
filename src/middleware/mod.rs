//! HTTP framework adapters.
//!
//! Adapters extract `(path, method, ip, user)` from a request, run it
//! through the engine, and translate the [`Decision`] into response
//! headers and status codes. The engine itself never touches a request
//! type.
//!
//! [`Decision`]: crate::decision::Decision

mod layer;

pub use layer::{RateLimitLayer, RateLimitService};
