//! Middleware modules for the TAGFORGE API
//!
//! - `rate_limit`: global per-IP flood limiter
//! - `client_ip`: client identification shared by the limiter and the
//!   `/build` quota
//!
//! # Middleware Order
//!
//! ```ignore
//! router
//!     // Innermost
//!     .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     .layer(from_fn(observability_middleware))
//!     // Outermost
//!     .layer(cors)
//! ```

pub mod client_ip;
mod rate_limit;

pub use client_ip::{client_ip, ClientAddress, ClientIpPolicy, UNKNOWN_CLIENT};
pub use rate_limit::{rate_limit_middleware, spawn_limiter_pruner, RateLimitError, RateLimitState};
