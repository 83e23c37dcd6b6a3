//! Common utilities shared by the ACME renewer crates.
//!
//! - [`RetryPolicy`] - bounded retry with a fixed delay between attempts

pub mod retry;

pub use retry::RetryPolicy;
