//! Cooperative cancellation for pipeline runs.
//!
//! A [`CancellationToken`] is shared by every pipeline and branch of a run.
//! The runner races each stage against [`CancellationToken::cancelled`], so
//! firing the token drops in-flight external calls.

mod token;

pub use token::CancellationToken;
