//! Circuit Breaker
//!
//! One breaker per registered provider. A failing provider is fast-failed
//! instead of being called again, and recovery is probed automatically.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |                     Circuit Breaker                               |
//! +-------------------------------------------------------------------+
//! |                                                                   |
//! |    +---------+   failure_threshold   +--------+                   |
//! |    | CLOSED  | --------------------> |  OPEN  | <------+          |
//! |    +---------+                       +--------+        |          |
//! |         ^                                 |            |          |
//! |         |                                 | reset      | probe    |
//! |         |                                 | timeout    | fails    |
//! |         |                                 v            |          |
//! |         |        probe succeeds    +-------------+     |          |
//! |         +------------------------- | HALF-OPEN   | ----+          |
//! |                                    +-------------+                |
//! |                                    (one probe only)               |
//! +-------------------------------------------------------------------+
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use vgen_foundation::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("primary", CircuitBreakerConfig::default());
//!
//! match breaker.try_acquire() {
//!     Ok(permit) => match call_provider().await {
//!         Ok(_) => permit.succeed(),
//!         Err(_) => permit.fail(),
//!     },
//!     Err(open) => tracing::warn!(%open, "provider unavailable"),
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod state;

pub use config::CircuitBreakerConfig;
pub use metrics::{CircuitBreakerMetrics, CircuitStatistics, StateTransition};
pub use state::{CallPermit, CircuitBreaker, CircuitBreakerError, CircuitOpenError, State};
