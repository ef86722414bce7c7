//! Bounded-concurrency throttling with a per-slot cooldown.
//!
//! A [`Throttler`] owns a fixed number of slots. Each call to [`Throttler::throttle`]
//! takes a slot, runs the operation and hands the slot back, after which the slot rests
//! for the configured cooldown. Callers that find no free slot wait in FIFO order.
//!
//! ```
//! use slot_throttler::{Throttler, ThrottlerConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let throttler = Throttler::new(ThrottlerConfig::new(2, Duration::from_millis(10)));
//! let answer = throttler.throttle(|| async { 42 }).await;
//! assert_eq!(answer, 42);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
mod slot_pool;
pub mod throttler;

pub use config::{Config, ThrottlerConfig};
pub use error::{ThrottlerError, ThrottlerResult};
pub use metrics::ThrottleMetrics;
pub use throttler::{Throttler, ThrottlerStats};
