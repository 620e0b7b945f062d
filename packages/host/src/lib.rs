//! coapling-host: the runtime collaborators hosted apps run on.
//!
//! Each app owns one [`AppContext`], a cooperative single-threaded work
//! queue where its handlers, interval ticks and async completion
//! callbacks run without preempting one another. The process-wide
//! [`IntervalScheduler`] posts periodic ticks into those contexts,
//! [`Clock`] supplies wall and monotonic time, and [`Properties`] answers
//! configuration lookups.

mod clock;
mod context;
mod properties;
mod scheduler;

pub use clock::{Clock, SystemClock};
pub use context::AppContext;
pub use properties::{Properties, PropertyError};
pub use scheduler::{IntervalHandle, IntervalScheduler};
