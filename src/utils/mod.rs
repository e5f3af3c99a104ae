pub mod chunk;
pub mod constants;
pub mod logging;
pub mod time;

pub use chunk::{batched, Batched};
pub use constants::*;
pub use logging::init_logging;
pub use time::{floor_to_period, timeout_duration, Clock, MonotonicClock, SystemClock};
