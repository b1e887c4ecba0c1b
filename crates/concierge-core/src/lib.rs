pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ConciergeConfig;
pub use error::{ConciergeError, Result};
pub use types::*;
