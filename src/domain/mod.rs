pub mod battery;
pub mod date_hour;
pub mod forecast;
pub mod hourly;
pub mod schedule;
pub mod strategy;
pub mod tariff;

pub use battery::*;
pub use date_hour::*;
pub use forecast::*;
pub use hourly::*;
pub use schedule::*;
pub use strategy::*;
pub use tariff::*;
