//! Stand-ins for the inverter and the forecast feeds.
//!
//! - **SimulatedTelemetry**: battery level integrated from the instructions it receives
//! - **SyntheticForecaster**: solar, load and price profiles shaped like a typical day

pub mod battery;
pub mod forecaster;

pub use battery::SimulatedTelemetry;
pub use forecaster::SyntheticForecaster;
