use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString};

/// Dispatch mode for one hour.
///
/// The discriminants define the digit each variant takes when a candidate
/// index is read as a base-4 number.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[repr(u8)]
pub enum Strategy {
    /// Maximize self-consumption, the inverter decides
    #[default]
    Default = 0,
    /// Keep the battery level, trade the balance with the grid
    Preserve = 1,
    /// Charge at full rate, buying whatever production doesn't cover
    Charge = 2,
    /// Discharge at full rate, selling the excess
    Discharge = 3,
}

impl Strategy {
    pub fn from_digit(digit: u64) -> Self {
        match digit % Self::COUNT as u64 {
            0 => Strategy::Default,
            1 => Strategy::Preserve,
            2 => Strategy::Charge,
            _ => Strategy::Discharge,
        }
    }

    pub fn digit(self) -> u64 {
        self as u64
    }
}
