use serde::{Deserialize, Serialize};

use super::{DateHour, Strategy};

/// One persisted planning decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningRow {
    pub hour: DateHour,
    pub strategy: Strategy,
}

impl PlanningRow {
    pub fn new(hour: DateHour, strategy: Strategy) -> Self {
        Self { hour, strategy }
    }
}
