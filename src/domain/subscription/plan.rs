//! Subscription plan.

use serde::{Deserialize, Serialize};

/// The plan a subscription record is on.
///
/// Exactly one paid plan exists; everything else is the one-shot trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Non-renewable trial granted once per account.
    Trial,
    /// The paid practice plan.
    Paid,
}

impl Plan {
    /// Stable string form used in persistence and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Trial => "trial",
            Plan::Paid => "paid",
        }
    }
}
