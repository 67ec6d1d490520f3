//! Subscription lifecycle configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Trial and scheduler settings
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// Trial length in days, granted once per account
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,

    /// Reminder windows before trial end, in days (outermost first)
    #[serde(default = "default_reminder_days")]
    pub reminder_days: Vec<i64>,

    /// Sweep cadence in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl SubscriptionConfig {
    /// Validate subscription configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.trial_days < 1 {
            return Err(ValidationError::InvalidTrialLength);
        }
        if self.reminder_days.is_empty()
            || self.reminder_days.iter().any(|d| *d < 1)
            || self
                .reminder_days
                .windows(2)
                .any(|pair| pair[0] <= pair[1])
        {
            return Err(ValidationError::InvalidReminderWindows);
        }
        Ok(())
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            trial_days: default_trial_days(),
            reminder_days: default_reminder_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_trial_days() -> i64 {
    90
}

fn default_reminder_days() -> Vec<i64> {
    vec![7, 1]
}

fn default_sweep_interval() -> u64 {
    86_400
}
