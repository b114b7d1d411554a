//! Per-device runtime options

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default auto-clear timeout for alarm and occupancy fields, in seconds
pub const DEFAULT_CLEAR_TIMEOUT: f64 = 90.0;

/// Options a user sets per device, consulted by decoders and encoders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    /// Seconds after the last IAS notification before alarms are cleared, 0 disables
    pub alarm_timeout: Option<f64>,
    /// Seconds after the last occupancy report before occupancy is cleared, 0 disables
    pub occupancy_timeout: Option<f64>,
    /// Default transition for light commands, in seconds
    pub transition: Option<f64>,
    /// Publish pin codes in lock state
    pub expose_pin: bool,
    /// Vendor-specific options
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl DeviceOptions {
    #[must_use]
    pub fn alarm_timeout(&self) -> f64 {
        self.alarm_timeout.unwrap_or(DEFAULT_CLEAR_TIMEOUT)
    }

    #[must_use]
    pub fn occupancy_timeout(&self) -> f64 {
        self.occupancy_timeout.unwrap_or(DEFAULT_CLEAR_TIMEOUT)
    }

    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_extras() {
        let options: DeviceOptions =
            serde_json::from_str(r#"{"alarm_timeout": 5, "invert_cover": true}"#).unwrap();
        assert_eq!(options.alarm_timeout(), 5.0);
        assert_eq!(options.occupancy_timeout(), DEFAULT_CLEAR_TIMEOUT);
        assert!(!options.expose_pin);
        assert_eq!(options.extra("invert_cover"), Some(&Value::Bool(true)));
    }
}
