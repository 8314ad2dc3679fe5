use crate::reading::Reading;
use serde::{Deserialize, Serialize};

/// Alert thresholds supplied by the settings side. The engine only reads them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub moisture_low: f64,
    pub temp_low: f64,
    pub temp_high: f64,
    pub light_low: f64,
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            ("moisture_low", self.moisture_low),
            ("temp_low", self.temp_low),
            ("temp_high", self.temp_high),
            ("light_low", self.light_low),
        ];
        if let Some((name, _)) = values.iter().find(|(_, value)| !value.is_finite()) {
            return Err(format!("{name} must be a finite number"));
        }
        if self.temp_low > self.temp_high {
            return Err(format!(
                "temp_low ({}) must not exceed temp_high ({})",
                self.temp_low, self.temp_high
            ));
        }
        Ok(())
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            moisture_low: 30.0,
            temp_low: 10.0,
            temp_high: 35.0,
            light_low: 200.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertState {
    pub low_moisture: bool,
    pub low_light: bool,
    pub temp_out_of_range: bool,
}

/// Stateless check of the latest reading. No debounce: every call stands alone.
pub fn evaluate(latest: &Reading, thresholds: &ThresholdConfig) -> AlertState {
    AlertState {
        low_moisture: latest.moisture < thresholds.moisture_low,
        low_light: latest.light_lux < thresholds.light_low,
        temp_out_of_range: latest.temperature < thresholds.temp_low
            || latest.temperature > thresholds.temp_high,
    }
}
