use crate::error::IngestError;
use crate::reading::NewReading;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Raw submission from a device. Numeric fields are loose: numbers, numeric strings, or absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSubmission {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub soil_moisture: Option<JsonValue>,
    #[serde(default)]
    pub temperature: Option<JsonValue>,
    #[serde(default)]
    pub light_lux: Option<JsonValue>,
}

impl IngestSubmission {
    /// Coerce into a storable reading stamped with `received_at`.
    pub fn into_new_reading(self, received_at: DateTime<Utc>) -> Result<NewReading, IngestError> {
        let device_id = self
            .device_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(IngestError::MissingDeviceId)?
            .to_string();

        Ok(NewReading {
            device_id,
            moisture: coerce_number(self.soil_moisture.as_ref()).clamp(0.0, 100.0),
            temperature: coerce_number(self.temperature.as_ref()),
            light_lux: coerce_number(self.light_lux.as_ref()).max(0.0),
            created_at: received_at,
        })
    }
}

fn coerce_number(value: Option<&JsonValue>) -> f64 {
    let parsed = match value {
        Some(JsonValue::Number(number)) => number.as_f64(),
        Some(JsonValue::String(raw)) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|value| value.is_finite()).unwrap_or(0.0)
}
