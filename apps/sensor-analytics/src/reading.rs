use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Store-assigned ordering key. Breaks ties between readings sharing a `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingId(pub i64);

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: ReadingId,
    pub device_id: String,
    pub moisture: f64,
    pub temperature: f64,
    pub light_lux: f64,
    pub created_at: DateTime<Utc>,
}

impl Reading {
    pub fn ordering_key(&self) -> (DateTime<Utc>, ReadingId) {
        (self.created_at, self.id)
    }

    pub fn cmp_order(&self, other: &Reading) -> Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Moisture => self.moisture,
            Metric::Temperature => self.temperature,
            Metric::Light => self.light_lux,
        }
    }
}

/// A reading accepted at the ingest boundary that the store has not assigned an id to yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub device_id: String,
    pub moisture: f64,
    pub temperature: f64,
    pub light_lux: f64,
    pub created_at: DateTime<Utc>,
}

impl NewReading {
    pub fn into_reading(self, id: ReadingId) -> Reading {
        Reading {
            id,
            device_id: self.device_id,
            moisture: self.moisture,
            temperature: self.temperature,
            light_lux: self.light_lux,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Moisture,
    Temperature,
    Light,
}
