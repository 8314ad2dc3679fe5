//! Time-windowed analytics over soil/climate sensor readings.
//!
//! A session seeds a bounded series from the reading store for the selected
//! window, keeps it current from the store's live insert feed, and publishes
//! statistics and threshold alerts for the latest reading.

pub mod alerts;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod http;
pub mod ingest;
pub mod reading;
pub mod series;
pub mod session;
pub mod stats;
pub mod store;
pub mod window;
