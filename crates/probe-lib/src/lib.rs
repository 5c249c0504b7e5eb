//! Library for on-device Android telemetry sampling
//!
//! This crate provides the core functionality for:
//! - Running diagnostic queries through the device bridge
//! - Extracting a fixed-schema feature row from raw output
//! - Appending rows to a delimited store
//! - Driving the sampling loop with structured logging

pub mod collector;
pub mod config;
pub mod extractor;
pub mod models;
pub mod observability;
pub mod store;

pub use self::config::{ConfigError, ProbeConfig};
pub use extractor::{ExtractorConfig, FeatureExtractor};
pub use models::*;
pub use observability::{RunStats, StructuredLogger};
pub use store::CsvStore;
