//! Logic Module - Telemetry Engines
//!
//! Chứa các engines xử lý: Session, Collector, Stress Labeler, Model.
//!
//! ## Pipeline layout
//! - `session/` - ELM327 link, handshake, PID scan, read cycles
//! - `features/` - Derived signals and the model feature layout
//! - `model/` - Forest trainer, artifact store, online predictor

// Core pipeline
pub mod collector;
pub mod config;
pub mod reading;
pub mod session;
pub mod stress;

// Derived data and learning
pub mod features;
pub mod model;

// Persistence and shipping
pub mod dataset;
pub mod store;
pub mod uploader;
