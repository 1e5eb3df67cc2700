//! Voice model gate for Mesmer
//!
//! Tracks whether the large XTTS model asset is present locally, and owns the
//! one-at-a-time background download that provisions it.

pub mod download;
pub mod gate;

pub use download::{HttpZipFetcher, ModelFetcher};
pub use gate::{ModelGate, ModelStatus, ModelStatusReport};
