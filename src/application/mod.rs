//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod analytics;
mod export;
mod patients;
mod prediction;

pub use analytics::{AnalyticsService, OverviewStats};
pub use export::ExportService;
pub use patients::PatientService;
pub use prediction::{PredictionRequest, PredictionService};
