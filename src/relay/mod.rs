//! Core relay logic: ingestion, template resolution, status correlation,
//! and reminder scheduling.

pub mod ingest;
pub mod phone;
pub mod scheduler;
pub mod signature;
pub mod status;
pub mod templates;
pub mod worker;
