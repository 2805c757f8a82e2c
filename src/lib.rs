#![forbid(unsafe_code)]

//! `booking-relay` — WhatsApp reservation notification relay.
//!
//! Receives reservation events from a booking platform webhook, resolves
//! them to provider message templates, dispatches through a token-cached
//! WhatsApp client, correlates delivery-status callbacks, and runs a
//! polling worker for scheduled reservation reminders.

pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod persistence;
pub mod provider;
pub mod relay;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
