//! Domain model modules.

pub mod event;
pub mod message_log;
pub mod scheduled;
