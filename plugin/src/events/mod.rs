//! Deployment progress events

pub mod activity_log;
pub mod bus;
pub mod listener;
