//! Application wiring

pub mod state;
