//! Data models

pub mod account;
pub mod project;
pub mod step;
