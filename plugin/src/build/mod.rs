//! External build support

pub mod engine;
pub mod pipeline;
