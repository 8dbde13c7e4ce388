//! Build-and-deploy operations

pub mod fsm;
pub mod lease;
pub mod orchestrator;
pub mod patch;
pub mod stage;
