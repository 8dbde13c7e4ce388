//! Cloud account loading and storage account creation

pub mod load_task;
pub mod storage_task;
