//! Roledeploy Library
//!
//! Build, package and deployment core of the cloud role tooling: the
//! deployment event bus, account loading, the build pipeline and the
//! operations built on top of them.

pub mod accounts;
pub mod app;
pub mod build;
pub mod cloud;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod filesys;
pub mod host;
pub mod logs;
pub mod models;
pub mod progress;
pub mod project;
pub mod storage;
pub mod workers;
