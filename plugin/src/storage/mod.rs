//! Module layout and plugin settings

pub mod layout;
pub mod settings;
