//! Background workers

pub mod undeploy;
