//! Command implementations for the RepairNet launcher

pub mod config;
pub mod context;
pub mod hosts;
pub mod incidents;
pub mod output;
pub mod pass;
