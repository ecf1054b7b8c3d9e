#![cfg_attr(not(test), no_std)]

// must stay first so the logging macros are visible to every module
mod fmt;

pub mod bms_thread;
pub mod config;
pub mod events;
pub mod ltc_management;
pub mod soc;
pub mod types;
