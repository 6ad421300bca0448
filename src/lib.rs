pub mod config;
pub mod distinguishers;
pub mod error;
pub mod leakage_model;
pub mod report;
pub mod scheduler;
pub mod trace;
pub mod util;

pub use crate::error::Error;
