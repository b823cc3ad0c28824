pub mod client;
pub mod execution;
pub mod model;
pub mod monitoring;
pub mod optimizer;
pub mod performance;
pub mod storage;
pub mod types;
pub mod utils;

pub use crate::types::*;
