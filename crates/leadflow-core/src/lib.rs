pub mod attempt;
pub mod config;
pub mod counter;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod import;
pub mod io;
pub mod lead;
pub mod paths;
pub mod scheduler;
pub mod score;
pub mod sequence;
pub mod stats;
pub mod store;
pub mod types;

pub use error::{LeadflowError, Result};
