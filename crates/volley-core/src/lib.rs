pub mod config;
pub mod error;
pub mod estimator;
pub mod io;
pub mod loader;
pub mod paths;
pub mod persistence;
pub mod report;
pub mod schedule;
pub mod sentinel;
pub mod types;
pub mod world;

pub use error::{Result, VolleyError};
