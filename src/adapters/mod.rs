//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `artifacts`: JSON model/scaler artifacts with SHA-256 manifest checks
//! - `csv`: CSV file record log (default)
//! - `sqlite`: SQLite record log
//! - `sanitize`: clinical value filtering for logs

pub mod artifacts;
pub mod csv;
mod error;
pub mod sanitize;
pub mod sqlite;

pub use error::StorageError;
