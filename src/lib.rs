//! mongo-scroll-extract library
//!
//! Core functionality of the `mongo-scroll-extract` tool: a concurrent,
//! cancellable, all-or-nothing extraction pipeline over a MongoDB cursor.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management
//! - `error`: Error types and handling
//! - `extract`: Page producer, decode workers, aggregator and sinks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mongo_scroll_extract::config::Config;
//! use mongo_scroll_extract::connection::ConnectionManager;
//! use mongo_scroll_extract::extract::{
//!     ExtractionCoordinator, ExtractionFilter, JsonFileSink, MongoCursorSource, ProgressTracker,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.connection.database = Some("partner".to_string());
//!     config.connection.collection = Some("dhisco".to_string());
//!
//!     let mut manager = ConnectionManager::new(config.connection.clone());
//!     manager.connect().await?;
//!
//!     let mut coordinator = ExtractionCoordinator::new(
//!         Arc::new(MongoCursorSource::new(manager.collection()?)),
//!         ExtractionFilter::new("code", "no_matching"),
//!         Arc::new(ProgressTracker::new(false)),
//!         Box::new(JsonFileSink::new("data.json", false)?),
//!     );
//!     let summary = coordinator.execute().await?;
//!     println!("{} records extracted", summary.records_extracted);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod extract;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{ExtractError, Result};
pub use extract::{DecodedRecord, ExtractionCoordinator, ExtractionFilter, ExtractionSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
