//! Error handling for the extraction pipeline.
//!
//! Every stage of a run reports failures through [`ExtractError`]:
//! - Source errors raised while counting or paging through the remote cursor
//! - Decode errors raised by a worker that cannot read a record payload
//! - Cancellation observed by stages unwinding after another stage failed
//! - Persistence, configuration and connection errors around the core
//!
//! MongoDB driver errors are condensed into a short, structured description
//! (see [`mongo::describe_mongodb_error`]) before they are wrapped.
//!
//! # Example
//!
//! ```rust
//! use mongo_scroll_extract::error::{DecodeError, ExtractError, Result};
//!
//! fn decode_step() -> Result<()> {
//!     Err(DecodeError::new("42", "missing field `code`").into())
//! }
//!
//! assert!(matches!(decode_step(), Err(ExtractError::Decode(_))));
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, DecodeError, ExtractError, PersistError, Result, SourceError,
};
pub use mongo::{ErrorInfo, describe_mongodb_error};
