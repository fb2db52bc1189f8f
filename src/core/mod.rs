// Public modules
pub mod archive;
pub mod build;
pub mod config;
pub mod context;
pub mod defaults;
pub mod deploy;
pub mod error;
pub mod hosts;
pub mod install;
pub mod listing;
pub mod metadata;
pub mod output;
pub mod rollback;
pub mod scratch;
pub mod serving;
pub mod ssh;
pub mod versions;

// Re-export common types for convenience
pub use context::{Connector, ExecutionContext, LocalContext, RemoteContext, SshConnector, Target};
pub use error::{Error, ErrorCategory, ErrorCode, Result};
pub use hosts::{HostPolicy, HostReport};
pub use output::{BulkResult, BulkSummary, ItemOutcome};
pub use scratch::{Scratchpad, Scratchpads};
