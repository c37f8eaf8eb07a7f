//! aws-exec Library
//!
//! HTTP service that runs AWS CLI command strings under a fixed credential
//! profile and returns their combined output.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use aws_exec::AwsCommandServer;
//!
//! let mut server = AwsCommandServer::new();
//! server.start("0.0.0.0:80").await?;
//! // ...
//! server.stop().await?;
//! ```

pub mod config;
pub mod executor;
pub mod handlers;
pub mod init;
pub mod server;
pub mod types;

// Re-export main server type
pub use server::AwsCommandServer;

pub use executor::{AwsCommandExecutor, CommandExecutor, ExecutionProfile};
pub use init::init_tracing;
pub use types::*;
