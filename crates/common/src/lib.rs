//! Common utilities and shared types for fedigraph.
//!
//! This crate provides foundational components used across all fedigraph crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use fedigraph_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("{} issued {}", config.server.url, id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{
    Config, DatabaseConfig, FederationConfig, LogFormat, RetrySettings, ServerConfig,
};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
