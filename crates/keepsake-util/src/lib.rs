//! Shared utilities for keepsake.
//!
//! This crate provides common utilities used across the keepsake workspace:
//! - Error handling patterns
//! - Entry identifiers and history folder names
//! - Logging setup with tracing
//! - Path utilities
//! - Wildcard pattern matching for resource-scoped settings

pub mod error;
pub mod id;
pub mod log;
pub mod path;
pub mod wildcard;

pub use error::{Error, ErrorKind, Result};
pub use id::{entry_id, folder_name, is_entry_file_name};
