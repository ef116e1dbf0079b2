//! Testing utilities, fixtures, and store doubles for keepsake.
//!
//! - **Fixtures**: temporary workspaces with tracked files and a history root
//! - **Mocks**: a content store wrapper that records operations and can be
//!   told to fail
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use keepsake_test_utils::{RecordingStore, StoreOp, TestWorkspace};
//!
//! #[tokio::test]
//! async fn test_history() {
//!     let workspace = TestWorkspace::new().with_file("notes.md", "draft").build();
//!     let store = RecordingStore::local();
//!
//!     // ... drive a HistoryService rooted at workspace.history_root() ...
//!
//!     assert_eq!(store.count(StoreOp::WriteFile), 1);
//! }
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::{BuiltTestWorkspace, TestWorkspace};
pub use mocks::{RecordingStore, StoreOp};
