//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, Workspace, http_acquirer};
//!
//! #[tokio::test]
//! async fn test_acquire() {
//!     let server = TestServer::spawn().await;
//!     let workspace = Workspace::new();
//!     let acquirer = http_acquirer(&server, &workspace.storage, None);
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use constants::*;
pub use fixtures::{http_acquirer, transfer_settings, Workspace};
pub use server::{sized_body, TestServer};
