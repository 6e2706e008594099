//! # mdbrowse
//!
//! The versioned document storage and retrieval engine behind a
//! markdown-document platform, usable both as a standalone server binary
//! and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! mdbrowse = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use mdbrowse::server::{AppState, create_router};
//! use mdbrowse::store::SqliteStore;
//!
//! let store = SqliteStore::new(PathBuf::from("./data/mdbrowse.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store)));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the admin CLI. Disable with `default-features = false`.

pub mod audit;
pub mod auth;
pub mod chunk;
pub mod config;
pub mod content;
pub mod error;
pub mod idempotency;
pub mod server;
pub mod store;
pub mod types;
