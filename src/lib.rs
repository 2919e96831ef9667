//! # Studytrack
//!
//! Study progress tracking with a competitive leaderboard, usable both as a
//! standalone server and as a library.
//!
//! Users mark syllabus topics with a mastery status; each status is worth a
//! fixed number of points and a user's total is offered to a score ledger
//! that only ever keeps the highest value seen. The ledger is ranked with
//! competition ranking (ties share a rank, the next rank skips).
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::Path;
//! use studytrack::config::{Backend, ServerConfig};
//! use studytrack::server::{AppState, create_router};
//! use studytrack::store::open_store;
//! use studytrack::syllabus::Syllabus;
//!
//! let config = ServerConfig::default();
//! let store = open_store(Backend::File, &config.data_dir, config.lock_timeout()).unwrap();
//! let syllabus = Syllabus::load(Path::new("syllabus.yaml")).unwrap();
//!
//! let state = Arc::new(AppState::new(store, Arc::new(syllabus), config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Storage
//!
//! Two interchangeable backends implement [`store::Store`]: lock-guarded JSON
//! documents ([`store::FileStore`]) and SQLite ([`store::SqliteStore`]). Both
//! give the same results for the same sequence of operations.
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `studytrack` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod migrate;
pub mod scoring;
pub mod server;
pub mod service;
pub mod store;
pub mod syllabus;
pub mod types;
