//! # ptms-store
//!
//! Local cache for the PTMS client, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for reference-data
//! snapshots (projects, work types), submitted time reports, and the
//! key-value preferences that hold the bootstrap readiness marker and the
//! offline credential.

pub mod database;
pub mod migrations;
pub mod models;
pub mod preferences;
pub mod reference;
pub mod time_reports;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use reference::CacheEntity;
