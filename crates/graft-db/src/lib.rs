//! # graft-db
//!
//! Infrastructure layer for graft - engine connections and the staging side
//! table.
//!
//! This crate holds everything that talks to the database engine, isolated
//! from the loading logic in `graft-core`:
//!
//! - `graft-core` never sees a driver type, only the traits defined here
//! - Backends can be swapped without changing domain logic
//! - Tests run against the in-memory engine with no external services
//!
//! ## Architecture
//!
//! ```text
//! graft-cli → graft-core → (traits)
//!                  ↑
//!              graft-db (connections, pools, staging store)
//! ```
//!
//! ## Features
//!
//! - `postgres`: PostgreSQL with the Apache AGE extension, via sqlx
//!
//! ## Modules
//!
//! - `connection`: [`Connection`](connection::Connection) and
//!   [`ConnectionPool`](connection::ConnectionPool) traits, the in-memory
//!   engine, the PostgreSQL backend
//! - `staging`: keyed side table used to ship batches into graph statements
//!
//! ## Usage
//!
//! ```ignore
//! use graft_db::connection::{ConnectionPool, MemoryEngine};
//! use graft_db::staging::{StagingKey, StagingStore, TableStagingStore};
//!
//! let engine = MemoryEngine::new();
//! let mut conn = engine.pool().acquire()?;
//!
//! let store = TableStagingStore::default();
//! store.ensure(conn.as_mut())?;
//! store.put(conn.as_mut(), &StagingKey::new("k")?, &serde_json::json!([]))?;
//! ```

pub mod connection;
pub mod error;
pub mod staging;

pub use error::{DbError, DbResult};
