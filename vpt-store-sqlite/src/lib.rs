// vpt-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Persistence Store
// Description: Durable `PersistenceStore` backend using SQLite WAL.
// Purpose: Provide the single normalized store for trees, nodes, edges,
//          testcases, folders/tags, the AI plan cache, and script results
//          (§6.3, §6.5).
// Dependencies: vpt-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate is the only component that issues SQL. Everything above it
//! (navigation engine, executor, AI plan cache, HTTP layers) depends only on
//! [`vpt_core::PersistenceStore`]; nothing here leaks a `Connection` or a SQL
//! string across that boundary.

pub mod store;

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
