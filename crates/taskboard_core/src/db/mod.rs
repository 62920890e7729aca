//! SQLite bootstrap for the reference document store.
//!
//! Opens connections for `SqliteDocumentStore` and brings the `documents`
//! table up to the schema this binary understands. Failures surface as
//! `StoreError`, so callers see one error type for the whole store.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - A database written by a newer binary is refused, never downgraded.
//! - No document is read or written before migrations succeed.

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};
