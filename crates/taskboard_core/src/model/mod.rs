//! Board domain model shared by sync, dispatch and projection layers.
//!
//! # Responsibility
//! - Define lists, tasks, priorities, drafts and bucket keys.
//! - Own the document field layout used on the store wire.
//!
//! # Invariants
//! - Every entity is identified by a store-assigned `DocumentId`.
//! - A decoded task always carries one of the three priorities.

pub mod board;
