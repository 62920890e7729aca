//! Sync engine: session lifecycle, local cache and snapshot folding.
//!
//! # Responsibility
//! - Keep the local list/task cache equal to the latest store snapshots for
//!   the current owner.
//! - Open and close owner-scoped subscriptions deterministically.
//! - Record optimistic task mutations so they can be reverted.
//!
//! # Invariants
//! - Snapshots replace a whole collection; they are never merged.
//! - The cache is cleared and subscriptions cancelled before another owner's
//!   session opens.

pub mod cache;
pub mod engine;
pub mod pending;
pub mod session;
