//! `autorefresh-store`: durable state of the refresh scheduler.
//!
//! Two layers:
//!
//! | Layer            | Role                                                       |
//! |------------------|------------------------------------------------------------|
//! | [`KeyValueStore`] | JSON documents by key, with change notifications          |
//! | [`TimerStore`]   | typed timers / stats / history / settings over those keys |
//!
//! The SQLite-backed [`SqliteKv`] is the production key-value store.

pub mod db;
pub mod error;
pub mod kv;
pub mod store;

pub use error::{Result, StoreError};
pub use kv::{KeyValueStore, SqliteKv, StoreChange};
pub use store::{keys, ExportData, TimerStore, MAX_HISTORY_RECORDS};
