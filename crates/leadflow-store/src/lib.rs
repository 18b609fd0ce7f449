//! SQLite persistence for the CRM collections the workflow runner touches.

pub mod store;

pub use store::SqliteStore;
