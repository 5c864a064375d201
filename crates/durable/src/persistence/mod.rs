//! Persistence layer for resume tokens
//!
//! This module provides:
//! - [`TokenStore`] trait for execution id → token records
//! - [`InMemoryTokenStore`] for testing
//! - [`PostgresTokenStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryTokenStore;
pub use postgres::PostgresTokenStore;
pub use store::{
    ConsumeError, DuplicateResume, LookupFailure, PersistFailure, PutStrictness, ResumeToken,
    TokenRecord, TokenStore,
};
