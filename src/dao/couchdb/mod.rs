//! CouchDB backend: chat messages, presence records and the durable cache
//! tier share one database, separated by document id prefixes.

mod chat_store;
mod client;
mod config;
mod durable_cache;
mod error;
mod models;

pub use chat_store::CouchChatStore;
pub use client::CouchClient;
pub use config::CouchConfig;
pub use durable_cache::CouchDurableCache;
pub use error::{CouchDaoError, CouchResult};
