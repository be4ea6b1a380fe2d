/// Chat message and presence storage.
pub mod chat_store;
/// CouchDB implementation of the storage traits.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// Persisted entity definitions.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
