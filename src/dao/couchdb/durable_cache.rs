use futures::future::BoxFuture;

use crate::{
    cache::DurableCache,
    dao::storage::{StorageError, StorageResult},
};

use super::{
    client::{CouchClient, WriteOutcome},
    models::{CouchCacheDocument, cache_doc_id},
};

const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Durable cache tier stored as `cache::<key>` documents next to the chat data.
#[derive(Clone)]
pub struct CouchDurableCache {
    couch: CouchClient,
}

impl CouchDurableCache {
    pub fn new(couch: CouchClient) -> Self {
        Self { couch }
    }
}

impl DurableCache for CouchDurableCache {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let couch = self.couch.clone();
        let doc_id = cache_doc_id(key);
        Box::pin(async move {
            let doc = couch.get_document::<CouchCacheDocument>(&doc_id).await?;
            Ok(doc.map(|doc| doc.value))
        })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let couch = self.couch.clone();
        let doc_id = cache_doc_id(key);
        Box::pin(async move {
            for _ in 0..MAX_WRITE_ATTEMPTS {
                let doc = CouchCacheDocument {
                    id: doc_id.clone(),
                    rev: couch.get_revision(&doc_id).await?,
                    value: value.clone(),
                };
                if couch.put_document(&doc_id, &doc).await? == WriteOutcome::Written {
                    return Ok(());
                }
            }
            Err(StorageError::Contention {
                key: doc_id,
                attempts: MAX_WRITE_ATTEMPTS,
            })
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let couch = self.couch.clone();
        let doc_id = cache_doc_id(key);
        Box::pin(async move {
            if let Some(rev) = couch.get_revision(&doc_id).await? {
                couch.delete_document(&doc_id, &rev).await?;
            }
            Ok(())
        })
    }
}
