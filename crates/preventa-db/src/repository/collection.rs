//! # Collection Repository (cobranzas)
//!
//! Standalone client payments registered by sales reps, outside any route.

use chrono::{DateTime, Utc};
use preventa_core::{Collection, NewCollection};
use tracing::info;

use crate::error::DbResult;
use crate::store::LocalStore;

#[derive(Debug, Clone)]
pub struct CollectionRepository {
    store: LocalStore,
}

impl CollectionRepository {
    pub fn new(store: LocalStore) -> Self {
        CollectionRepository { store }
    }

    /// Validates and stores a collection as pending upload.
    pub async fn create(&self, input: NewCollection, now: DateTime<Utc>) -> DbResult<Collection> {
        let collection = input.into_collection(now)?;
        self.store.put(&collection).await?;

        info!(
            collection_id = %collection.id,
            client_id = %collection.client_id,
            amount = %collection.amount,
            method = %collection.method,
            "Collection registered"
        );
        Ok(collection)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Collection>> {
        self.store.get(id).await
    }

    pub async fn for_client(&self, client_id: &str) -> DbResult<Vec<Collection>> {
        self.store.get_by_index("client_id", client_id).await
    }

    /// Collections waiting for upload, oldest first.
    pub async fn pending(&self) -> DbResult<Vec<Collection>> {
        let mut collections: Vec<Collection> = self.store.pending().await?;
        collections.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(collections)
    }

    pub async fn count(&self) -> DbResult<u64> {
        self.store.count::<Collection>().await
    }

    pub async fn count_pending(&self) -> DbResult<u64> {
        self.store.count_pending::<Collection>().await
    }

    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        self.store.mark_synced::<Collection>(id).await
    }
}
