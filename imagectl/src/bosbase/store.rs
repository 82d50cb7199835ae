//! The seam between usage tracking and the BosBase backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::errors::StoreError;
use super::models::{Collection, CollectionPatch, ListQuery, ListResult, Record};

const COLLECTIONS_PAGE_SIZE: u32 = 200;

/// An authenticated handle to a BosBase instance.
///
/// The required methods map one-to-one onto REST calls. The provided methods compose them the
/// way the official SDKs do (`getFullList`, `getFirstListItem`).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_records(&self, collection: &str, query: &ListQuery) -> Result<ListResult<Record>, StoreError>;

    async fn create_record(&self, collection: &str, body: &Map<String, Value>) -> Result<Record, StoreError>;

    async fn update_record(&self, collection: &str, id: &str, body: &Map<String, Value>) -> Result<Record, StoreError>;

    async fn list_collections(&self, query: &ListQuery) -> Result<ListResult<Collection>, StoreError>;

    async fn create_collection(&self, collection: &Collection) -> Result<Collection, StoreError>;

    async fn update_collection(&self, id: &str, patch: &CollectionPatch) -> Result<Collection, StoreError>;

    /// Walk every record of a collection, `batch` records per request, handing each page to
    /// `visit` before the next one is fetched.
    async fn for_each_page(
        &self,
        collection: &str,
        batch: u32,
        sort: Option<&str>,
        visit: &mut (dyn FnMut(Vec<Record>) + Send),
    ) -> Result<(), StoreError> {
        let batch = batch.max(1);
        let mut page = 1;
        loop {
            let mut query = ListQuery::new(page, batch);
            if let Some(sort) = sort {
                query = query.sort(sort);
            }
            let result = self.list_records(collection, &query).await?;
            let fetched = result.items.len();
            visit(result.items);

            if fetched < batch as usize || u64::from(page) >= result.total_pages {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    /// First record matching `filter`, or [`StoreError::NotFound`].
    async fn first_list_item(&self, collection: &str, filter: &str) -> Result<Record, StoreError> {
        let query = ListQuery::new(1, 1).filter(filter);
        self.list_records(collection, &query)
            .await?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound {
                message: format!("no record in {collection} matches {filter}"),
            })
    }

    /// Look a collection up by name across all pages of the collection list.
    async fn find_collection(&self, name: &str) -> Result<Collection, StoreError> {
        let mut page = 1;
        loop {
            let result = self.list_collections(&ListQuery::new(page, COLLECTIONS_PAGE_SIZE)).await?;
            let fetched = result.items.len();
            if let Some(found) = result.items.into_iter().find(|c| c.name == name) {
                return Ok(found);
            }
            if fetched < COLLECTIONS_PAGE_SIZE as usize || u64::from(page) >= result.total_pages {
                return Err(StoreError::NotFound {
                    message: format!("collection {name} does not exist"),
                });
            }
            page += 1;
        }
    }
}

/// Produces freshly authenticated [`RecordStore`] handles, one per logical operation.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn RecordStore>, StoreError>;
}
