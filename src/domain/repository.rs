use super::data_item::{DataItem, DataStats, ItemQuery, NewDataItem};
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

/// Abstraction for data item persistence.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    // ---
    /// Create the backing schema if needed. Called once at startup.
    async fn migrate(&self) -> Result<()>;

    /// Cheap round trip to the backing store.
    ///
    /// `Ok(false)` means the store answered but is not usable (for example
    /// the items table is missing); `Err` means the round trip itself failed.
    async fn health_check(&self) -> Result<bool>;

    /// Insert a new item.
    async fn create_item(&self, input: NewDataItem) -> Result<DataItem>;

    /// List items newest first, with the total count matching the filter.
    async fn list_items(&self, query: &ItemQuery) -> Result<(Vec<DataItem>, i64)>;

    /// Get one item by id.
    async fn get_item(&self, id: Uuid) -> Result<Option<DataItem>>;

    /// Replace the mutable fields of an item. `None` if it does not exist.
    async fn update_item(&self, id: Uuid, input: NewDataItem) -> Result<Option<DataItem>>;

    /// Delete an item, returning what was removed.
    async fn delete_item(&self, id: Uuid) -> Result<Option<DataItem>>;

    /// Aggregate statistics over all items.
    async fn statistics(&self) -> Result<DataStats>;
}

/// Type alias for any backend that implements Repository.
pub type RepositoryPtr = Arc<dyn Repository>;
