use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{DataItem, DataStats, ItemQuery, NewDataItem, Repository};

/// Process-local repository for development and tests.
#[derive(Default)]
pub struct MemoryRepository {
    // ---
    items: RwLock<HashMap<Uuid, DataItem>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    // ---
    async fn migrate(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn create_item(&self, input: NewDataItem) -> Result<DataItem> {
        // ---
        let item = DataItem::new(input);
        self.items.write().await.insert(item.id, item.clone());
        Ok(item)
    }

    async fn list_items(&self, query: &ItemQuery) -> Result<(Vec<DataItem>, i64)> {
        // ---
        let items = self.items.read().await;

        let mut matching: Vec<&DataItem> = items
            .values()
            .filter(|item| query.category.as_ref().map_or(true, |c| &item.category == c))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<DataItem>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn update_item(&self, id: Uuid, input: NewDataItem) -> Result<Option<DataItem>> {
        // ---
        let mut items = self.items.write().await;
        Ok(items.get_mut(&id).map(|item| {
            item.apply(input);
            item.clone()
        }))
    }

    async fn delete_item(&self, id: Uuid) -> Result<Option<DataItem>> {
        Ok(self.items.write().await.remove(&id))
    }

    async fn statistics(&self) -> Result<DataStats> {
        // ---
        let items = self.items.read().await;
        Ok(DataStats::from_values(
            items.values().map(|item| (item.category.as_str(), item.value)),
        ))
    }
}
