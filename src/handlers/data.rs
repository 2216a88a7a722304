use crate::app_state::AppState;
use crate::domain::{DataItem, DataStats, ItemQuery, NewDataItem};
use crate::handlers::shared_types::{ApiError, DataResponse};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use uuid::Uuid;

const MAX_LIST_LIMIT: i64 = 1000;
const MAX_LOAD_SECONDS: u64 = 60;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    category: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl ListParams {
    fn into_query(self) -> Result<ItemQuery, ApiError> {
        // ---
        let defaults = ItemQuery::default();
        let limit = self.limit.unwrap_or(defaults.limit);
        let offset = self.offset.unwrap_or(defaults.offset);

        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(ApiError::Validation(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}"
            )));
        }
        if offset < 0 {
            return Err(ApiError::Validation("offset must be >= 0".to_string()));
        }

        Ok(ItemQuery {
            category: self.category.filter(|c| !c.is_empty()),
            limit,
            offset,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadParams {
    duration: Option<u64>,
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Data item with ID {id} not found"))
}

/// Handler for creating a data item (POST /api/v1/data).
///
/// Server-managed fields (`id`, timestamps) are assigned here; responds
/// with `201 Created` and the stored item.
#[tracing::instrument(skip(state, input))]
pub async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<NewDataItem>,
) -> Result<(StatusCode, DataResponse<DataItem>), ApiError> {
    // ---
    let item = state
        .repository()
        .create_item(input)
        .await
        .map_err(|err| ApiError::internal("create data item", err))?;

    Ok((
        StatusCode::CREATED,
        DataResponse::ok("Data item created successfully", item),
    ))
}

/// Handler for listing items (GET /api/v1/data), newest first.
///
/// `count` carries the total number of items matching the filter, not the
/// page size.
#[tracing::instrument(skip(state))]
pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<DataResponse<Value>, ApiError> {
    // ---
    let query = params.into_query()?;
    let (items, total) = state
        .repository()
        .list_items(&query)
        .await
        .map_err(|err| ApiError::internal("retrieve data items", err))?;

    tracing::info!("Retrieved {} items (total: {total})", items.len());
    Ok(DataResponse::ok(
        format!("Retrieved {} items", items.len()),
        json!({ "items": items }),
    )
    .with_count(total))
}

#[tracing::instrument(skip(state))]
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<DataResponse<DataItem>, ApiError> {
    // ---
    let item = state
        .repository()
        .get_item(item_id)
        .await
        .map_err(|err| ApiError::internal("retrieve data item", err))?
        .ok_or_else(|| not_found(item_id))?;

    Ok(DataResponse::ok("Data item retrieved successfully", item))
}

#[tracing::instrument(skip(state, input))]
pub async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<NewDataItem>,
) -> Result<DataResponse<DataItem>, ApiError> {
    // ---
    let item = state
        .repository()
        .update_item(item_id, input)
        .await
        .map_err(|err| ApiError::internal("update data item", err))?
        .ok_or_else(|| not_found(item_id))?;

    Ok(DataResponse::ok("Data item updated successfully", item))
}

/// Handler for deleting an item; the removed item is echoed back.
#[tracing::instrument(skip(state))]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<DataResponse<DataItem>, ApiError> {
    // ---
    let item = state
        .repository()
        .delete_item(item_id)
        .await
        .map_err(|err| ApiError::internal("delete data item", err))?
        .ok_or_else(|| not_found(item_id))?;

    Ok(DataResponse::ok("Data item deleted successfully", item))
}

#[tracing::instrument(skip(state))]
pub async fn statistics(State(state): State<AppState>) -> Result<Json<DataStats>, ApiError> {
    // ---
    state
        .repository()
        .statistics()
        .await
        .map(Json)
        .map_err(|err| ApiError::internal("calculate statistics", err))
}

/// Burns CPU for `duration` seconds (1..=60, default 5) so the process and
/// system gauges have something to show.
///
/// Work is done in short slices with a yield in between so the runtime keeps
/// serving other requests.
#[tracing::instrument]
pub async fn simulate_load(Query(params): Query<LoadParams>) -> Result<Json<Value>, ApiError> {
    // ---
    let duration = params.duration.unwrap_or(5);
    if !(1..=MAX_LOAD_SECONDS).contains(&duration) {
        return Err(ApiError::Validation(format!(
            "duration must be between 1 and {MAX_LOAD_SECONDS}"
        )));
    }

    let start_time = Utc::now();
    let deadline = Instant::now() + Duration::from_secs(duration);
    let mut operations: u64 = 0;

    while Instant::now() < deadline {
        for _ in 0..10_000 {
            operations = std::hint::black_box(operations + 1);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    Ok(Json(json!({
        "message": "Load simulation completed",
        "duration_seconds": duration,
        "operations_performed": operations,
        "start_time": start_time.to_rfc3339(),
        "end_time": Utc::now().to_rfc3339(),
    })))
}

/// Database health under the API prefix: `200` when healthy, `503` otherwise.
pub async fn database_health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    // ---
    let healthy = state.repository().health_check().await.map_err(|err| {
        tracing::warn!("Database health check failed: {err:#}");
        ApiError::Unavailable(format!("Database health check failed: {err}"))
    })?;
    if !healthy {
        return Err(ApiError::Unavailable("Database is not healthy".to_string()));
    }

    Ok(Json(json!({
        "status": "healthy",
        "database": state.service().storage,
        "connection": "active",
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn params(limit: Option<i64>, offset: Option<i64>) -> ListParams {
        ListParams {
            category: None,
            limit,
            offset,
        }
    }

    #[test]
    fn list_params_default_and_bounds() {
        // ---
        let query = params(None, None).into_query().unwrap();
        assert_eq!(query, ItemQuery::default());

        assert!(params(Some(1000), Some(0)).into_query().is_ok());
        assert!(matches!(params(Some(0), None).into_query(), Err(ApiError::Validation(_))));
        assert!(matches!(params(Some(1001), None).into_query(), Err(ApiError::Validation(_))));
        assert!(matches!(params(None, Some(-1)).into_query(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn empty_category_means_no_filter() {
        // ---
        let query = ListParams {
            category: Some(String::new()),
            limit: None,
            offset: None,
        }
        .into_query()
        .unwrap();
        assert_eq!(query.category, None);
    }
}
