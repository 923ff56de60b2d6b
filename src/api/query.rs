//! Common query parameter structs for pagination and filtering

use crate::store::models::{ClientFilter, ClientSort, InsightType, TaskFilter, TaskScope};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Helper to deserialize numbers from query string (which are always strings)
fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map_err(D::Error::custom),
        _ => Ok(T::default()),
    }
}

/// Helper to deserialize optional numbers from query string
fn deserialize_option_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map(Some).map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// Pagination parameters for list endpoints
#[derive(Debug, Deserialize, Clone)]
pub struct PaginationParams {
    /// Max items to return (default: 50, max: 100)
    #[serde(default = "default_limit", deserialize_with = "deserialize_from_str")]
    pub limit: usize,
    /// Items to skip (default: 0)
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub offset: usize,
    /// Sort field (e.g., "created_at", "name", "total_spent")
    pub sort_by: Option<String>,
    /// Sort direction: "asc" or "desc" (default: "desc")
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
}

fn default_limit() -> usize {
    50
}

fn default_sort_order() -> String {
    "desc".to_string()
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            sort_by: None,
            sort_order: default_sort_order(),
        }
    }
}

impl PaginationParams {
    /// Validate pagination parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.limit > 100 {
            return Err("limit cannot exceed 100".to_string());
        }
        if !["asc", "desc"].contains(&self.sort_order.as_str()) {
            return Err("sort_order must be 'asc' or 'desc'".to_string());
        }
        Ok(())
    }

    /// Get validated limit (capped at 100)
    pub fn validated_limit(&self) -> usize {
        self.limit.min(100)
    }
}

/// Tags filter - accepts comma-separated values
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TagsFilter {
    /// Comma-separated tag values, e.g., "vip,frecuente"
    pub tags: Option<String>,
}

impl TagsFilter {
    /// Convert comma-separated string to Vec<String>
    pub fn to_vec(&self) -> Option<Vec<String>> {
        self.tags.as_ref().map(|s| {
            s.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}

/// Search filter for text-based queries
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SearchFilter {
    /// Search query string
    pub search: Option<String>,
}

impl SearchFilter {
    /// Check if search filter is set
    pub fn is_set(&self) -> bool {
        self.search.as_ref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total count of items matching the filter
    pub total: usize,
    /// Maximum items per page (as requested)
    pub limit: usize,
    /// Number of items skipped
    pub offset: usize,
    /// Whether there are more items after this page
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    /// Create a new paginated response
    pub fn new(items: Vec<T>, total: usize, limit: usize, offset: usize) -> Self {
        Self {
            has_more: offset + items.len() < total,
            items,
            total,
            limit,
            offset,
        }
    }
}

/// Parse an optional UUID query value, naming the field on failure
fn parse_uuid(field: &str, value: Option<&str>) -> Result<Option<Uuid>, String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s).map_err(|_| format!("Invalid {} UUID", field)))
        .transpose()
}

/// Query parameters for listing clients
#[derive(Debug, Deserialize, Default)]
pub struct ClientListQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub search_filter: SearchFilter,
    #[serde(flatten)]
    pub tags_filter: TagsFilter,
    /// Only clients in this stage
    pub stage_id: Option<String>,
    /// true: clients with a stage, false: clients without one
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub in_pipeline: Option<bool>,
}

impl ClientListQuery {
    /// Validate and convert into a store filter
    pub fn to_filter(&self) -> Result<ClientFilter, String> {
        self.pagination.validate()?;
        let sort = self
            .pagination
            .sort_by
            .as_deref()
            .map(ClientSort::from_str)
            .transpose()?
            .unwrap_or_default();

        Ok(ClientFilter {
            search: self
                .search_filter
                .is_set()
                .then(|| self.search_filter.search.clone())
                .flatten()
                .map(|s| s.trim().to_string()),
            stage_id: parse_uuid("stage_id", self.stage_id.as_deref())?,
            in_pipeline: self.in_pipeline,
            tags: self.tags_filter.to_vec().filter(|t| !t.is_empty()),
            sort,
            descending: self.pagination.sort_order == "desc",
            limit: self.pagination.validated_limit(),
            offset: self.pagination.offset,
        })
    }
}

/// Query parameters for listing tasks
#[derive(Debug, Deserialize, Default)]
pub struct TaskListQuery {
    pub client_id: Option<String>,
    pub stage_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub completed: Option<bool>,
    /// `client` (has a client) or `template` (no client)
    #[serde(rename = "type")]
    pub scope: Option<String>,
}

impl TaskListQuery {
    pub fn to_filter(&self) -> Result<TaskFilter, String> {
        Ok(TaskFilter {
            client_id: parse_uuid("client_id", self.client_id.as_deref())?,
            stage_id: parse_uuid("stage_id", self.stage_id.as_deref())?,
            completed: self.completed,
            scope: self
                .scope
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(TaskScope::from_str)
                .transpose()?,
        })
    }
}

/// Query parameters for listing one client's interactions
#[derive(Debug, Deserialize, Default)]
pub struct InteractionsQuery {
    pub client_id: Option<String>,
}

impl InteractionsQuery {
    pub fn client_id(&self) -> Result<Option<Uuid>, String> {
        parse_uuid("client_id", self.client_id.as_deref())
    }
}

/// Query parameters for listing stored insights
#[derive(Debug, Deserialize, Default)]
pub struct InsightsQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub limit: Option<usize>,
}

impl InsightsQuery {
    pub fn kind(&self) -> Result<Option<InsightType>, String> {
        self.kind
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(InsightType::from_str)
            .transpose()
    }
}
