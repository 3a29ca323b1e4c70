//! Generic repository contract over a [`TableRecord`].

use crate::entity::TableRecord;
use crate::error::StoreResult;
use async_trait::async_trait;

/// Paging and visibility options for a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// `$top`; capped by the repository page size.
    pub top: Option<u32>,
    /// `$skip`
    pub skip: u32,
    /// `$count=true`
    pub include_count: bool,
    /// `__includedeleted=true`
    pub include_deleted: bool
}

impl ListQuery {
    /// Rows to return for a repository with the given page size.
    pub fn limit(&self, page_size: u32) -> u32 {
        self.top.map_or(page_size, |top| top.min(page_size))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matching rows, when requested.
    pub count: Option<u64>,
    /// More rows exist past this page and the caller did not bound the
    /// request below the page size.
    pub has_more: bool
}

#[async_trait]
pub trait Repository<T: TableRecord>: Send + Sync {
    /// Records ordered by `updatedAt`, then `id`.
    async fn list(&self, query: &ListQuery) -> StoreResult<Page<T>>;

    async fn get(&self, id: &str) -> StoreResult<T>;

    /// Assigns an id when empty, stamps `updatedAt` and `version`.
    async fn create(&self, record: T) -> StoreResult<T>;

    /// Replaces the business fields of an existing record. When
    /// `expected_version` is given it must match the stored version.
    async fn replace(&self, id: &str, record: T, expected_version: Option<&str>) -> StoreResult<T>;

    async fn delete(&self, id: &str, expected_version: Option<&str>) -> StoreResult<()>;

    /// Cheap reachability check for health reporting.
    async fn ping(&self) -> StoreResult<()>;
}
