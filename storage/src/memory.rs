//! In-process repository, used in tests and when no database is configured.

use crate::entity::TableRecord;
use crate::error::{StoreError, StoreResult};
use crate::repository::{ListQuery, Page, Repository};
use async_trait::async_trait;
use chrono::Utc;
use errors::ValidationError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Existence check against a parent table.
///
/// Tombstoned rows still exist, matching a foreign key on a soft-deleted row.
pub trait ParentLookup: Send + Sync {
    fn contains(&self, id: &str) -> bool;

    /// Registers a table whose rows reference this one.
    fn add_child(&self, child: Weak<dyn ChildLookup>);
}

/// Reverse reference check from a parent table into a child table.
pub trait ChildLookup: Send + Sync {
    /// Whether any row, tombstones included, references `parent_id`.
    fn references(&self, parent_id: &str) -> bool;
}

pub struct InMemoryRepository<T: TableRecord> {
    rows: RwLock<BTreeMap<String, T>>,
    page_size: u32,
    soft_delete: bool,
    parent: Option<Arc<dyn ParentLookup>>,
    children: RwLock<Vec<Weak<dyn ChildLookup>>>
}

impl<T: TableRecord> InMemoryRepository<T> {
    pub fn new(page_size: u32, soft_delete: bool) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            page_size,
            soft_delete,
            parent: None,
            children: RwLock::new(Vec::new())
        }
    }

    /// Rejects records whose parent reference does not resolve in `parent`,
    /// and makes `parent` refuse hard deletes of rows this table references.
    #[must_use]
    pub fn with_parent(mut self, parent: Arc<dyn ParentLookup>) -> Arc<Self> {
        self.parent = Some(parent.clone());
        let child = Arc::new(self);
        let weak: Weak<dyn ChildLookup> = Arc::downgrade(&child) as Weak<Self>;
        parent.add_child(weak);
        child
    }

    fn is_referenced(&self, id: &str) -> bool {
        self.children
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|child| child.references(id))
    }

    fn check_parent(&self, record: &T) -> StoreResult<()> {
        if let (Some(parent), Some((field, id))) = (&self.parent, record.parent_reference()) {
            if !parent.contains(id) {
                return Err(ValidationError::new(field, format!("'{id}' does not exist")).into());
            }
        }
        Ok(())
    }

    fn live(&self, id: &str) -> StoreResult<T> {
        self.rows
            .read()
            .get(id)
            .filter(|row| !row.meta().deleted)
            .cloned()
            .ok_or_else(|| StoreError::not_found(T::ENTITY, id))
    }

    fn check_version(current: &T, expected_version: Option<&str>) -> StoreResult<()> {
        match expected_version {
            Some(expected) if expected != current.meta().version => {
                Err(StoreError::ConcurrencyConflict {
                    entity: T::ENTITY,
                    id: current.meta().id.clone(),
                    current: Box::new(serde_json::to_value(current)?)
                })
            }
            _ => Ok(())
        }
    }

    fn stamp(record: &mut T) {
        let meta = record.meta_mut();
        meta.updated_at = Utc::now();
        meta.version = utils::generate_version();
    }
}

impl<T: TableRecord> ParentLookup for InMemoryRepository<T> {
    fn contains(&self, id: &str) -> bool {
        self.rows.read().contains_key(id)
    }

    fn add_child(&self, child: Weak<dyn ChildLookup>) {
        self.children.write().push(child);
    }
}

impl<T: TableRecord> ChildLookup for InMemoryRepository<T> {
    fn references(&self, parent_id: &str) -> bool {
        self.rows
            .read()
            .values()
            .any(|row| row.parent_reference().is_some_and(|(_, id)| id == parent_id))
    }
}

#[async_trait]
impl<T: TableRecord> Repository<T> for InMemoryRepository<T> {
    async fn list(&self, query: &ListQuery) -> StoreResult<Page<T>> {
        let rows = self.rows.read();
        let mut visible: Vec<&T> = rows
            .values()
            .filter(|row| query.include_deleted || !row.meta().deleted)
            .collect();
        visible.sort_by(|a, b| {
            (a.meta().updated_at, &a.meta().id).cmp(&(b.meta().updated_at, &b.meta().id))
        });

        let limit = query.limit(self.page_size) as usize;
        let remaining = visible.len().saturating_sub(query.skip as usize);
        let items: Vec<T> = visible
            .iter()
            .skip(query.skip as usize)
            .take(limit)
            .map(|row| (*row).clone())
            .collect();

        Ok(Page {
            has_more: remaining > limit && query.top.is_none_or(|top| top > self.page_size),
            count: query.include_count.then_some(visible.len() as u64),
            items
        })
    }

    async fn get(&self, id: &str) -> StoreResult<T> {
        self.live(id)
    }

    async fn create(&self, mut record: T) -> StoreResult<T> {
        record.validate()?;
        self.check_parent(&record)?;

        if record.meta().id.trim().is_empty() {
            record.meta_mut().id = utils::generate_id();
        }
        record.meta_mut().deleted = false;
        Self::stamp(&mut record);

        let mut rows = self.rows.write();
        let id = record.meta().id.clone();
        if rows.contains_key(&id) {
            return Err(StoreError::Conflict {
                entity: T::ENTITY,
                id
            });
        }
        rows.insert(id, record.clone());
        Ok(record)
    }

    async fn replace(&self, id: &str, mut record: T, expected_version: Option<&str>) -> StoreResult<T> {
        record.validate()?;
        self.check_parent(&record)?;

        let mut rows = self.rows.write();
        let current = rows
            .get(id)
            .filter(|row| !row.meta().deleted)
            .ok_or_else(|| StoreError::not_found(T::ENTITY, id))?;
        Self::check_version(current, expected_version)?;

        record.meta_mut().id = id.to_string();
        record.meta_mut().deleted = false;
        Self::stamp(&mut record);
        rows.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &str, expected_version: Option<&str>) -> StoreResult<()> {
        let mut rows = self.rows.write();
        let current = rows
            .get(id)
            .filter(|row| !row.meta().deleted)
            .ok_or_else(|| StoreError::not_found(T::ENTITY, id))?;
        Self::check_version(current, expected_version)?;

        if self.soft_delete {
            let mut tombstone = current.clone();
            tombstone.meta_mut().deleted = true;
            Self::stamp(&mut tombstone);
            rows.insert(id.to_string(), tombstone);
        } else {
            if self.is_referenced(id) {
                return Err(StoreError::InUse {
                    entity: T::ENTITY,
                    id: id.to_string()
                });
            }
            rows.remove(id);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
