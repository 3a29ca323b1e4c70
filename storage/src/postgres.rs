//! PostgreSQL-backed repository.

use crate::entity::{Customer, SupportTicket, TableRecord};
use crate::error::{StoreError, StoreResult};
use crate::repository::{ListQuery, Page, Repository};
use async_trait::async_trait;
use chrono::Utc;
use config::SqlSettings;
use errors::ValidationError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{AssertSqlSafe, PgPool};
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, info};

const META_COLUMNS: &[&str] = &["id", "updated_at", "version", "deleted"];

/// Opens a pool for `connection_string` sized by the SQL settings.
pub async fn connect(connection_string: &str, settings: &SqlSettings) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(connection_string)
        .await?;
    debug!(max_connections = settings.max_connections, "PostgreSQL pool opened");
    Ok(pool)
}

/// Creates the entity tables when missing. Idempotent.
pub async fn ensure_schema(pool: &PgPool) -> StoreResult<()> {
    sqlx::query(Customer::SCHEMA).execute(pool).await?;
    sqlx::query(SupportTicket::SCHEMA).execute(pool).await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_support_tickets_customer_id ON support_tickets(customer_id)"
    )
    .execute(pool)
    .await?;
    info!("Entity schema ensured");
    Ok(())
}

pub struct PostgresRepository<T: TableRecord> {
    pool: PgPool,
    page_size: u32,
    soft_delete: bool,
    columns: String,
    _record: PhantomData<fn() -> T>
}

impl<T: TableRecord> PostgresRepository<T> {
    pub fn new(pool: PgPool, page_size: u32, soft_delete: bool) -> Self {
        let columns = META_COLUMNS
            .iter()
            .chain(T::FIELDS)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            pool,
            page_size,
            soft_delete,
            columns,
            _record: PhantomData
        }
    }

    async fn fetch_live(&self, id: &str) -> StoreResult<Option<T>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND deleted = FALSE",
            self.columns,
            T::TABLE
        );
        Ok(sqlx::query_as::<_, T>(AssertSqlSafe(sql.as_str()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Explains a guarded write that touched no row.
    async fn missed_write(&self, id: &str) -> StoreError {
        match self.fetch_live(id).await {
            Ok(Some(current)) => match serde_json::to_value(&current) {
                Ok(current) => StoreError::ConcurrencyConflict {
                    entity: T::ENTITY,
                    id: id.to_string(),
                    current: Box::new(current)
                },
                Err(e) => e.into()
            },
            Ok(None) => StoreError::not_found(T::ENTITY, id),
            Err(e) => e
        }
    }

    fn map_write_error(record: &T, error: sqlx::Error) -> StoreError {
        let error = StoreError::Database(error);
        if error.is_foreign_key_violation() {
            if let Some((field, id)) = record.parent_reference() {
                return ValidationError::new(field, format!("'{id}' does not exist")).into();
            }
        }
        error
    }
}

/// `$first, $first+1, ...` for `count` parameters.
fn placeholders(first: usize, count: usize) -> Vec<String> {
    (first..first + count).map(|i| format!("${i}")).collect()
}

#[async_trait]
impl<T: TableRecord> Repository<T> for PostgresRepository<T> {
    async fn list(&self, query: &ListQuery) -> StoreResult<Page<T>> {
        let filter = if query.include_deleted {
            ""
        } else {
            " WHERE deleted = FALSE"
        };
        let limit = query.limit(self.page_size);

        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY updated_at, id LIMIT $1 OFFSET $2",
            self.columns,
            T::TABLE,
            filter
        );
        // One extra row tells whether another page exists.
        let mut items = sqlx::query_as::<_, T>(AssertSqlSafe(sql.as_str()))
            .bind(i64::from(limit) + 1)
            .bind(i64::from(query.skip))
            .fetch_all(&self.pool)
            .await?;
        let overflow = items.len() > limit as usize;
        items.truncate(limit as usize);

        let count = if query.include_count {
            let sql = format!("SELECT COUNT(*) FROM {}{}", T::TABLE, filter);
            let total: i64 = sqlx::query_scalar(AssertSqlSafe(sql.as_str()))
                .fetch_one(&self.pool)
                .await?;
            Some(total as u64)
        } else {
            None
        };

        Ok(Page {
            items,
            count,
            has_more: overflow && query.top.is_none_or(|top| top > self.page_size)
        })
    }

    async fn get(&self, id: &str) -> StoreResult<T> {
        self.fetch_live(id)
            .await?
            .ok_or_else(|| StoreError::not_found(T::ENTITY, id))
    }

    async fn create(&self, mut record: T) -> StoreResult<T> {
        record.validate()?;
        if record.meta().id.trim().is_empty() {
            record.meta_mut().id = utils::generate_id();
        }
        let id = record.meta().id.clone();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, FALSE, {}) RETURNING {}",
            T::TABLE,
            self.columns,
            placeholders(4, T::FIELDS.len()).join(", "),
            self.columns
        );
        let mut insert = sqlx::query_as::<_, T>(AssertSqlSafe(sql.as_str()))
            .bind(&id)
            .bind(Utc::now())
            .bind(utils::generate_version());
        for value in record.field_values() {
            insert = insert.bind(value);
        }

        match insert.fetch_one(&self.pool).await {
            Ok(created) => {
                debug!(entity = T::ENTITY, id = %id, "Record created");
                Ok(created)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict {
                    entity: T::ENTITY,
                    id
                })
            }
            Err(e) => Err(Self::map_write_error(&record, e))
        }
    }

    async fn replace(&self, id: &str, record: T, expected_version: Option<&str>) -> StoreResult<T> {
        record.validate()?;

        let assignments = T::FIELDS
            .iter()
            .zip(placeholders(4, T::FIELDS.len()))
            .map(|(column, placeholder)| format!("{column} = {placeholder}"))
            .collect::<Vec<_>>()
            .join(", ");
        let version_guard = if expected_version.is_some() {
            format!(" AND version = ${}", 4 + T::FIELDS.len())
        } else {
            String::new()
        };
        let sql = format!(
            "UPDATE {} SET updated_at = $2, version = $3, {} WHERE id = $1 AND deleted = FALSE{} RETURNING {}",
            T::TABLE,
            assignments,
            version_guard,
            self.columns
        );

        let mut update = sqlx::query_as::<_, T>(AssertSqlSafe(sql.as_str()))
            .bind(id)
            .bind(Utc::now())
            .bind(utils::generate_version());
        for value in record.field_values() {
            update = update.bind(value);
        }
        if let Some(expected) = expected_version {
            update = update.bind(expected);
        }

        match update.fetch_optional(&self.pool).await {
            Ok(Some(updated)) => Ok(updated),
            Ok(None) => Err(self.missed_write(id).await),
            Err(e) => Err(Self::map_write_error(&record, e))
        }
    }

    async fn delete(&self, id: &str, expected_version: Option<&str>) -> StoreResult<()> {
        let (sql, guard_index) = if self.soft_delete {
            (
                format!(
                    "UPDATE {} SET deleted = TRUE, updated_at = $2, version = $3 WHERE id = $1 AND deleted = FALSE",
                    T::TABLE
                ),
                4
            )
        } else {
            (format!("DELETE FROM {} WHERE id = $1 AND deleted = FALSE", T::TABLE), 2)
        };
        let sql = match expected_version {
            Some(_) => format!("{sql} AND version = ${guard_index}"),
            None => sql
        };

        let mut delete = sqlx::query(AssertSqlSafe(sql.as_str())).bind(id);
        if self.soft_delete {
            delete = delete.bind(Utc::now()).bind(utils::generate_version());
        }
        if let Some(expected) = expected_version {
            delete = delete.bind(expected);
        }

        let result = match delete.execute(&self.pool).await {
            Ok(result) => result,
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(StoreError::InUse {
                    entity: T::ENTITY,
                    id: id.to_string()
                });
            }
            Err(e) => return Err(e.into())
        };

        if result.rows_affected() == 0 {
            return Err(self.missed_write(id).await);
        }
        debug!(entity = T::ENTITY, id = %id, soft = self.soft_delete, "Record deleted");
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
