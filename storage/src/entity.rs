//! # Table Records
//!
//! Record shapes served by the entity store. Every record carries the same
//! sync metadata ([`EntityMeta`]) followed by its business columns. All
//! business columns are text, bound positionally in [`TableRecord::FIELDS`]
//! order.

use chrono::{DateTime, Utc};
use errors::ValidationError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::postgres::PgRow;

/// Server-managed columns shared by every table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    /// Assigned on create when the client leaves it empty.
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub updated_at: DateTime<Utc>,

    /// Opaque token, regenerated on every write.
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub deleted: bool
}

/// A record type stored in its own table.
pub trait TableRecord:
    Clone + Send + Sync + Unpin + Serialize + DeserializeOwned + for<'r> FromRow<'r, PgRow> + 'static
{
    /// Name used in errors and logs.
    const ENTITY: &'static str;

    /// Table name, also the `/tables/{entity}` path segment.
    const TABLE: &'static str;

    /// Business columns in bind order.
    const FIELDS: &'static [&'static str];

    /// `CREATE TABLE IF NOT EXISTS` statement.
    const SCHEMA: &'static str;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Business column values, aligned with [`Self::FIELDS`].
    fn field_values(&self) -> Vec<Option<String>>;

    fn validate(&self) -> Result<(), ValidationError>;

    /// Referencing field and parent id for records that point at another table.
    fn parent_reference(&self) -> Option<(&'static str, &str)> {
        None
    }
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::required(field))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub meta: EntityMeta,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub address: Option<String>
}

impl TableRecord for Customer {
    const ENTITY: &'static str = "Customer";
    const TABLE: &'static str = "customers";
    const FIELDS: &'static [&'static str] = &["name", "email", "phone", "address"];
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS customers (
        id TEXT PRIMARY KEY,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        version TEXT NOT NULL,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        address TEXT
    )";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn field_values(&self) -> Vec<Option<String>> {
        vec![
            Some(self.name.clone()),
            self.email.clone(),
            self.phone.clone(),
            self.address.clone()
        ]
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            if !email.contains('@') {
                return Err(ValidationError::new("email", "must be an email address"));
            }
        }
        Ok(())
    }
}

pub const DEFAULT_TICKET_STATUS: &str = "open";

fn default_status() -> String {
    DEFAULT_TICKET_STATUS.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicket {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub meta: EntityMeta,

    #[serde(default)]
    pub customer_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_status")]
    pub status: String
}

impl TableRecord for SupportTicket {
    const ENTITY: &'static str = "SupportTicket";
    const TABLE: &'static str = "support_tickets";
    const FIELDS: &'static [&'static str] = &["customer_id", "title", "description", "status"];
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS support_tickets (
        id TEXT PRIMARY KEY,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        version TEXT NOT NULL,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        customer_id TEXT NOT NULL REFERENCES customers(id),
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'open'
    )";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn field_values(&self) -> Vec<Option<String>> {
        vec![
            Some(self.customer_id.clone()),
            Some(self.title.clone()),
            self.description.clone(),
            Some(self.status.clone())
        ]
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require("customerId", &self.customer_id)?;
        require("title", &self.title)?;
        require("status", &self.status)
    }

    fn parent_reference(&self) -> Option<(&'static str, &str)> {
        Some(("customerId", self.customer_id.as_str()))
    }
}
