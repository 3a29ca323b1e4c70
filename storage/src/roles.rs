//! # Role Provisioner
//!
//! Binds a managed identity to a database login and grants it the reader
//! and writer roles. Every step is guarded by an existence or membership
//! check, so repeating a request changes nothing and reports zero
//! affected statements.
//!
//! Identifiers never reach SQL text directly: role names and the SID are
//! bound parameters, and the engine itself quotes them (`format('%I')` /
//! `format('%L')`) before the DDL runs.

use crate::error::StoreResult;
use async_trait::async_trait;
use config::SqlSettings;
use errors::ValidationError;
use serde::{Deserialize, Serialize};
use sqlx::{AssertSqlSafe, PgConnection, PgPool};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Body of `POST /api/sqlrole`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleRequest {
    /// Principal display name; becomes the login name.
    #[serde(default, alias = "name")]
    pub name: String,

    /// Object id of the identity, GUID text.
    #[serde(default, alias = "id")]
    pub id: String
}

impl RoleRequest {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::required("Name"));
        }
        Ok(())
    }
}

/// Roles granted to every provisioned principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    pub reader: String,
    pub writer: String
}

impl RoleSet {
    pub fn from_settings(settings: &SqlSettings) -> Self {
        Self {
            reader: settings.reader_role.clone(),
            writer: settings.writer_role.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    /// SID literal recorded for the principal.
    pub sid: String,
    pub created: bool,
    /// Roles granted by this call.
    pub granted: Vec<String>,
    /// Guarded statements that actually ran.
    pub rows_affected: u64
}

/// The four primitive catalog steps the provisioner is built from.
#[async_trait]
pub trait PrincipalCatalog: Send {
    async fn principal_exists(&mut self, name: &str) -> StoreResult<bool>;

    async fn create_principal(&mut self, name: &str, sid: &str) -> StoreResult<()>;

    async fn is_member(&mut self, role: &str, member: &str) -> StoreResult<bool>;

    async fn add_member(&mut self, role: &str, member: &str) -> StoreResult<()>;
}

#[async_trait]
impl PrincipalCatalog for PgConnection {
    async fn principal_exists(&mut self, name: &str) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_roles WHERE rolname = $1)")
                .bind(name)
                .fetch_one(&mut *self)
                .await?;
        Ok(exists)
    }

    async fn create_principal(&mut self, name: &str, sid: &str) -> StoreResult<()> {
        let create: String = sqlx::query_scalar("SELECT format('CREATE ROLE %I WITH LOGIN', $1::text)")
            .bind(name)
            .fetch_one(&mut *self)
            .await?;
        sqlx::query(AssertSqlSafe(create.as_str()))
            .execute(&mut *self)
            .await?;

        let comment: String =
            sqlx::query_scalar("SELECT format('COMMENT ON ROLE %I IS %L', $1::text, $2::text)")
                .bind(name)
                .bind(sid)
                .fetch_one(&mut *self)
                .await?;
        sqlx::query(AssertSqlSafe(comment.as_str()))
            .execute(&mut *self)
            .await?;
        Ok(())
    }

    async fn is_member(&mut self, role: &str, member: &str) -> StoreResult<bool> {
        let member_of: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM pg_auth_members m
                JOIN pg_roles r ON r.oid = m.roleid
                JOIN pg_roles u ON u.oid = m.member
                WHERE r.rolname = $1 AND u.rolname = $2
            )"
        )
        .bind(role)
        .bind(member)
        .fetch_one(&mut *self)
        .await?;
        Ok(member_of)
    }

    async fn add_member(&mut self, role: &str, member: &str) -> StoreResult<()> {
        let grant: String = sqlx::query_scalar("SELECT format('GRANT %I TO %I', $1::text, $2::text)")
            .bind(role)
            .bind(member)
            .fetch_one(&mut *self)
            .await?;
        sqlx::query(AssertSqlSafe(grant.as_str()))
            .execute(&mut *self)
            .await?;
        Ok(())
    }
}

/// Catalog held in memory: principals with their SID and role memberships.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    principals: BTreeMap<String, String>,
    memberships: BTreeSet<(String, String)>,
    calls: usize
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sid_of(&self, name: &str) -> Option<&str> {
        self.principals.get(name).map(String::as_str)
    }

    pub fn has_member(&self, role: &str, member: &str) -> bool {
        self.memberships
            .contains(&(role.to_string(), member.to_string()))
    }

    /// Catalog steps invoked so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

#[async_trait]
impl PrincipalCatalog for InMemoryCatalog {
    async fn principal_exists(&mut self, name: &str) -> StoreResult<bool> {
        self.calls += 1;
        Ok(self.principals.contains_key(name))
    }

    async fn create_principal(&mut self, name: &str, sid: &str) -> StoreResult<()> {
        self.calls += 1;
        self.principals.insert(name.to_string(), sid.to_string());
        Ok(())
    }

    async fn is_member(&mut self, role: &str, member: &str) -> StoreResult<bool> {
        self.calls += 1;
        Ok(self.has_member(role, member))
    }

    async fn add_member(&mut self, role: &str, member: &str) -> StoreResult<()> {
        self.calls += 1;
        self.memberships
            .insert((role.to_string(), member.to_string()));
        Ok(())
    }
}

/// Runs the guarded create-and-grant sequence against `catalog`.
///
/// The request is validated and the SID encoded before the catalog is
/// touched, so a malformed identifier performs no database work.
pub async fn provision<C: PrincipalCatalog + ?Sized>(
    catalog: &mut C,
    request: &RoleRequest,
    roles: &RoleSet
) -> StoreResult<ProvisionOutcome> {
    request.validate()?;
    let sid = utils::id_to_sid(&request.id)?;
    let name = request.name.trim();

    let mut rows_affected = 0;
    let created = if catalog.principal_exists(name).await? {
        false
    } else {
        catalog.create_principal(name, &sid).await?;
        rows_affected += 1;
        true
    };

    let mut granted = Vec::new();
    for role in [&roles.reader, &roles.writer] {
        if !catalog.is_member(role, name).await? {
            catalog.add_member(role, name).await?;
            rows_affected += 1;
            granted.push(role.clone());
        }
    }

    Ok(ProvisionOutcome {
        sid,
        created,
        granted,
        rows_affected
    })
}

#[async_trait]
pub trait RoleProvisioning: Send + Sync {
    async fn provision(&self, request: &RoleRequest) -> StoreResult<ProvisionOutcome>;
}

/// Provisions against PostgreSQL, one transaction per request.
pub struct PgRoleProvisioner {
    pool: PgPool,
    roles: RoleSet
}

impl PgRoleProvisioner {
    pub fn new(pool: PgPool, roles: RoleSet) -> Self {
        Self { pool, roles }
    }

    /// SID recorded on `name`, if the role exists and carries one.
    pub async fn principal_sid(&self, name: &str) -> StoreResult<Option<String>> {
        let sid: Option<String> = sqlx::query_scalar(
            "SELECT shobj_description(oid, 'pg_authid') FROM pg_roles WHERE rolname = $1"
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        Ok(sid)
    }
}

#[async_trait]
impl RoleProvisioning for PgRoleProvisioner {
    async fn provision(&self, request: &RoleRequest) -> StoreResult<ProvisionOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = provision(&mut *tx, request, &self.roles).await?;
        tx.commit().await?;

        info!(
            principal = %request.name,
            created = outcome.created,
            rows_affected = outcome.rows_affected,
            "Database principal provisioned"
        );
        Ok(outcome)
    }
}

pub struct InMemoryRoleProvisioner {
    catalog: Mutex<InMemoryCatalog>,
    roles: RoleSet
}

impl InMemoryRoleProvisioner {
    pub fn new(roles: RoleSet) -> Self {
        Self {
            catalog: Mutex::new(InMemoryCatalog::new()),
            roles
        }
    }

    pub async fn sid_of(&self, name: &str) -> Option<String> {
        self.catalog.lock().await.sid_of(name).map(str::to_string)
    }

    pub async fn has_member(&self, role: &str, member: &str) -> bool {
        self.catalog.lock().await.has_member(role, member)
    }
}

#[async_trait]
impl RoleProvisioning for InMemoryRoleProvisioner {
    async fn provision(&self, request: &RoleRequest) -> StoreResult<ProvisionOutcome> {
        let mut catalog = self.catalog.lock().await;
        let outcome = provision(&mut *catalog, request, &self.roles).await?;
        debug!(principal = %request.name, rows_affected = outcome.rows_affected, "In-memory principal provisioned");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errors::{Classify, ErrorKind};

    const GUID: &str = "00000000-0000-0000-0000-000000000001";

    fn roles() -> RoleSet {
        RoleSet {
            reader: "pg_read_all_data".to_string(),
            writer: "pg_write_all_data".to_string()
        }
    }

    #[tokio::test]
    async fn test_first_call_creates_and_grants() {
        let mut catalog = InMemoryCatalog::new();
        let outcome = provision(&mut catalog, &RoleRequest::new("svc-id", GUID), &roles())
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.rows_affected, 3);
        assert_eq!(outcome.granted, vec!["pg_read_all_data", "pg_write_all_data"]);
        assert_eq!(
            catalog.sid_of("svc-id"),
            Some(r"0x\00\00\00\00\00\00\00\00\00\00\00\00\00\00\00\01")
        );
        assert!(catalog.has_member("pg_read_all_data", "svc-id"));
        assert!(catalog.has_member("pg_write_all_data", "svc-id"));
    }

    #[tokio::test]
    async fn test_repeat_call_affects_nothing() {
        let mut catalog = InMemoryCatalog::new();
        let request = RoleRequest::new("svc-id", GUID);
        provision(&mut catalog, &request, &roles()).await.unwrap();

        let again = provision(&mut catalog, &request, &roles()).await.unwrap();
        assert!(!again.created);
        assert!(again.granted.is_empty());
        assert_eq!(again.rows_affected, 0);
    }

    #[tokio::test]
    async fn test_existing_principal_only_gets_missing_grant() {
        let mut catalog = InMemoryCatalog::new();
        catalog.create_principal("svc-id", "0x").await.unwrap();
        catalog.add_member("pg_read_all_data", "svc-id").await.unwrap();

        let outcome = provision(&mut catalog, &RoleRequest::new("svc-id", GUID), &roles())
            .await
            .unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.granted, vec!["pg_write_all_data"]);
        assert_eq!(outcome.rows_affected, 1);
    }

    #[tokio::test]
    async fn test_malformed_id_touches_no_catalog() {
        let mut catalog = InMemoryCatalog::new();
        let err = provision(&mut catalog, &RoleRequest::new("svc-id", "not-a-guid"), &roles())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        assert_eq!(catalog.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_name_is_rejected() {
        let mut catalog = InMemoryCatalog::new();
        let err = provision(&mut catalog, &RoleRequest::new(" ", GUID), &roles())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(catalog.calls(), 0);
    }

    #[test]
    fn test_request_accepts_either_casing() {
        let pascal: RoleRequest =
            serde_json::from_str(r#"{"Name":"svc-id","Id":"abc"}"#).unwrap();
        let lower: RoleRequest = serde_json::from_str(r#"{"name":"svc-id","id":"abc"}"#).unwrap();
        assert_eq!(pascal, lower);
        assert_eq!(pascal, RoleRequest::new("svc-id", "abc"));
    }

    #[tokio::test]
    async fn test_in_memory_provisioner_shares_state() {
        let provisioner = InMemoryRoleProvisioner::new(roles());
        let request = RoleRequest::new("svc-id", GUID);

        assert_eq!(provisioner.provision(&request).await.unwrap().rows_affected, 3);
        assert_eq!(provisioner.provision(&request).await.unwrap().rows_affected, 0);
        assert!(provisioner.has_member("pg_write_all_data", "svc-id").await);
        assert!(provisioner.sid_of("svc-id").await.is_some());
    }
}
