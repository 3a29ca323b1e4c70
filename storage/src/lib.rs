//! # Storage Layer
//!
//! Entity store for the data-sync tables (PostgreSQL and in-memory
//! backends behind one [`Repository`] contract) and the database role
//! provisioner.

pub mod entity;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod roles;

pub use entity::{Customer, DEFAULT_TICKET_STATUS, EntityMeta, SupportTicket, TableRecord};
pub use error::{StoreError, StoreResult};
pub use memory::{ChildLookup, InMemoryRepository, ParentLookup};
pub use postgres::{PostgresRepository, connect, ensure_schema};
pub use repository::{ListQuery, Page, Repository};
pub use roles::{
    InMemoryCatalog, InMemoryRoleProvisioner, PgRoleProvisioner, PrincipalCatalog, ProvisionOutcome,
    RoleProvisioning, RoleRequest, RoleSet, provision
};
