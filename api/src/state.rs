//! Application state shared by all handlers.

use azure::{
    ConfigurationClient, ConfigurationPublisher, InMemorySettingStore, SettingStore, TokenCredential
};
use config::{ConfigTree, Settings};
use std::future::Future;
use std::sync::Arc;
use storage::{
    Customer, InMemoryRepository, PgRoleProvisioner, PostgresRepository, Repository,
    RoleProvisioning, RoleSet, SupportTicket
};

use crate::error::{ApiError, ApiResult};

/// Shared application state for Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Validated settings bound from the effective configuration.
    pub settings: Arc<Settings>,
    /// Effective configuration snapshot, for the reflector.
    pub configuration: Arc<ConfigTree>,
    /// `None` outside Development when no App Configuration endpoint is configured.
    pub publisher: Option<ConfigurationPublisher>,
    /// `None` when no SQL connection string is configured.
    pub provisioner: Option<Arc<dyn RoleProvisioning>>,
    pub customers: Arc<dyn Repository<Customer>>,
    pub tickets: Arc<dyn Repository<SupportTicket>>
}

impl AppState {
    /// In-process repositories, no publisher, no provisioner.
    pub fn in_memory(settings: Settings, configuration: ConfigTree) -> Self {
        let page_size = settings.datasync.page_size;
        let soft_delete = settings.datasync.soft_delete;
        let customers = Arc::new(InMemoryRepository::<Customer>::new(page_size, soft_delete));
        let tickets = InMemoryRepository::<SupportTicket>::new(page_size, soft_delete)
            .with_parent(customers.clone());

        Self {
            settings: Arc::new(settings),
            configuration: Arc::new(configuration),
            publisher: None,
            provisioner: None,
            customers,
            tickets
        }
    }

    /// Wires every collaborator the settings ask for.
    ///
    /// Without a SQL connection string the entity store falls back to
    /// memory and role provisioning is unavailable. Without an App
    /// Configuration endpoint, Development publishes to memory.
    pub async fn connect(
        settings: Settings,
        configuration: ConfigTree,
        credential: Arc<dyn TokenCredential>
    ) -> ApiResult<Self> {
        let mut state = Self::in_memory(settings.clone(), configuration);

        if let Some(endpoint) = settings.app_configuration.endpoint.as_deref() {
            let client = ConfigurationClient::new(
                endpoint,
                settings.app_configuration.api_version.clone(),
                credential
            )?;
            state = state.with_setting_store(Arc::new(client));
        } else if settings.is_development() {
            tracing::warn!("No App Configuration endpoint configured; publishing to memory");
            state = state.with_setting_store(Arc::new(InMemorySettingStore::new()));
        } else {
            tracing::info!("No App Configuration endpoint configured; /api/appconfig disabled");
        }

        let pool = match settings.sql.connection_string.as_deref() {
            Some(connection_string) => {
                let pool = storage::connect(connection_string, &settings.sql).await?;
                if settings.is_development() {
                    storage::ensure_schema(&pool).await?;
                }
                let page_size = settings.datasync.page_size;
                let soft_delete = settings.datasync.soft_delete;
                state = state.with_repositories(
                    Arc::new(PostgresRepository::<Customer>::new(
                        pool.clone(),
                        page_size,
                        soft_delete
                    )),
                    Arc::new(PostgresRepository::<SupportTicket>::new(
                        pool.clone(),
                        page_size,
                        soft_delete
                    ))
                );
                Some(pool)
            }
            None => {
                tracing::warn!(
                    "No SQL connection string configured; serving tables from memory"
                );
                None
            }
        };

        let shares_pool =
            settings.sql.provisioning_connection_string() == settings.sql.connection_string.as_deref();
        let admin_pool = match (settings.sql.provisioning_connection_string(), pool) {
            (Some(_), Some(pool)) if shares_pool => Some(pool),
            (Some(admin), _) => Some(storage::connect(admin, &settings.sql).await?),
            (None, _) => None
        };
        if let Some(admin_pool) = admin_pool {
            state = state.with_role_provisioner(Arc::new(PgRoleProvisioner::new(
                admin_pool,
                RoleSet::from_settings(&settings.sql)
            )));
        }

        Ok(state)
    }

    #[must_use]
    pub fn with_setting_store(mut self, store: Arc<dyn SettingStore>) -> Self {
        self.publisher = Some(ConfigurationPublisher::new(store));
        self
    }

    #[must_use]
    pub fn with_role_provisioner(mut self, provisioner: Arc<dyn RoleProvisioning>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    #[must_use]
    pub fn with_repositories(
        mut self,
        customers: Arc<dyn Repository<Customer>>,
        tickets: Arc<dyn Repository<SupportTicket>>
    ) -> Self {
        self.customers = customers;
        self.tickets = tickets;
        self
    }

    /// Runs `operation` under the configured request timeout. Dropping the
    /// future on expiry cancels the in-flight call.
    pub async fn bounded<T, E, F>(&self, operation: F) -> ApiResult<T>
    where
        F: Future<Output = Result<T, E>>,
        ApiError: From<E>
    {
        let limit = self.settings.server.request_timeout();
        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => {
                tracing::warn!(timeout = ?limit, "Operation timed out");
                Err(ApiError::Timeout(limit))
            }
        }
    }
}
