//! Server setup and lifecycle.

use azure::{
    ChainedTokenCredential, ConfigurationClient, RemoteConfiguration, SecretClient,
    TokenCredential
};
use config::{ConfigTree, Settings};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::error::{ApiError, ApiResult};
use crate::routes::create_router;
use crate::state::AppState;

/// The Field Engineer HTTP server.
pub struct FieldEngineerServer {
    state: Arc<AppState>
}

impl FieldEngineerServer {
    /// Creates a server instance from an existing `AppState`.
    pub fn with_state(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Runs the HTTP server until Ctrl+C or SIGTERM.
    pub async fn run(self) -> ApiResult<()> {
        let server = &self.state.settings.server;
        let addr: SocketAddr = format!("{}:{}", server.host, server.port)
            .parse()
            .map_err(|e| ApiError::Server(format!("Invalid address: {e}")))?;

        let router = create_router(self.state.clone());

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApiError::Server(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!(
            %addr,
            environment = %self.state.settings.environment,
            "Field Engineer API starting"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::Server(format!("Server error: {e}")))?;

        tracing::info!("Field Engineer API stopped");
        Ok(())
    }

    /// Returns a reference to the application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

/// Signal handler for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        () = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the default level.
pub fn init_tracing(development: bool) {
    let default_level = if development { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
        )
        .init();
}

/// Effective configuration: local layers, then App Configuration when both
/// the store endpoint and Key Vault are configured.
pub async fn load_configuration(
    dir: &Path,
    credential: impl FnOnce(&Settings) -> ApiResult<Arc<dyn TokenCredential>>
) -> ApiResult<(Settings, ConfigTree, Arc<dyn TokenCredential>)> {
    let mut tree = config::load_local(dir)?;
    let local = Settings::from_tree(&tree)?;
    let credential = credential(&local)?;

    if let (true, Some(endpoint)) = (
        local.remote_configuration_enabled(),
        local.app_configuration.endpoint.as_deref()
    ) {
        let client = ConfigurationClient::new(
            endpoint,
            local.app_configuration.api_version.clone(),
            credential.clone()
        )?;
        let secrets = SecretClient::new(credential.clone())?;
        let remote = RemoteConfiguration::new(client, secrets).load().await?;

        let overridden = tree.merge(remote);
        tracing::info!(
            endpoint = %endpoint,
            overridden = overridden.len(),
            "Remote App Configuration applied"
        );
    }

    let settings = Settings::from_tree(&tree)?;
    Ok((settings, tree, credential))
}

fn chained_credential(settings: &Settings) -> ApiResult<Arc<dyn TokenCredential>> {
    let chain = ChainedTokenCredential::from_settings(&settings.credentials)?;
    tracing::debug!(providers = ?chain.provider_names(), "Credential chain configured");
    Ok(Arc::new(chain))
}

/// Entry point for running the server from the working directory and the
/// process environment.
pub async fn run_from_env() -> anyhow::Result<()> {
    let dir = std::env::current_dir()?;
    let development = config::load_local(&dir)
        .ok()
        .and_then(|tree| config::settings::environment_from(&tree).ok())
        .is_some_and(|environment| environment.is_development());
    init_tracing(development);

    let (settings, tree, credential) = load_configuration(&dir, chained_credential).await?;
    let state = AppState::connect(settings, tree, credential).await?;
    FieldEngineerServer::with_state(Arc::new(state)).run().await?;
    Ok(())
}
