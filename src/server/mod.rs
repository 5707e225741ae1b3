pub mod api;
pub mod error;


use crate::auth::{ AuthGate, HttpIdentityProvider };
use crate::cli::Args;
use crate::history::initialize_session_store;
use crate::llm::{ new_client, LlmConfig };
use self::api::AppState;
use axum_server::{ tls_rustls::RustlsConfig, Handle };
use log::{ error, info };
use std::error::Error;
use std::net::SocketAddr;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    /// Wires every collaborator from configuration. Nothing is read from globals.
    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let provider = HttpIdentityProvider::from_args(args)?;
        let sessions = initialize_session_store(args)?;
        let llm_config = LlmConfig::from_args(args);
        let chat = new_client(&llm_config)?;
        info!("Completion client configured: Model={}, URL={}", chat.get_model(), llm_config.base_url);

        let state = AppState {
            auth: AuthGate::new(Arc::new(provider)),
            sessions,
            chat,
            stream_idle_timeout: args.stream_idle_timeout(),
        };
        Ok(Self::new(args.server_addr.clone(), state, args.clone()))
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = api::build_router(self.state);

        if !self.args.enable_tls {
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                e
            })?;
            info!("HTTP server listening on: http://{}", addr);
            axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
            return Ok(());
        }

        match (&self.args.tls_cert_path, &self.args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let tls_config = RustlsConfig::from_pem_file(cert_path, key_path).await?;
                let handle = Handle::new();
                tokio::spawn(shutdown_on_signal(handle.clone(), shutdown_signal()));

                info!("HTTPS server listening on: https://{}", addr);
                axum_server
                    ::bind_rustls(addr, tls_config)
                    .handle(handle)
                    .serve(app.into_make_service()).await?;
                Ok(())
            }
            _ => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                Err("TLS enabled without cert/key".into())
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

/// How long in-flight TLS connections may keep running after shutdown starts.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Starts a graceful shutdown of `handle` once `signal` resolves.
async fn shutdown_on_signal<F>(handle: Handle, signal: F) where F: Future<Output = ()> {
    signal.await;
    handle.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
}
