use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware,
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsAcceptor;
use axum_server::Handle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::access::{self, AllowListAcceptor, Policy};
use crate::config::ServerConfig;
use crate::fs::FileSystem;
use crate::resolver::PathResolver;
use crate::{routes, tls};

/// Shared state handed to every gate and handler.
#[derive(Clone)]
pub struct AppState {
    pub fs: Arc<FileSystem>,
    pub policy: Arc<Policy>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        AppState {
            fs: Arc::new(FileSystem::new(PathResolver::new(&config.root))),
            policy: Arc::new(config.policy()),
        }
    }
}

impl FromRef<AppState> for Arc<FileSystem> {
    fn from_ref(state: &AppState) -> Self {
        state.fs.clone()
    }
}

impl FromRef<AppState> for Arc<Policy> {
    fn from_ref(state: &AppState) -> Self {
        state.policy.clone()
    }
}

/// Routes every path to the operation handlers behind the request gates.
/// The allow-list gate is not part of the router; it runs at accept time.
pub fn router(state: AppState, max_body_size: usize) -> Router {
    let operations = get(routes::read)
        .post(routes::create_directory)
        .put(routes::write_file)
        .delete(routes::delete);

    Router::new()
        .route("/", operations.clone())
        .route("/*path", operations)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    access::credential_gate,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    access::write_gate,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    access::root_gate,
                ))
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .with_state(state)
}

pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
    handle: Handle,
}

impl HttpServer {
    pub fn new(config: ServerConfig) -> Self {
        let state = AppState::new(&config);
        HttpServer {
            config,
            state,
            handle: Handle::new(),
        }
    }

    /// Handle for discovering the bound address and shutting down.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub async fn run(self) -> Result<()> {
        let app = router(self.state.clone(), self.config.max_body_size);
        let acceptor = AllowListAcceptor::new(Arc::new(self.state.policy.allow_list.clone()));
        let addr = self.config.listen;

        info!(
            root = %self.config.root.display(),
            read_only = self.config.read_only,
            accounts = !self.state.policy.accounts.is_empty(),
            allow_list = !self.state.policy.allow_list.is_unrestricted(),
            "serving shared root"
        );

        match &self.config.tls {
            Some(tls_config) => {
                let rustls = tls::rustls_config(tls_config).context("loading TLS material")?;
                info!("HTTPS server listening on {}", addr);
                axum_server::bind(addr)
                    .acceptor(RustlsAcceptor::new(rustls).acceptor(acceptor))
                    .handle(self.handle)
                    .serve(app.into_make_service())
                    .await
                    .context("HTTPS server failed")?;
            }
            None => {
                info!("HTTP server listening on {}", addr);
                axum_server::bind(addr)
                    .acceptor(acceptor)
                    .handle(self.handle)
                    .serve(app.into_make_service())
                    .await
                    .context("HTTP server failed")?;
            }
        }
        Ok(())
    }
}
