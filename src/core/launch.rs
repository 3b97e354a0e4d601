use crate::config::LaunchConfig;
use crate::domain::model::AppRef;
use crate::domain::ports::AppResolver;
use crate::utils::error::{Result, ServiceError};
use crate::utils::validation::Validate;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Resolves the configured application and binds its listener.
pub struct Launcher<R: AppResolver> {
    config: LaunchConfig,
    resolver: R,
}

impl<R: AppResolver> Launcher<R> {
    pub fn new(config: LaunchConfig, resolver: R) -> Self {
        Self { config, resolver }
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Resolution happens before the socket is opened, so an unknown
    /// application never occupies the port.
    pub async fn bind(&self) -> Result<BoundServer> {
        self.config.validate()?;
        let app_ref = self.config.app_ref()?;
        let addr = self.config.socket_addr()?;

        let app = self.resolver.resolve(&app_ref)?;
        tracing::info!("Loaded application {}", app_ref);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServiceError::BindError { addr, source })?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Listening on http://{}", local_addr);

        Ok(BoundServer {
            listener,
            router: app.router(),
            local_addr,
            app_ref,
        })
    }

    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.bind().await?.serve_until(shutdown).await
    }
}

pub struct BoundServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
    app_ref: AppRef,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn app_ref(&self) -> &AppRef {
        &self.app_ref
    }

    /// Serves until `shutdown` resolves, then lets in-flight requests finish.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router.layer(TraceLayer::new_for_http());
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServiceError::ServerError {
                message: e.to_string(),
            })?;

        tracing::info!("Server on {} stopped", self.local_addr);
        Ok(())
    }
}

pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT"),
                }
                return;
            }
            _ => tracing::warn!("Could not register signal handlers, falling back to Ctrl-C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
