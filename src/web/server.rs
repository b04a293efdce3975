//! Web server for filedrop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::Config;
use crate::{FiledropError, Result};

use super::handlers::AppState;
use super::health::Readiness;
use super::router::create_app;

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Allowed CORS origins.
    cors_origins: Vec<String>,
    /// How long shutdown waits for open connections.
    graceful_timeout: Duration,
    /// Readiness reported by the probe.
    readiness: Readiness,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config, app_state: AppState, readiness: Readiness) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| FiledropError::Config(format!("invalid server address: {e}")))?;

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
            cors_origins: config.web.cors_origins.clone(),
            graceful_timeout: Duration::from_secs(config.server.graceful_timeout_secs),
            readiness,
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn router(&self) -> Router {
        create_app(
            self.app_state.clone(),
            self.readiness.clone(),
            &self.cors_origins,
        )
    }

    /// Run the web server until `shutdown` resolves.
    ///
    /// Readiness turns off as soon as shutdown starts; open connections get
    /// the graceful timeout to finish.
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("Web server listening on http://{}", listener.local_addr()?);
        self.serve(listener, shutdown).await
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr<F>(self, shutdown: F) -> std::io::Result<SocketAddr>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = self.serve(listener, shutdown).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }

    async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let readiness = self.readiness.clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        });
        let mut server_task = tokio::spawn(async move { server.await });
        readiness.set_ready(true);

        tokio::select! {
            result = &mut server_task => {
                readiness.set_ready(false);
                return flatten(result);
            }
            _ = shutdown => {}
        }

        readiness.set_ready(false);
        tracing::info!("Web server is shutting down");
        let _ = stop_tx.send(());

        match tokio::time::timeout(self.graceful_timeout, &mut server_task).await {
            Ok(result) => {
                tracing::info!("Web server is stopped");
                flatten(result)
            }
            Err(_) => {
                tracing::warn!(
                    "Connections still open after {}s, closing them",
                    self.graceful_timeout.as_secs()
                );
                server_task.abort();
                Ok(())
            }
        }
    }
}

fn flatten(
    result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> std::io::Result<()> {
    match result {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
    }
}
