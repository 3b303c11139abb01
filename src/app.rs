//! App construction and the mountable transport surface.
//!
//! `SocketApi` collects registrations; `build` freezes them into an `App`
//! whose routes can be served directly or mounted into any axum host.

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::ingress;
use crate::publisher::Publisher;
use crate::registry::{RegistryError, Router};
use crate::session;
use crate::state::{AppState, Shared};
use axum::routing::{get, post};
use std::net::SocketAddr;
use tracing::info;

/// Builder for a SocketAPI application: configuration plus the endpoint
/// registry populated at startup.
#[derive(Default)]
pub struct SocketApi {
    config: Config,
    router: Router,
}

impl SocketApi {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            router: Router::new(),
        }
    }

    /// Register one endpoint.  Name collisions within a kind are fatal at
    /// startup.
    pub fn register(&mut self, endpoint: Endpoint) -> Result<(), RegistryError> {
        self.router.register(endpoint)
    }

    /// Merge a router fragment into the app's registry.
    pub fn include_router(&mut self, router: Router) -> Result<(), RegistryError> {
        self.router.include_router(router)
    }

    /// Freeze the registry.  After this, endpoint lookup is read-only and
    /// safe for unsynchronized concurrent reads.
    pub fn build(self) -> App {
        App {
            state: AppState {
                shared: Shared::new(self.router.freeze(), self.config),
            },
        }
    }
}

/// A built application.  Immutable endpoint tables; live session and
/// subscription state inside.
pub struct App {
    state: AppState,
}

impl App {
    /// The mountable route surface: `GET /ws` (WebSocket upgrade) and
    /// `POST /broadcast` (ingress).
    ///
    /// The ingress allow-list needs the peer address, so the hosting
    /// server must be built with
    /// `into_make_service_with_connect_info::<SocketAddr>()`, as
    /// [`App::serve`] does.
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .route("/ws", get(session::ws_handler))
            .route("/broadcast", post(ingress::broadcast_ingress))
            .with_state(self.state.clone())
    }

    /// Handle for broadcasting from code that runs outside any handler
    /// invocation, via the loopback ingress.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(&self.state.shared.config)
    }

    /// Serve the app on `listener` until Ctrl-C or SIGTERM.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "socketapi listening");
        }
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
    }
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
