//! Server runtime
//!
//! Binds the TCP listener, starts the Router actor, and runs the accept
//! loop, spawning one handler task per connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::router::{Router, RouterHandle};

/// A bound relay server
pub struct Server {
    listener: TcpListener,
    router: RouterHandle,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Bind the configured address and start the Router actor
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen).await?;
        let (router, handle) = Router::channel(config.command_buffer);
        tokio::spawn(router.run());

        Ok(Self {
            listener,
            router: handle,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for collaborators that want to broadcast to all clients
    pub fn router(&self) -> RouterHandle {
        self.router.clone()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            router,
            config,
        } = self;
        tokio::pin!(shutdown);

        info!(
            "Relay listening on ws://{}{}",
            listener.local_addr()?,
            config.path
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Relay shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => spawn_handler(stream, addr, &router, &config),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<(), AppError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install ctrl-c handler: {}", e);
            }
        })
        .await
    }
}

fn spawn_handler(
    stream: TcpStream,
    addr: SocketAddr,
    router: &RouterHandle,
    config: &Arc<ServerConfig>,
) {
    info!("New connection from {}", addr);
    let router = router.clone();
    let config = Arc::clone(config);

    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, router, config).await {
            error!("Connection handler error for {}: {}", addr, e);
        }
    });
}
