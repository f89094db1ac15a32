//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP on localhost.

use crate::handler::RpcHandler;
use crate::types::{CreateSnapshotParams, ListSnapshotsParams, RetryParams, SnapshotIdParams};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tunekeeper_core::error::{AppError, Result};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9531;

/// Every method the server exposes
pub const METHODS: [&str; 9] = [
    "snapshot.create.v1",
    "job.retry.v1",
    "lock.override.v1",
    "lock.status.v1",
    "poller.run.v1",
    "snapshot.get.v1",
    "snapshot.list.v1",
    "job.events.v1",
    "admin.stats.v1",
];

fn register_err(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Failed to register RPC method: {}", e))
}

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: Arc<RpcHandler>) -> Self {
        Self { config, handler }
    }

    /// Build the method table (also used by in-process tests)
    pub fn into_module(handler: Arc<RpcHandler>) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        let h = handler.clone();
        module
            .register_async_method("snapshot.create.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: CreateSnapshotParams = params.parse()?;
                    handler.create_snapshot(req).await
                }
            })
            .map_err(register_err)?;

        let h = handler.clone();
        module
            .register_async_method("job.retry.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: RetryParams = params.parse()?;
                    handler.retry(req).await
                }
            })
            .map_err(register_err)?;

        // Administrative APIs
        let h = handler.clone();
        module
            .register_async_method("lock.override.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: SnapshotIdParams = params.parse()?;
                    handler.override_lock(req).await
                }
            })
            .map_err(register_err)?;

        let h = handler.clone();
        module
            .register_async_method("lock.status.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: SnapshotIdParams = params.parse()?;
                    handler.lock_status(req).await
                }
            })
            .map_err(register_err)?;

        let h = handler.clone();
        module
            .register_async_method("poller.run.v1", move |_, _, _| {
                let handler = h.clone();
                async move { handler.run_poller().await }
            })
            .map_err(register_err)?;

        // Read-only views
        let h = handler.clone();
        module
            .register_async_method("snapshot.get.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: SnapshotIdParams = params.parse()?;
                    handler.get_snapshot(req).await
                }
            })
            .map_err(register_err)?;

        let h = handler.clone();
        module
            .register_async_method("snapshot.list.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: Option<ListSnapshotsParams> = params.parse()?;
                    handler.list_snapshots(req.unwrap_or_default()).await
                }
            })
            .map_err(register_err)?;

        let h = handler.clone();
        module
            .register_async_method("job.events.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: SnapshotIdParams = params.parse()?;
                    handler.job_events(req).await
                }
            })
            .map_err(register_err)?;

        let h = handler;
        module
            .register_async_method("admin.stats.v1", move |_, _, _| {
                let handler = h.clone();
                async move { handler.stats().await }
            })
            .map_err(register_err)?;

        Ok(module)
    }

    /// Start the JSON-RPC server
    ///
    /// Binds to the configured host (127.0.0.1 by default, no external access).
    /// Returns the handle and the bound address (port 0 picks a free port).
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Config(format!("Failed to bind RPC server on {}: {}", addr, e)))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| AppError::Internal(format!("RPC server has no local address: {}", e)))?;

        let module = Self::into_module(self.handler)?;
        let handle = server.start(module);

        info!(
            addr = %local_addr,
            methods = METHODS.len(),
            "JSON-RPC server started"
        );
        Ok((handle, local_addr))
    }
}
