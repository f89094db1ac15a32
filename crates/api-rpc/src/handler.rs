//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC params to the application services.

use crate::error::to_rpc_error;
use crate::types::{
    CreateSnapshotParams, CreateSnapshotResponse, ListSnapshotsParams, LockOverrideResponse,
    LockStatusResponse, RetryParams, RetryResponse, SnapshotIdParams, SnapshotView,
    StatsResponse, MAX_LIST_LIMIT,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tunekeeper_core::application::{
    CreateSnapshotRequest, LockManager, PollReport, RetryOrchestrator, RetryRequest,
    SnapshotBuilder, StatusPoller,
};
use tunekeeper_core::domain::{JobEvent, JobStatus};
use tunekeeper_core::error::AppError;
use tunekeeper_core::port::{JobEventRepository, SnapshotRepository};

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    builder: Arc<SnapshotBuilder>,
    retry: Arc<RetryOrchestrator>,
    lock_manager: Arc<LockManager>,
    poller: Arc<StatusPoller>,
    snapshot_repo: Arc<dyn SnapshotRepository>,
    event_repo: Arc<dyn JobEventRepository>,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        builder: Arc<SnapshotBuilder>,
        retry: Arc<RetryOrchestrator>,
        lock_manager: Arc<LockManager>,
        poller: Arc<StatusPoller>,
        snapshot_repo: Arc<dyn SnapshotRepository>,
        event_repo: Arc<dyn JobEventRepository>,
    ) -> Self {
        Self {
            builder,
            retry,
            lock_manager,
            poller,
            snapshot_repo,
            event_repo,
            start_time: Instant::now(),
        }
    }

    /// snapshot.create.v1
    pub async fn create_snapshot(
        &self,
        params: CreateSnapshotParams,
    ) -> RpcResult<CreateSnapshotResponse> {
        let created = self
            .builder
            .create(CreateSnapshotRequest {
                filter_spec: params.filter_spec,
                name: params.name,
                requested_by: params.requested_by,
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(CreateSnapshotResponse {
            success: true,
            snapshot_id: created.snapshot_id,
            job_id: created.job_id,
            export_ref: created.export_ref,
            version: created.version,
            example_count: created.example_count,
        })
    }

    /// job.retry.v1
    pub async fn retry(&self, params: RetryParams) -> RpcResult<RetryResponse> {
        let origin = params.origin();
        let outcome = self
            .retry
            .retry(RetryRequest {
                snapshot_id: params.snapshot_id,
                job_id: params.job_id,
                retry_reason: params.retry_reason,
                retry_origin: origin,
                requested_by: params.requested_by,
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(RetryResponse {
            success: true,
            snapshot_id: outcome.snapshot_id,
            job_id: outcome.job_id,
            retry_count: outcome.retry_count,
            version: outcome.version,
        })
    }

    /// lock.override.v1 (administrative, no business validation)
    pub async fn override_lock(&self, params: SnapshotIdParams) -> RpcResult<LockOverrideResponse> {
        let released = self
            .lock_manager
            .force_release(&params.snapshot_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(LockOverrideResponse {
            snapshot_id: params.snapshot_id,
            released,
        })
    }

    /// lock.status.v1
    pub async fn lock_status(&self, params: SnapshotIdParams) -> RpcResult<LockStatusResponse> {
        let lock = self
            .lock_manager
            .active(&params.snapshot_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(LockStatusResponse::from_lock(
            params.snapshot_id,
            lock,
            self.lock_manager.now_millis(),
        ))
    }

    /// poller.run.v1
    pub async fn run_poller(&self) -> RpcResult<PollReport> {
        info!("Poll pass requested over RPC");
        self.poller.run_once().await.map_err(to_rpc_error)
    }

    /// snapshot.get.v1
    pub async fn get_snapshot(&self, params: SnapshotIdParams) -> RpcResult<SnapshotView> {
        self.snapshot_repo
            .find_by_id(&params.snapshot_id)
            .await
            .map_err(to_rpc_error)?
            .map(SnapshotView::from)
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "Snapshot {} not found",
                    params.snapshot_id
                )))
            })
    }

    /// snapshot.list.v1
    pub async fn list_snapshots(&self, params: ListSnapshotsParams) -> RpcResult<Vec<SnapshotView>> {
        if params.limit < 1 || params.limit > MAX_LIST_LIMIT || params.offset < 0 {
            return Err(to_rpc_error(AppError::Validation(format!(
                "limit must be 1..={} and offset >= 0",
                MAX_LIST_LIMIT
            ))));
        }

        let snapshots = self
            .snapshot_repo
            .list(params.status, params.limit, params.offset)
            .await
            .map_err(to_rpc_error)?;
        Ok(snapshots.into_iter().map(SnapshotView::from).collect())
    }

    /// job.events.v1
    pub async fn job_events(&self, params: SnapshotIdParams) -> RpcResult<Vec<JobEvent>> {
        // Unknown snapshot is an error, an empty history is not
        self.get_snapshot(SnapshotIdParams {
            snapshot_id: params.snapshot_id.clone(),
        })
        .await?;

        self.event_repo
            .list_for_snapshot(&params.snapshot_id)
            .await
            .map_err(to_rpc_error)
    }

    /// admin.stats.v1
    pub async fn stats(&self) -> RpcResult<StatsResponse> {
        let mut by_status = BTreeMap::new();
        let mut total_snapshots = 0;

        for status in JobStatus::ALL {
            let count = self
                .snapshot_repo
                .count_by_status(status)
                .await
                .map_err(to_rpc_error)?;
            total_snapshots += count;
            by_status.insert(status.to_string(), count);
        }

        Ok(StatsResponse {
            total_snapshots,
            by_status,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
            version: tunekeeper_core::VERSION.to_string(),
        })
    }
}
