// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-kind reconciler driving both sync directions.
//!
//! A reconciler owns two informer streams (one per cluster) and a single
//! worker task. Informer events are routed by origin: events from the
//! source-of-spec cluster enqueue a spec-direction step, events from the
//! source-of-status cluster enqueue a status-direction step. The work queue
//! coalesces per `(object, direction)`, and the single worker serializes all
//! steps of a kind, so the two directions can never interleave for the same
//! object.
//!
//! Every step starts from fresh `get`s against both clusters rather than
//! from the event payload; combined with the 5-minute informer resync this
//! makes steps idempotent and lets the system converge after missed events.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use kube::api::DynamicObject;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::annotations::{get_annotation, matches_robot_name};
use crate::cluster::{ClusterHandle, KindHandle, ObjectKey};
use crate::constants::{ANNOTATION_REMOTE_RESOURCE_VERSION, RESYNC_PERIOD_SECS};
use crate::crd::{KindDescriptor, SpecSource};
use crate::metrics;
use crate::sync::merge::{self, MergeError};
use crate::sync::retry::{default_backoff, is_retryable_error, ExponentialBackoff};

/// Which way a sync step moves data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Existence, `spec`, labels and annotations toward the status source
    Spec,
    /// `status` and finalizers back toward the spec source
    Status,
}

impl Direction {
    /// Stable label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Spec => "spec",
            Direction::Status => "status",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a single sync step.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// An API call failed; retryable depending on the status code.
    #[error(transparent)]
    Api(#[from] kube::Error),

    /// The object is structurally unusable; the step is skipped, not retried.
    #[error(transparent)]
    Malformed(#[from] MergeError),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct WorkItem {
    key: ObjectKey,
    direction: Direction,
}

/// Coalescing work queue.
///
/// An item that is already pending is not enqueued twice; it is removed from
/// the pending set when the worker picks it up, so events arriving during
/// processing schedule one further step.
struct WorkQueue {
    pending: Mutex<HashSet<WorkItem>>,
    tx: mpsc::UnboundedSender<WorkItem>,
}

impl WorkQueue {
    fn new(tx: mpsc::UnboundedSender<WorkItem>) -> Self {
        Self {
            pending: Mutex::new(HashSet::new()),
            tx,
        }
    }

    fn enqueue(&self, item: WorkItem) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.insert(item.clone()) {
            // The receiver only closes on shutdown; a failed send is fine.
            let _ = self.tx.send(item);
        }
    }

    fn start_processing(&self, item: &WorkItem) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(item);
    }
}

/// Synchronizes one kind between the two clusters until stopped.
pub struct Reconciler {
    descriptor: KindDescriptor,
    spec_source: KindHandle,
    status_source: KindHandle,
    robot_name: String,
    stop: CancellationToken,
}

impl Reconciler {
    /// Build a reconciler for `descriptor`, assigning cluster roles from its
    /// spec source.
    #[must_use]
    pub fn new(
        descriptor: KindDescriptor,
        cloud: &ClusterHandle,
        robot: &ClusterHandle,
        robot_name: String,
        stop: CancellationToken,
    ) -> Self {
        let (spec_source, status_source) = match descriptor.spec_source {
            SpecSource::Cloud => (cloud.kind_handle(&descriptor), robot.kind_handle(&descriptor)),
            SpecSource::Robot => (robot.kind_handle(&descriptor), cloud.kind_handle(&descriptor)),
        };
        Self {
            descriptor,
            spec_source,
            status_source,
            robot_name,
            stop,
        }
    }

    /// Run informers and worker until the stop signal fires.
    pub async fn run(self) {
        info!(
            kind = %self.descriptor.kind,
            spec_source = %self.descriptor.spec_source,
            filter_by_robot_name = self.descriptor.filter_by_robot_name,
            status_subtree = ?self.descriptor.status_subtree,
            "Starting reconciler"
        );
        metrics::record_reconciler_started();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = Arc::new(WorkQueue::new(tx));

        let spec_informer = tokio::spawn(route_events(
            self.spec_source.clone(),
            Direction::Spec,
            self.descriptor.clone(),
            self.robot_name.clone(),
            queue.clone(),
            self.stop.clone(),
        ));
        let status_informer = tokio::spawn(route_events(
            self.status_source.clone(),
            Direction::Status,
            self.descriptor.clone(),
            self.robot_name.clone(),
            queue.clone(),
            self.stop.clone(),
        ));

        let mut backoffs: HashMap<WorkItem, ExponentialBackoff> = HashMap::new();
        loop {
            tokio::select! {
                () = self.stop.cancelled() => break,
                item = rx.recv() => {
                    let Some(item) = item else { break };
                    queue.start_processing(&item);
                    self.process(item, &queue, &mut backoffs).await;
                }
            }
        }

        let _ = tokio::join!(spec_informer, status_informer);
        metrics::record_reconciler_stopped();
        info!(kind = %self.descriptor.kind, "Reconciler stopped");
    }

    async fn process(
        &self,
        item: WorkItem,
        queue: &Arc<WorkQueue>,
        backoffs: &mut HashMap<WorkItem, ExponentialBackoff>,
    ) {
        let kind = self.descriptor.kind.as_str();
        let started = Instant::now();
        let result = match item.direction {
            Direction::Spec => self.sync_spec(&item.key).await,
            Direction::Status => self.sync_status(&item.key).await,
        };
        let duration = started.elapsed();

        match result {
            Ok(()) => {
                backoffs.remove(&item);
                metrics::record_sync_success(kind, item.direction.as_str(), duration);
            }
            Err(SyncError::Malformed(err)) => {
                backoffs.remove(&item);
                metrics::record_sync_skipped(kind, item.direction.as_str());
                warn!(
                    kind,
                    object = %item.key,
                    direction = %item.direction,
                    error = %err,
                    "Object is malformed, skipping sync step"
                );
            }
            Err(SyncError::Api(err)) if is_retryable_error(&err) => {
                metrics::record_sync_error(kind, item.direction.as_str(), duration);
                let backoff = backoffs.entry(item.clone()).or_insert_with(default_backoff);
                match backoff.next_backoff() {
                    Some(delay) => {
                        warn!(
                            kind,
                            object = %item.key,
                            direction = %item.direction,
                            retry_after = ?delay,
                            error = %err,
                            "Sync step failed, will retry"
                        );
                        requeue_after(queue.clone(), item, delay, self.stop.clone());
                    }
                    None => {
                        backoffs.remove(&item);
                        error!(
                            kind,
                            object = %item.key,
                            direction = %item.direction,
                            error = %err,
                            "Retries exhausted, dropping work item until the next event"
                        );
                    }
                }
            }
            Err(SyncError::Api(err)) => {
                backoffs.remove(&item);
                metrics::record_sync_error(kind, item.direction.as_str(), duration);
                error!(
                    kind,
                    object = %item.key,
                    direction = %item.direction,
                    error = %err,
                    "Sync step failed with a non-retryable error"
                );
            }
        }
    }

    /// Carry existence, `spec`, labels and annotations to the status source.
    async fn sync_spec(&self, key: &ObjectKey) -> Result<(), SyncError> {
        let kind = self.descriptor.kind.as_str();

        let Some(source) = self.spec_source.get(key).await? else {
            // Source object is gone; make sure the target follows.
            self.status_source.delete(key).await?;
            debug!(kind, object = %key, "Spec source gone, ensured target is deleted");
            return Ok(());
        };

        let existing = self.status_source.get(key).await?;
        self.warn_on_split_brain(key, existing.as_ref(), &source);

        let desired = merge::merge_for_spec(&source, existing.as_ref());
        let applied = match existing {
            None => {
                let created = self.status_source.create(&desired).await?;
                metrics::record_object_created(kind, self.status_source.cluster());
                info!(
                    kind,
                    object = %key,
                    cluster = self.status_source.cluster(),
                    "Created synchronized object"
                );
                created
            }
            Some(_) => {
                let updated = self.status_source.update(&desired).await?;
                metrics::record_object_updated(kind, self.status_source.cluster());
                debug!(kind, object = %key, "Updated synchronized object");
                updated
            }
        };

        if source.metadata.deletion_timestamp.is_some()
            && applied.metadata.deletion_timestamp.is_none()
        {
            self.status_source.delete(key).await?;
            metrics::record_object_deleted(kind, self.status_source.cluster());
            info!(
                kind,
                object = %key,
                cluster = self.status_source.cluster(),
                "Propagated deletion"
            );
        }
        Ok(())
    }

    /// Carry `status` and finalizers back onto the spec-source object.
    async fn sync_status(&self, key: &ObjectKey) -> Result<(), SyncError> {
        let kind = self.descriptor.kind.as_str();

        let Some(target) = self.spec_source.get(key).await? else {
            debug!(kind, object = %key, "Spec source gone, nothing to update");
            return Ok(());
        };
        let Some(source) = self.status_source.get(key).await? else {
            debug!(kind, object = %key, "Status source gone, nothing to copy");
            return Ok(());
        };

        let mut desired =
            merge::merge_for_status(&target, &source, self.descriptor.status_subtree.as_deref())?;

        if self.descriptor.status_is_subresource {
            // The status endpoint rejects null payloads.
            merge::ensure_status_object(&mut desired);
            let updated = self.spec_source.update_status(&desired).await?;
            desired.metadata.resource_version = updated.metadata.resource_version;
        }

        // Finalizers and the resource-version annotation live in the main
        // resource, not the status subresource.
        self.spec_source.update(&desired).await?;
        metrics::record_object_updated(kind, self.spec_source.cluster());
        debug!(
            kind,
            object = %key,
            resource_version = %source.resource_version().unwrap_or_default(),
            "Propagated status"
        );
        Ok(())
    }

    fn warn_on_split_brain(
        &self,
        key: &ObjectKey,
        existing: Option<&DynamicObject>,
        source: &DynamicObject,
    ) {
        if split_brain_suspected(existing, source) {
            metrics::record_split_brain(&self.descriptor.kind);
            warn!(
                kind = %self.descriptor.kind,
                object = %key,
                "Status differs for an already-synchronized resource version; \
                 another syncer instance may be writing to this object"
            );
        }
    }
}

/// Whether the target still records the source's current resource version as
/// synchronized while the two status payloads disagree.
///
/// This only ever fires when a second syncer instance is driving the same
/// object; it is a diagnostic, nothing is corrected automatically.
fn split_brain_suspected(existing: Option<&DynamicObject>, source: &DynamicObject) -> bool {
    let Some(existing) = existing else {
        return false;
    };
    let Some(source_version) = source.resource_version() else {
        return false;
    };
    get_annotation(existing, ANNOTATION_REMOTE_RESOURCE_VERSION) == Some(source_version.as_str())
        && merge::status_value(existing) != merge::status_value(source)
}

/// Consume one informer stream and enqueue a step per delivered object.
async fn route_events(
    handle: KindHandle,
    direction: Direction,
    descriptor: KindDescriptor,
    robot_name: String,
    queue: Arc<WorkQueue>,
    stop: CancellationToken,
) {
    let mut objects = handle.informer(Duration::from_secs(RESYNC_PERIOD_SECS));
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            object = objects.next() => {
                let Some(object) = object else { break };
                if descriptor.filter_by_robot_name && !matches_robot_name(&object, &robot_name) {
                    continue;
                }
                queue.enqueue(WorkItem {
                    key: ObjectKey::from_object(&object),
                    direction,
                });
            }
        }
    }
}

fn requeue_after(queue: Arc<WorkQueue>, item: WorkItem, delay: Duration, stop: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            () = stop.cancelled() => {}
            () = tokio::time::sleep(delay) => queue.enqueue(item),
        }
    });
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
