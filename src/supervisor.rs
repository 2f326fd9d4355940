// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD supervisor: one reconciler per synchronized kind.
//!
//! The supervisor watches CustomResourceDefinitions on the robot cluster and
//! keeps a map of `CRD name -> running reconciler`. Every CRD change tears
//! the kind's reconciler down and builds a fresh one from the new metadata;
//! rebuilding the informer caches is heavyweight, but it makes direction and
//! annotation changes trivially correct. All lifecycle mutations happen on
//! this single task, so the map needs no locking and no two reconcilers can
//! ever drive the same kind.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ListParams};
use kube::runtime::watcher;
use kube::ResourceExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::ClusterHandle;
use crate::crd::KindDescriptor;
use crate::sync::Reconciler;

struct ReconcilerHandle {
    descriptor: KindDescriptor,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Watches CRDs and manages the fleet of per-kind reconcilers.
pub struct Supervisor {
    cloud: ClusterHandle,
    robot: ClusterHandle,
    robot_name: String,
    reconcilers: HashMap<String, ReconcilerHandle>,
}

impl Supervisor {
    /// Create a supervisor for the given cluster pair.
    #[must_use]
    pub fn new(cloud: ClusterHandle, robot: ClusterHandle, robot_name: String) -> Self {
        Self {
            cloud,
            robot,
            robot_name,
            reconcilers: HashMap::new(),
        }
    }

    /// Run until `shutdown` fires, then stop every reconciler.
    ///
    /// # Errors
    ///
    /// Fails when the CRD endpoint on the robot cluster cannot serve an
    /// initial list; that is a fatal startup condition, not something to
    /// retry quietly.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let api: Api<CustomResourceDefinition> = Api::all(self.robot.client());

        // Probe before watching so an unreachable API server fails startup
        // instead of looping inside the watcher.
        api.list(&ListParams::default().limit(1))
            .await
            .context("listing CRDs on the robot cluster")?;
        info!("Watching CRDs on the robot cluster");

        let mut events = std::pin::pin!(watcher(api, watcher::Config::default()));
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.try_next() => match event {
                    Ok(Some(event)) => self.handle_event(event),
                    Ok(None) => break,
                    Err(err) => warn!(error = %err, "CRD watch interrupted, retrying"),
                }
            }
        }

        info!("Shutting down, stopping all reconcilers");
        self.stop_all().await;
        Ok(())
    }

    fn handle_event(&mut self, event: watcher::Event<CustomResourceDefinition>) {
        match event {
            watcher::Event::Apply(crd) | watcher::Event::InitApply(crd) => self.upsert(&crd),
            watcher::Event::Delete(crd) => self.remove(&crd.name_any()),
            watcher::Event::Init | watcher::Event::InitDone => {}
        }
    }

    /// Start (or restart) the reconciler for a CRD.
    fn upsert(&mut self, crd: &CustomResourceDefinition) {
        let name = crd.name_any();

        let descriptor = match KindDescriptor::from_crd(crd) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                error!(crd = %name, error = %err, "Skipping CRD with unusable configuration");
                // A reconciler running on a stale descriptor must not keep
                // writing under configuration the CRD no longer declares.
                self.remove(&name);
                return;
            }
        };

        // Watch restarts replay every CRD; only churn the reconciler when
        // the synchronization-relevant metadata actually changed.
        if let Some(handle) = self.reconcilers.get(&name) {
            if handle.descriptor == descriptor {
                debug!(crd = %name, "CRD unchanged, keeping reconciler");
                return;
            }
            warn!(crd = %name, "CRD changed, replacing reconciler");
            self.remove(&name);
        }

        let stop = CancellationToken::new();
        let reconciler = Reconciler::new(
            descriptor.clone(),
            &self.cloud,
            &self.robot,
            self.robot_name.clone(),
            stop.clone(),
        );
        let task = tokio::spawn(reconciler.run());
        self.reconcilers.insert(
            name,
            ReconcilerHandle {
                descriptor,
                stop,
                task,
            },
        );
    }

    /// Stop the reconciler for a CRD, leaving managed objects untouched.
    fn remove(&mut self, name: &str) {
        if let Some(handle) = self.reconcilers.remove(name) {
            info!(crd = name, "Stopping reconciler");
            handle.stop.cancel();
            // The old reconciler winds down in the background; in-flight API
            // calls are allowed to finish.
            drop(handle.task);
        }
    }

    async fn stop_all(&mut self) {
        for handle in self.reconcilers.values() {
            handle.stop.cancel();
        }
        let grace = Duration::from_secs(crate::constants::SHUTDOWN_GRACE_SECS);
        for (name, handle) in self.reconcilers.drain() {
            if tokio::time::timeout(grace, handle.task).await.is_err() {
                warn!(crd = %name, "Reconciler did not stop within the grace period");
            }
        }
    }
}
