// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Uniform handles on the two clusters.
//!
//! Synchronized kinds are only known at runtime, so all API access goes
//! through [`DynamicObject`] endpoints resolved from a [`KindDescriptor`].
//! A [`ClusterHandle`] names one cluster; a [`KindHandle`] narrows it to one
//! kind and offers the operations the reconcilers need: point reads and
//! writes plus an informer stream that delivers the initial snapshot, live
//! events, and a periodic full replay to correct silent drift.

use std::fmt;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tracing::warn;

use crate::crd::KindDescriptor;

/// Namespace/name pair identifying one object of a kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace, absent for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key of an existing object.
    #[must_use]
    pub fn from_object(object: &DynamicObject) -> Self {
        Self {
            namespace: object.metadata.namespace.clone(),
            name: object.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Handle on one cluster.
#[derive(Clone)]
pub struct ClusterHandle {
    client: Client,
    name: &'static str,
}

impl ClusterHandle {
    /// Wrap a client under a logical cluster name (`"cloud"` / `"robot"`).
    #[must_use]
    pub fn new(client: Client, name: &'static str) -> Self {
        Self { client, name }
    }

    /// The underlying API client.
    #[must_use]
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Logical cluster name, used in logs and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Narrow this handle to a single kind.
    #[must_use]
    pub fn kind_handle(&self, descriptor: &KindDescriptor) -> KindHandle {
        KindHandle {
            client: self.client.clone(),
            cluster: self.name,
            kind: descriptor.kind.clone(),
            resource: descriptor.api_resource(),
            namespaced: descriptor.namespaced,
        }
    }
}

/// Handle on one kind within one cluster.
#[derive(Clone)]
pub struct KindHandle {
    client: Client,
    cluster: &'static str,
    kind: String,
    resource: ApiResource,
    namespaced: bool,
}

impl KindHandle {
    /// Logical name of the cluster this handle talks to.
    #[must_use]
    pub fn cluster(&self) -> &'static str {
        self.cluster
    }

    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) if self.namespaced => {
                Api::namespaced_with(self.client.clone(), namespace, &self.resource)
            }
            _ => Api::all_with(self.client.clone(), &self.resource),
        }
    }

    /// Fetch one object, mapping not-found to `None`.
    pub async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, kube::Error> {
        self.api(key.namespace.as_deref()).get_opt(&key.name).await
    }

    /// Create an object.
    pub async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, kube::Error> {
        self.api(object.metadata.namespace.as_deref())
            .create(&PostParams::default(), object)
            .await
    }

    /// Replace an object (full update; conflicts surface as API errors).
    pub async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, kube::Error> {
        self.api(object.metadata.namespace.as_deref())
            .replace(&object.name_any(), &PostParams::default(), object)
            .await
    }

    /// Replace an object's status through the status subresource endpoint.
    pub async fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, kube::Error> {
        self.api(object.metadata.namespace.as_deref())
            .replace_status(&object.name_any(), &PostParams::default(), object)
            .await
    }

    /// Delete an object. An object that is already gone is not an error.
    pub async fn delete(&self, key: &ObjectKey) -> Result<(), kube::Error> {
        match self
            .api(key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Stream of objects to reconcile.
    ///
    /// Yields the initial list snapshot, every subsequent add/update/delete
    /// (delete events yield the final object so routing can still inspect its
    /// labels), and a full replay of the server state every `resync`. Watch
    /// errors are logged and retried by the underlying watcher; relist errors
    /// are logged and skipped until the next tick.
    #[must_use]
    pub fn informer(&self, resync: Duration) -> BoxStream<'static, DynamicObject> {
        let api = self.api(None);
        let cluster = self.cluster;
        let kind = self.kind.clone();

        let events = watcher(api.clone(), watcher::Config::default())
            .filter_map(move |event| {
                let kind = kind.clone();
                async move {
                    match event {
                        Ok(event) => Some(stream::iter(objects_of(event))),
                        Err(err) => {
                            warn!(cluster, kind = %kind, error = %err, "watch interrupted, retrying");
                            None
                        }
                    }
                }
            })
            .flatten();

        let kind = self.kind.clone();
        let start = tokio::time::Instant::now() + resync;
        let relists = stream::unfold(
            (api, tokio::time::interval_at(start, resync)),
            move |(api, mut ticker)| {
                let kind = kind.clone();
                async move {
                    ticker.tick().await;
                    let objects = match api.list(&ListParams::default()).await {
                        Ok(list) => list.items,
                        Err(err) => {
                            warn!(cluster, kind = %kind, error = %err, "periodic relist failed");
                            Vec::new()
                        }
                    };
                    Some((stream::iter(objects), (api, ticker)))
                }
            },
        )
        .flatten();

        stream::select(events, relists).boxed()
    }
}

fn objects_of(event: watcher::Event<DynamicObject>) -> Vec<DynamicObject> {
    match event {
        watcher::Event::Apply(object)
        | watcher::Event::InitApply(object)
        | watcher::Event::Delete(object) => vec![object],
        watcher::Event::Init | watcher::Event::InitDone => Vec::new(),
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
