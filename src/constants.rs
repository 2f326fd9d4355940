// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the cr-syncer daemon.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Annotation & Label Keys
// ============================================================================

/// Annotation marking a downstream object as created and owned by the syncer
pub const ANNOTATION_OWNED_BY_UPSTREAM: &str = "cr-syncer.cloudrobotics.com/owned-by-upstream";

/// Annotation on the spec-source object recording which status-source
/// `resourceVersion` produced the status currently visible there
pub const ANNOTATION_REMOTE_RESOURCE_VERSION: &str =
    "cr-syncer.cloudrobotics.com/remote-resource-version";

/// CRD annotation: only synchronize objects labelled with the configured robot name
pub const ANNOTATION_FILTER_BY_ROBOT_NAME: &str =
    "cr-syncer.cloudrobotics.com/filter-by-robot-name";

/// CRD annotation: project only this top-level key of `status` between clusters
pub const ANNOTATION_STATUS_SUBTREE: &str = "cr-syncer.cloudrobotics.com/status-subtree";

/// CRD annotation: which cluster the `spec` flows from (`"cloud"` or `"robot"`)
pub const ANNOTATION_SPEC_SOURCE: &str = "cr-syncer.cloudrobotics.com/spec-source";

/// Label carrying the robot a resource belongs to
pub const LABEL_ROBOT_NAME: &str = "cloudrobotics.com/robot-name";

// ============================================================================
// Spec Source Values
// ============================================================================

/// `spec-source` value selecting the cloud cluster as source of spec (default)
pub const SPEC_SOURCE_CLOUD: &str = "cloud";

/// `spec-source` value selecting the robot cluster as source of spec
pub const SPEC_SOURCE_ROBOT: &str = "robot";

// ============================================================================
// Cluster Names (used in logs and metric labels)
// ============================================================================

/// Logical name of the remote cluster
pub const CLUSTER_CLOUD: &str = "cloud";

/// Logical name of the local cluster
pub const CLUSTER_ROBOT: &str = "robot";

// ============================================================================
// Remote Transport Constants
// ============================================================================

/// Path prefix expected by the cloud API gateway in front of the remote
/// Kubernetes API server
pub const REMOTE_API_PREFIX: &str = "/apis/core.kubernetes";

/// OAuth scope requested for the remote cluster bearer token
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

// ============================================================================
// Synchronization Constants
// ============================================================================

/// Interval at which each per-kind informer replays all cached objects as
/// synthetic updates to correct silent drift (5 minutes)
pub const RESYNC_PERIOD_SECS: u64 = 300;

/// Grace period allowed for a reconciler to wind down after its stop signal
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
