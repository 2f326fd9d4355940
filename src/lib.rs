// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # cr-syncer - Bidirectional Custom Resource Synchronizer
//!
//! cr-syncer is a long-running daemon that couples two Kubernetes clusters —
//! a remote **cloud** cluster and a local **robot** cluster — by mirroring
//! custom resources between them. For each synchronized kind, object
//! existence and declarative intent (the `spec`) flow in one direction while
//! observed outcome (`status`, finalizers) flows in the opposite direction.
//!
//! ## Overview
//!
//! The daemon discovers which kinds to synchronize from live
//! CustomResourceDefinition metadata on the robot cluster. Per-kind options
//! are expressed through `cr-syncer.cloudrobotics.com/*` annotations on the
//! CRD: which cluster owns the spec, whether to filter objects by robot
//! name, and whether only a single subtree of `status` is projected.
//!
//! ## Modules
//!
//! - [`supervisor`] - Watches CRDs and manages the per-kind reconciler fleet
//! - [`sync`] - Per-kind reconcilers and the pure merge rules they apply
//! - [`cluster`] - Dynamic per-kind API handles and informer streams
//! - [`crd`] - Kind descriptors parsed from CRD metadata
//! - [`transport`] - Cloud gateway path prefixing and bearer authentication
//!
//! ## Example
//!
//! ```rust,no_run
//! use cr_syncer::crd::KindDescriptor;
//! use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
//!
//! fn descriptor_for(crd: &CustomResourceDefinition) -> anyhow::Result<KindDescriptor> {
//!     Ok(KindDescriptor::from_crd(crd)?)
//! }
//! ```
//!
//! ## Features
//!
//! - **Dynamic kinds** - No generated clients; everything is schemaless
//! - **Convergent** - 5-minute resync replays correct silent drift
//! - **Directional** - Spec and status each have exactly one source cluster
//! - **Observable** - Structured logs and Prometheus metrics

pub mod annotations;
pub mod cluster;
pub mod constants;
pub mod crd;
pub mod metrics;
pub mod supervisor;
pub mod sync;
pub mod transport;
