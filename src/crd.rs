// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kind descriptors derived from Custom Resource Definitions.
//!
//! The supervisor watches CRDs on the robot cluster and, for each one, builds
//! a [`KindDescriptor`] capturing everything a per-kind reconciler needs to
//! know: which API endpoint to talk to, whether `status` is a subresource,
//! and the synchronization options expressed through the
//! `cr-syncer.cloudrobotics.com/*` annotations.
//!
//! A descriptor is a snapshot: it is parsed once when the reconciler is
//! (re)started and never mutated. CRD changes tear the old reconciler down
//! and build a fresh descriptor.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionVersion,
};
use kube::api::{ApiResource, GroupVersionKind};
use kube::ResourceExt;

use crate::constants::{
    ANNOTATION_FILTER_BY_ROBOT_NAME, ANNOTATION_SPEC_SOURCE, ANNOTATION_STATUS_SUBTREE,
    SPEC_SOURCE_CLOUD, SPEC_SOURCE_ROBOT,
};

/// Errors raised while deriving a [`KindDescriptor`] from a CRD.
///
/// These are configuration errors: the supervisor logs them and skips the
/// CRD instead of crashing.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// The CRD declares no served version to synchronize.
    #[error("CRD {0} has no served version")]
    NoServedVersion(String),

    /// The `spec-source` annotation carries a value other than `cloud`/`robot`.
    #[error("unknown spec source {0:?}")]
    UnknownSpecSource(String),

    /// The `filter-by-robot-name` annotation is not a boolean.
    #[error("invalid filter-by-robot-name value {0:?}")]
    InvalidFilterFlag(String),
}

/// Which cluster the `spec` (and object existence) flows from.
///
/// The opposite cluster is always the source of `status` and finalizers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpecSource {
    /// Remote cluster owns the spec; the robot reports status (default).
    #[default]
    Cloud,
    /// Robot cluster owns the spec; the cloud reports status.
    Robot,
}

impl FromStr for SpecSource {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SPEC_SOURCE_CLOUD => Ok(SpecSource::Cloud),
            SPEC_SOURCE_ROBOT => Ok(SpecSource::Robot),
            other => Err(DescriptorError::UnknownSpecSource(other.to_string())),
        }
    }
}

impl fmt::Display for SpecSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecSource::Cloud => f.write_str(SPEC_SOURCE_CLOUD),
            SpecSource::Robot => f.write_str(SPEC_SOURCE_ROBOT),
        }
    }
}

/// Everything a per-kind reconciler needs to know about the kind it drives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindDescriptor {
    /// API group of the kind (e.g. `registry.cloudrobotics.com`)
    pub group: String,
    /// Synchronized API version (the CRD's storage version)
    pub version: String,
    /// Kind name (e.g. `Robot`)
    pub kind: String,
    /// Plural resource name (e.g. `robots`)
    pub plural: String,
    /// Whether objects of this kind are namespaced
    pub namespaced: bool,
    /// Whether `status` is updated through the status subresource endpoint
    pub status_is_subresource: bool,
    /// Drop objects not labelled with the configured robot name
    pub filter_by_robot_name: bool,
    /// Copy only this top-level key of `status` (disables finalizer propagation)
    pub status_subtree: Option<String>,
    /// Which cluster the spec flows from
    pub spec_source: SpecSource,
}

impl KindDescriptor {
    /// Derive a descriptor from a CRD.
    ///
    /// The storage version is preferred; if none is marked as such, the first
    /// served version is used.
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`] when the CRD has no usable version or
    /// carries malformed synchronization annotations.
    pub fn from_crd(crd: &CustomResourceDefinition) -> Result<Self, DescriptorError> {
        let version = pick_version(&crd.spec.versions)
            .ok_or_else(|| DescriptorError::NoServedVersion(crd.name_any()))?;

        let status_is_subresource = version
            .subresources
            .as_ref()
            .is_some_and(|subresources| subresources.status.is_some());

        let annotations = crd.annotations();

        let filter_by_robot_name = match annotations
            .get(ANNOTATION_FILTER_BY_ROBOT_NAME)
            .map(String::as_str)
        {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => return Err(DescriptorError::InvalidFilterFlag(other.to_string())),
        };

        let status_subtree = annotations
            .get(ANNOTATION_STATUS_SUBTREE)
            .filter(|subtree| !subtree.is_empty())
            .cloned();

        let spec_source = match annotations.get(ANNOTATION_SPEC_SOURCE) {
            Some(value) => value.parse()?,
            None => SpecSource::default(),
        };

        Ok(KindDescriptor {
            group: crd.spec.group.clone(),
            version: version.name.clone(),
            kind: crd.spec.names.kind.clone(),
            plural: crd.spec.names.plural.clone(),
            namespaced: crd.spec.scope == "Namespaced",
            status_is_subresource,
            filter_by_robot_name,
            status_subtree,
            spec_source,
        })
    }

    /// The dynamic API resource for this kind.
    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, &self.kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }
}

fn pick_version(
    versions: &[CustomResourceDefinitionVersion],
) -> Option<&CustomResourceDefinitionVersion> {
    versions
        .iter()
        .find(|version| version.storage)
        .or_else(|| versions.iter().find(|version| version.served))
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
