// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pure merge rules for one synchronization step.
//!
//! These functions compute the desired target object for a sync step without
//! touching the network, so every edge case is unit-testable. Conventions:
//!
//! - [`merge_for_spec`] runs against the source-of-status cluster and carries
//!   `spec`, labels and annotations over from the source-of-spec object.
//! - [`merge_for_status`] runs against the source-of-spec cluster and carries
//!   `status` (whole or a single subtree) and finalizers back.
//! - Server-owned metadata (uid, resourceVersion, generation, timestamps,
//!   managedFields) is never copied between clusters.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::{Map, Value};

use crate::annotations::{delete_annotation, set_annotation};
use crate::constants::{ANNOTATION_OWNED_BY_UPSTREAM, ANNOTATION_REMOTE_RESOURCE_VERSION};

/// Structural errors found while merging.
///
/// These mark the object as malformed from the syncer's perspective: the
/// step is logged and skipped, not retried.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A status payload that must be a JSON object is something else.
    #[error("status of the {0} object is not a JSON object")]
    StatusNotObject(&'static str),
}

/// Compute the target object for a spec-direction step.
///
/// With no existing target, a fresh object is built carrying the source's
/// labels, annotations, `spec` and `status` (the status seeds the new object
/// once; afterwards status flows the other way).
///
/// With an existing target, everything the target's server owns (including
/// `status`) is preserved while labels, annotations and `spec` are
/// overwritten from the source. The remote-resource-version annotation is
/// dropped since it is only meaningful on the source-of-spec side.
///
/// Either way the result is marked as owned by the syncer.
#[must_use]
pub fn merge_for_spec(source: &DynamicObject, existing: Option<&DynamicObject>) -> DynamicObject {
    let mut next = match existing {
        None => {
            let mut next = DynamicObject {
                types: source.types.clone(),
                metadata: Default::default(),
                data: Value::Object(Map::new()),
            };
            next.metadata.name = source.metadata.name.clone();
            next.metadata.namespace = source.metadata.namespace.clone();
            next.metadata.labels = source.metadata.labels.clone();
            next.metadata.annotations = source.metadata.annotations.clone();
            copy_field(&mut next, source, "spec");
            copy_field(&mut next, source, "status");
            next
        }
        Some(existing) => {
            let mut next = existing.clone();
            next.metadata.labels = source.metadata.labels.clone();
            next.metadata.annotations = source.metadata.annotations.clone();
            delete_annotation(&mut next, ANNOTATION_REMOTE_RESOURCE_VERSION);
            copy_field(&mut next, source, "spec");
            next
        }
    };
    set_annotation(&mut next, ANNOTATION_OWNED_BY_UPSTREAM, "true");
    next
}

/// Compute the updated source-of-spec object for a status-direction step.
///
/// Without a subtree, `status` is replaced wholesale and finalizers are
/// copied. With a subtree, only that top-level key of `status` is written
/// (or removed when the source no longer defines it) and finalizers are left
/// untouched: independent controllers are expected to own disjoint subtrees
/// of the same object, and their finalizers cannot be merged reliably.
///
/// The remote-resource-version annotation always records which source
/// `resourceVersion` produced the result.
///
/// # Errors
///
/// Returns [`MergeError::StatusNotObject`] when a subtree is requested but
/// either side's `status` is a non-object value.
pub fn merge_for_status(
    target: &DynamicObject,
    source: &DynamicObject,
    subtree: Option<&str>,
) -> Result<DynamicObject, MergeError> {
    let mut next = target.clone();

    match subtree {
        None => {
            copy_field(&mut next, source, "status");
            next.metadata.finalizers = source.metadata.finalizers.clone();
        }
        Some(key) => match source.data.get("status") {
            None | Some(Value::Null) => {}
            Some(Value::Object(status)) => {
                match next.data.get("status") {
                    None | Some(Value::Null) | Some(Value::Object(_)) => {}
                    Some(_) => return Err(MergeError::StatusNotObject("source-of-spec")),
                }
                if next.data.get("status").is_none_or(Value::is_null) {
                    next.data["status"] = Value::Object(Map::new());
                }
                if let Some(Value::Object(target_status)) = next.data.get_mut("status") {
                    match status.get(key) {
                        Some(value) => {
                            target_status.insert(key.to_string(), value.clone());
                        }
                        None => {
                            target_status.remove(key);
                        }
                    }
                }
            }
            Some(_) => return Err(MergeError::StatusNotObject("source-of-status")),
        },
    }

    set_annotation(
        &mut next,
        ANNOTATION_REMOTE_RESOURCE_VERSION,
        &source.resource_version().unwrap_or_default(),
    );
    Ok(next)
}

/// Materialize a missing or null `status` as an empty object.
///
/// The status subresource endpoint rejects a null status payload.
pub fn ensure_status_object(object: &mut DynamicObject) {
    if object.data.get("status").is_none_or(Value::is_null) {
        object.data["status"] = Value::Object(Map::new());
    }
}

/// The object's status payload, with absent normalized to null.
#[must_use]
pub fn status_value(object: &DynamicObject) -> &Value {
    object.data.get("status").unwrap_or(&Value::Null)
}

fn copy_field(target: &mut DynamicObject, source: &DynamicObject, field: &str) {
    match source.data.get(field) {
        Some(value) => target.data[field] = value.clone(),
        None => {
            if let Some(data) = target.data.as_object_mut() {
                data.remove(field);
            }
        }
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod merge_tests;
