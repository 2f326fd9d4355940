// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `merge.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        ensure_status_object, merge_for_spec, merge_for_status, status_value, MergeError,
    };
    use crate::annotations::get_annotation;
    use crate::constants::{ANNOTATION_OWNED_BY_UPSTREAM, ANNOTATION_REMOTE_RESOURCE_VERSION};
    use kube::api::DynamicObject;
    use serde_json::{json, Value};

    fn object(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).expect("valid object")
    }

    /// A fresh target carries spec, labels, annotations and the seed status
    #[test]
    fn test_merge_for_spec_creates_target() {
        let source = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {
                "name": "foo",
                "namespace": "default",
                "resourceVersion": "42",
                "uid": "a-b-c",
                "labels": {"app": "demo"},
                "annotations": {"example.com/note": "kept"},
            },
            "spec": {"x": 1},
            "status": null,
        }));

        let next = merge_for_spec(&source, None);

        assert_eq!(next.metadata.name.as_deref(), Some("foo"));
        assert_eq!(next.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(
            next.metadata.labels.as_ref().and_then(|l| l.get("app")).map(String::as_str),
            Some("demo")
        );
        assert_eq!(get_annotation(&next, "example.com/note"), Some("kept"));
        assert_eq!(
            get_annotation(&next, ANNOTATION_OWNED_BY_UPSTREAM),
            Some("true"),
            "Created objects must be marked as owned"
        );
        assert_eq!(next.data["spec"], json!({"x": 1}));
        assert_eq!(
            next.data.get("status"),
            Some(&Value::Null),
            "The initial status is seeded from the source"
        );
        assert_eq!(
            next.metadata.resource_version, None,
            "Server-owned metadata must never be copied"
        );
        assert_eq!(next.metadata.uid, None);
    }

    /// Updating a target overwrites spec and metadata but preserves its status
    #[test]
    fn test_merge_for_spec_updates_target() {
        let source = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {
                "name": "foo",
                "resourceVersion": "42",
                "labels": {"app": "demo"},
                "annotations": {
                    "example.com/note": "new",
                    "cr-syncer.cloudrobotics.com/remote-resource-version": "17",
                },
            },
            "spec": {"x": 2},
        }));
        let existing = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {
                "name": "foo",
                "resourceVersion": "9",
                "labels": {"stale": "yes"},
                "annotations": {"example.com/note": "old"},
            },
            "spec": {"x": 1},
            "status": {"ready": true},
        }));

        let next = merge_for_spec(&source, Some(&existing));

        assert_eq!(next.data["spec"], json!({"x": 2}), "Spec must follow the source");
        assert_eq!(
            next.data["status"],
            json!({"ready": true}),
            "Status belongs to the target side and must be preserved"
        );
        assert_eq!(
            next.metadata.resource_version.as_deref(),
            Some("9"),
            "The target's own resource version drives the update"
        );
        assert_eq!(
            next.metadata.labels.as_ref().and_then(|l| l.get("stale")),
            None,
            "Labels are overwritten, not merged"
        );
        assert_eq!(get_annotation(&next, "example.com/note"), Some("new"));
        assert_eq!(
            get_annotation(&next, ANNOTATION_REMOTE_RESOURCE_VERSION),
            None,
            "The resource-version annotation is only meaningful on the spec source"
        );
        assert_eq!(get_annotation(&next, ANNOTATION_OWNED_BY_UPSTREAM), Some("true"));
    }

    /// A source without spec clears the target's spec
    #[test]
    fn test_merge_for_spec_removes_missing_spec() {
        let source = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo"},
        }));
        let existing = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo"},
            "spec": {"x": 1},
        }));

        let next = merge_for_spec(&source, Some(&existing));

        assert_eq!(next.data.get("spec"), None, "A vanished spec should not linger");
    }

    /// Whole-status replacement also carries finalizers
    #[test]
    fn test_merge_for_status_replaces_status_and_finalizers() {
        let target = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo", "finalizers": ["old"]},
            "spec": {"x": 1},
            "status": {"stale": true},
        }));
        let source = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo", "resourceVersion": "77", "finalizers": ["cleanup"]},
            "spec": {"x": 1},
            "status": {"ready": true},
        }));

        let next = merge_for_status(&target, &source, None).expect("merge should succeed");

        assert_eq!(next.data["status"], json!({"ready": true}));
        assert_eq!(
            next.metadata.finalizers,
            Some(vec!["cleanup".to_string()]),
            "Finalizers follow the status source"
        );
        assert_eq!(
            get_annotation(&next, ANNOTATION_REMOTE_RESOURCE_VERSION),
            Some("77"),
            "The annotation must record the observed resource version"
        );
        assert_eq!(next.data["spec"], json!({"x": 1}), "Spec must be untouched");
    }

    /// Subtree projection merges into the existing status
    #[test]
    fn test_merge_for_status_subtree_projection() {
        let target = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "WarehouseOrder",
            "metadata": {"name": "bar", "finalizers": ["keep-me"]},
            "status": {"cloud": {"a": 1}},
        }));
        let source = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "WarehouseOrder",
            "metadata": {"name": "bar", "resourceVersion": "5"},
            "status": {"robot": {"b": 2}},
        }));

        let next = merge_for_status(&target, &source, Some("robot")).expect("merge should succeed");

        assert_eq!(
            next.data["status"],
            json!({"cloud": {"a": 1}, "robot": {"b": 2}}),
            "Only the projected subtree is written; other keys stay"
        );
        assert_eq!(
            next.metadata.finalizers,
            Some(vec!["keep-me".to_string()]),
            "Finalizers are not propagated when a subtree is configured"
        );
    }

    /// A subtree no longer defined by the source is removed from the target
    #[test]
    fn test_merge_for_status_subtree_removal() {
        let target = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "WarehouseOrder",
            "metadata": {"name": "bar"},
            "status": {"cloud": {"a": 1}, "robot": {"b": 2}},
        }));
        let source = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "WarehouseOrder",
            "metadata": {"name": "bar", "resourceVersion": "6"},
            "status": {},
        }));

        let next = merge_for_status(&target, &source, Some("robot")).expect("merge should succeed");

        assert_eq!(next.data["status"], json!({"cloud": {"a": 1}}));
    }

    /// A missing target status is materialized for the projection
    #[test]
    fn test_merge_for_status_subtree_creates_status() {
        let target = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "WarehouseOrder",
            "metadata": {"name": "bar"},
        }));
        let source = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "WarehouseOrder",
            "metadata": {"name": "bar", "resourceVersion": "7"},
            "status": {"robot": 3},
        }));

        let next = merge_for_status(&target, &source, Some("robot")).expect("merge should succeed");

        assert_eq!(next.data["status"], json!({"robot": 3}));
    }

    /// A null source status leaves the target status untouched
    #[test]
    fn test_merge_for_status_subtree_null_source() {
        let target = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "WarehouseOrder",
            "metadata": {"name": "bar"},
            "status": {"cloud": {"a": 1}},
        }));
        let source = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "WarehouseOrder",
            "metadata": {"name": "bar", "resourceVersion": "8"},
            "status": null,
        }));

        let next = merge_for_status(&target, &source, Some("robot")).expect("merge should succeed");

        assert_eq!(next.data["status"], json!({"cloud": {"a": 1}}));
        assert_eq!(
            get_annotation(&next, ANNOTATION_REMOTE_RESOURCE_VERSION),
            Some("8"),
            "The annotation is updated even without a status payload"
        );
    }

    /// Non-object statuses are malformed when a subtree is configured
    #[test]
    fn test_merge_for_status_subtree_rejects_non_objects() {
        let base = |status: serde_json::Value| {
            object(json!({
                "apiVersion": "registry.cloudrobotics.com/v1alpha1",
                "kind": "WarehouseOrder",
                "metadata": {"name": "bar", "resourceVersion": "9"},
                "status": status,
            }))
        };

        let result = merge_for_status(&base(json!({})), &base(json!(5)), Some("robot"));
        assert!(
            matches!(result, Err(MergeError::StatusNotObject("source-of-status"))),
            "A scalar source status must be rejected, got {result:?}"
        );

        let result = merge_for_status(&base(json!("text")), &base(json!({"robot": 1})), Some("robot"));
        assert!(
            matches!(result, Err(MergeError::StatusNotObject("source-of-spec"))),
            "A scalar target status must be rejected, got {result:?}"
        );
    }

    /// Null or missing status becomes an empty object for subresource updates
    #[test]
    fn test_ensure_status_object() {
        let mut missing = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo"},
        }));
        ensure_status_object(&mut missing);
        assert_eq!(missing.data["status"], json!({}));

        let mut null_status = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo"},
            "status": null,
        }));
        ensure_status_object(&mut null_status);
        assert_eq!(null_status.data["status"], json!({}));

        let mut populated = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo"},
            "status": {"ready": true},
        }));
        ensure_status_object(&mut populated);
        assert_eq!(
            populated.data["status"],
            json!({"ready": true}),
            "An existing status must not be clobbered"
        );
    }

    /// Absent and null statuses compare equal through the accessor
    #[test]
    fn test_status_value_normalizes_absence() {
        let missing = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo"},
        }));
        let null_status = object(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": {"name": "foo"},
            "status": null,
        }));

        assert_eq!(status_value(&missing), status_value(&null_status));
    }
}
