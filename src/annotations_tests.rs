// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `annotations.rs`

#[cfg(test)]
mod tests {
    use super::super::{delete_annotation, get_annotation, matches_robot_name, set_annotation};
    use kube::api::DynamicObject;
    use serde_json::json;

    fn object(metadata: serde_json::Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "registry.cloudrobotics.com/v1alpha1",
            "kind": "Robot",
            "metadata": metadata,
        }))
        .expect("valid object")
    }

    /// Setting an annotation creates the map when needed
    #[test]
    fn test_set_annotation_creates_map() {
        let mut obj = object(json!({"name": "foo"}));
        assert!(obj.metadata.annotations.is_none(), "Fresh object should have no annotations");

        set_annotation(&mut obj, "example.com/key", "value");

        assert_eq!(
            get_annotation(&obj, "example.com/key"),
            Some("value"),
            "Annotation should be readable after set"
        );
    }

    /// Setting the same annotation twice is idempotent
    #[test]
    fn test_set_annotation_overwrites() {
        let mut obj = object(json!({"name": "foo"}));
        set_annotation(&mut obj, "example.com/key", "old");
        set_annotation(&mut obj, "example.com/key", "new");

        assert_eq!(get_annotation(&obj, "example.com/key"), Some("new"));
        assert_eq!(
            obj.metadata.annotations.as_ref().map(std::collections::BTreeMap::len),
            Some(1),
            "Overwriting should not grow the map"
        );
    }

    /// Deleting the last annotation removes the map entirely
    #[test]
    fn test_delete_annotation_normalizes_empty_map() {
        let mut obj = object(json!({"name": "foo", "annotations": {"example.com/key": "value"}}));

        delete_annotation(&mut obj, "example.com/key");

        assert!(
            obj.metadata.annotations.is_none(),
            "Empty annotation map should be normalized to absent"
        );
    }

    /// Deleting one of several annotations keeps the rest
    #[test]
    fn test_delete_annotation_keeps_others() {
        let mut obj = object(json!({
            "name": "foo",
            "annotations": {"a": "1", "b": "2"},
        }));

        delete_annotation(&mut obj, "a");

        assert_eq!(get_annotation(&obj, "a"), None);
        assert_eq!(get_annotation(&obj, "b"), Some("2"));
    }

    /// Deleting a missing annotation is a no-op
    #[test]
    fn test_delete_annotation_missing() {
        let mut obj = object(json!({"name": "foo"}));
        delete_annotation(&mut obj, "example.com/key");
        assert!(obj.metadata.annotations.is_none());
    }

    /// Robot-name matching requires the exact label value
    #[test]
    fn test_matches_robot_name() {
        let labelled = object(json!({
            "name": "foo",
            "labels": {"cloudrobotics.com/robot-name": "r1"},
        }));
        assert!(matches_robot_name(&labelled, "r1"), "Matching label should pass");
        assert!(
            !matches_robot_name(&labelled, "r2"),
            "Different robot name should be filtered"
        );
    }

    /// Objects without the robot-name label never match
    #[test]
    fn test_matches_robot_name_unlabelled() {
        let unlabelled = object(json!({"name": "foo", "labels": {"other": "x"}}));
        assert!(!matches_robot_name(&unlabelled, "r1"));

        let no_labels = object(json!({"name": "foo"}));
        assert!(!matches_robot_name(&no_labels, "r1"));
    }
}
