// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Annotation and label helpers for dynamic objects.
//!
//! The syncer manipulates schemaless [`DynamicObject`]s, so annotation and
//! label access goes through these small helpers instead of typed accessors.
//! Setting and deleting are idempotent; an annotation map left empty after a
//! delete is normalized back to absent so round-tripped objects compare equal.

use kube::api::DynamicObject;

use crate::constants::LABEL_ROBOT_NAME;

/// Set a single annotation, creating the annotation map if needed.
pub fn set_annotation(obj: &mut DynamicObject, key: &str, value: &str) {
    obj.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
}

/// Delete a single annotation if present.
///
/// An annotation map that becomes empty is removed entirely, matching how the
/// API server serializes objects that never had annotations.
pub fn delete_annotation(obj: &mut DynamicObject, key: &str) {
    if let Some(annotations) = obj.metadata.annotations.as_mut() {
        annotations.remove(key);
        if annotations.is_empty() {
            obj.metadata.annotations = None;
        }
    }
}

/// Read a single annotation.
pub fn get_annotation<'a>(obj: &'a DynamicObject, key: &str) -> Option<&'a str> {
    obj.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Whether an object carries the `cloudrobotics.com/robot-name` label with
/// the given value.
///
/// Used by per-kind reconcilers to drop objects belonging to other robots
/// before they are enqueued.
pub fn matches_robot_name(obj: &DynamicObject, robot_name: &str) -> bool {
    obj.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(LABEL_ROBOT_NAME))
        .is_some_and(|value| value == robot_name)
}

#[cfg(test)]
#[path = "annotations_tests.rs"]
mod annotations_tests;
