// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Update qualification: is an update substantive enough to forward?

use serde_json::Value;
use tracing::{debug, warn};

use super::diff::diff;
use super::route::Route;

/// Outcome of qualifying an update against the matched routes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Qualification {
    pub qualifies: bool,
    /// Diff text of every route that asked for it, in route order
    pub diffs: Vec<String>,
}

/// Qualify an update of `old` into `new` for `routes`.
///
/// A route without an actionable update setting qualifies the update as is.
/// Every other route qualifies it only if its diff is non-empty. All routes
/// are evaluated so each one can contribute its own diff.
pub fn qualify_update(old: &Value, new: &Value, routes: &[Route]) -> Qualification {
    let mut result = Qualification::default();

    for (idx, route) in routes.iter().enumerate() {
        let Some(setting) = route.actionable_update_setting() else {
            debug!(route = idx, "Qualified for update with no update setting");
            result.qualifies = true;
            continue;
        };

        let diff = match diff(old, new, setting) {
            Ok(diff) => diff,
            Err(e) => {
                warn!(route = idx, error = %e, "Failed to compute diff, treating as no change");
                String::new()
            }
        };

        if diff.is_empty() {
            debug!(route = idx, "No relevant changes for route");
            continue;
        }

        debug!(route = idx, diff = %diff, "Qualified for update");
        result.qualifies = true;
        if setting.include_diff {
            result.diffs.push(diff);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::route::UpdateSetting;
    use serde_json::json;

    fn route_with(setting: UpdateSetting) -> Route {
        Route {
            update_setting: Some(setting),
            ..Default::default()
        }
    }

    fn ignoring(paths: &[&str], include_diff: bool) -> Route {
        route_with(UpdateSetting {
            ignored_fields: paths.iter().map(|p| p.parse().unwrap()).collect(),
            include_diff,
            ..Default::default()
        })
    }

    fn tracking(paths: &[&str], include_diff: bool) -> Route {
        route_with(UpdateSetting {
            fields: paths.iter().map(|p| p.parse().unwrap()).collect(),
            include_diff,
            ..Default::default()
        })
    }

    fn tier(value: &str) -> Value {
        json!({"metadata": {"name": "web", "labels": {"tier": value}}})
    }

    #[test]
    fn test_route_without_setting_always_qualifies() {
        let obj = tier("frontend");
        let q = qualify_update(&obj, &obj, &[Route::default()]);
        assert!(q.qualifies);
        assert!(q.diffs.is_empty());
    }

    #[test]
    fn test_non_actionable_setting_always_qualifies() {
        let obj = tier("frontend");
        let q = qualify_update(&obj, &obj, &[route_with(UpdateSetting::default())]);
        assert!(q.qualifies);
    }

    #[test]
    fn test_label_change_with_diff() {
        let q = qualify_update(&tier("frontend"), &tier("backend"), &[ignoring(&[], true)]);
        assert!(q.qualifies);
        assert_eq!(q.diffs.len(), 1);
        assert!(q.diffs[0].contains("tier"));
        assert!(q.diffs[0].contains("-: frontend"));
        assert!(q.diffs[0].contains("+: backend"));
    }

    #[test]
    fn test_only_ignored_field_changed() {
        let old = json!({"metadata": {"name": "web"}, "status": {"phase": "Pending"}});
        let new = json!({"metadata": {"name": "web"}, "status": {"phase": "Running"}});
        let q = qualify_update(&old, &new, &[ignoring(&["status"], true)]);
        assert!(!q.qualifies);
        assert!(q.diffs.is_empty());
    }

    #[test]
    fn test_empty_diff_everywhere_does_not_qualify() {
        let obj = tier("frontend");
        let routes = vec![ignoring(&["status"], true), tracking(&["spec"], false)];
        let q = qualify_update(&obj, &obj, &routes);
        assert_eq!(q, Qualification::default());
    }

    #[test]
    fn test_any_non_empty_diff_qualifies() {
        let routes = vec![
            ignoring(&["metadata.labels"], true),
            tracking(&["metadata.labels"], false),
        ];
        let q = qualify_update(&tier("frontend"), &tier("backend"), &routes);
        assert!(q.qualifies);
        // Qualifying route did not ask for its diff
        assert!(q.diffs.is_empty());
    }

    #[test]
    fn test_diffs_collected_from_every_route() {
        let routes = vec![Route::default(), ignoring(&[], true), ignoring(&[], true)];
        let q = qualify_update(&tier("frontend"), &tier("backend"), &routes);
        assert!(q.qualifies);
        assert_eq!(q.diffs.len(), 2);
        assert_eq!(q.diffs[0], q.diffs[1]);
    }

    #[test]
    fn test_missing_old_object_compares_against_empty() {
        let q = qualify_update(&Value::Null, &tier("backend"), &[ignoring(&[], true)]);
        assert!(q.qualifies);
        assert!(q.diffs[0].contains("metadata.labels.tier:\n\t+: backend"));
    }
}
