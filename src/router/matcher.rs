// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Route matching for canonical events.
//!
//! Routes are evaluated in table order. Reason, message, resource name and
//! namespace constraints act as a veto for the whole event: the first route
//! that rejects one of them ends matching with `false`. Annotation and label
//! requirements only skip the current route. The first route that passes
//! everything matches.
//!
//! NOTE: the veto/skip asymmetry is pending product review. Do not change it
//! here without that decision.

use std::collections::BTreeMap;
use tracing::debug;

use super::route::Route;
use crate::event::Event;

/// Whether any route in `routes` accepts `event`
pub fn match_event(routes: &[Route], event: &Event) -> bool {
    for route in routes {
        // event reason
        if let Some(constraints) = &route.event
            && constraints.reason.is_configured()
            && !constraints.reason.is_allowed(&event.reason)
        {
            debug!(
                reason = %event.reason,
                constraint = ?constraints.reason,
                "Ignoring as reason doesn't match constraints"
            );
            return false;
        }

        // event message
        if let Some(constraints) = &route.event
            && constraints.message.is_configured()
        {
            // treat no messages as an empty message
            let any_match = if event.messages.is_empty() {
                constraints.message.is_allowed("")
            } else {
                event
                    .messages
                    .iter()
                    .any(|msg| constraints.message.is_allowed(msg))
            };
            if !any_match {
                debug!(
                    messages = %event.messages.join(";"),
                    constraint = ?constraints.message,
                    "Ignoring as no event message matches constraints"
                );
                return false;
            }
        }

        // resource name
        if route.resource_name.is_configured() && !route.resource_name.is_allowed(&event.name) {
            debug!(
                name = %event.name,
                constraint = ?route.resource_name,
                "Ignoring as resource name doesn't match constraints"
            );
            return false;
        }

        // namespace
        if let Some(namespaces) = &route.namespaces
            && namespaces.is_configured()
            && !namespaces.is_allowed(&event.namespace)
        {
            debug!(
                namespace = %event.namespace,
                constraint = ?namespaces,
                "Ignoring as namespace doesn't match constraints"
            );
            return false;
        }

        if !kvs_satisfied(route.annotations.as_ref(), &event.object_meta.annotations) {
            continue;
        }

        if !kvs_satisfied(route.labels.as_ref(), &event.object_meta.labels) {
            continue;
        }

        return true;
    }

    false
}

/// Whether `actual` contains every expected key with the same value
///
/// No expectation (or an empty one) is always satisfied.
pub fn kvs_satisfied(
    expected: Option<&BTreeMap<String, String>>,
    actual: &BTreeMap<String, String>,
) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    expected
        .iter()
        .all(|(k, v)| actual.get(k).is_some_and(|got| got == v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::kubernetes::ObjectMeta;
    use crate::router::constraint::Constraint;
    use crate::router::route::EventConstraints;
    use chrono::Utc;

    fn event(name: &str, namespace: &str) -> Event {
        Event {
            event_type: EventType::Delete,
            reason: String::new(),
            messages: Vec::new(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            resource: "v1/pods".to_string(),
            kind: "Pod".to_string(),
            object_meta: ObjectMeta::default(),
            count: None,
            timestamp: Utc::now(),
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn reason_route(pattern: &str) -> Route {
        Route {
            event: Some(EventConstraints {
                reason: Constraint::include(&[pattern]).unwrap(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_unconstrained_route_matches_everything() {
        let routes = vec![Route::default()];
        assert!(match_event(&routes, &event("web-1", "default")));
        assert!(match_event(&routes, &event("", "")));
    }

    #[test]
    fn test_no_routes_does_not_match() {
        assert!(!match_event(&[], &event("web-1", "default")));
    }

    #[test]
    fn test_namespace_constraint_matches() {
        let routes = vec![Route {
            namespaces: Some(Constraint::include(&["default"]).unwrap()),
            ..Default::default()
        }];
        assert!(match_event(&routes, &event("web-1", "default")));
        assert!(!match_event(&routes, &event("web-1", "kube-system")));
    }

    #[test]
    fn test_resource_name_mismatch_is_global_veto() {
        let routes = vec![
            Route {
                resource_name: Constraint::include(&["web-2"]).unwrap(),
                ..Default::default()
            },
            // Would match on its own, but is never reached
            Route::default(),
        ];
        assert!(!match_event(&routes, &event("web-1", "default")));
    }

    #[test]
    fn test_reason_mismatch_is_global_veto() {
        let mut ev = event("web-1", "default");
        ev.reason = "Killing".to_string();
        let routes = vec![reason_route("BackOff"), Route::default(), reason_route("Killing")];
        assert!(!match_event(&routes, &ev));
    }

    #[test]
    fn test_message_mismatch_is_global_veto() {
        let mut ev = event("web-1", "default");
        ev.messages = vec!["hello".to_string()];
        let routes = vec![
            Route {
                event: Some(EventConstraints {
                    message: Constraint::include(&["bye"]).unwrap(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Route::default(),
        ];
        assert!(!match_event(&routes, &ev));
        // The permissive route alone matches
        assert!(match_event(&routes[1..], &ev));
    }

    #[test]
    fn test_namespace_mismatch_is_global_veto() {
        let ev = event("web-1", "default");
        let routes = vec![
            Route {
                namespaces: Some(Constraint::include(&["prod"]).unwrap()),
                ..Default::default()
            },
            Route::default(),
        ];
        assert!(!match_event(&routes, &ev));
        assert!(match_event(&routes[1..], &ev));
    }

    #[test]
    fn test_reason_match() {
        let mut ev = event("web-1", "default");
        ev.reason = "BackOff".to_string();
        assert!(match_event(&[reason_route("Back.*")], &ev));
    }

    #[test]
    fn test_message_any_of_messages() {
        let routes = vec![Route {
            event: Some(EventConstraints {
                message: Constraint::include(&[".*OOM.*"]).unwrap(),
                ..Default::default()
            }),
            ..Default::default()
        }];
        let mut ev = event("web-1", "default");
        ev.messages = vec!["container started".into(), "killed: OOMKilled".into()];
        assert!(match_event(&routes, &ev));

        ev.messages = vec!["container started".into()];
        assert!(!match_event(&routes, &ev));
    }

    #[test]
    fn test_no_messages_treated_as_empty_message() {
        let exclude_only = vec![Route {
            event: Some(EventConstraints {
                message: Constraint::new(&[], &["error.*"]).unwrap(),
                ..Default::default()
            }),
            ..Default::default()
        }];
        assert!(match_event(&exclude_only, &event("web-1", "default")));

        let include = vec![Route {
            event: Some(EventConstraints {
                message: Constraint::include(&["error.*"]).unwrap(),
                ..Default::default()
            }),
            ..Default::default()
        }];
        assert!(!match_event(&include, &event("web-1", "default")));
    }

    #[test]
    fn test_label_mismatch_skips_to_next_route() {
        let mut ev = event("web-1", "default");
        ev.object_meta.labels = labels(&[("tier", "backend")]);

        let routes = vec![
            Route {
                labels: Some(labels(&[("tier", "frontend")])),
                ..Default::default()
            },
            Route {
                labels: Some(labels(&[("tier", "backend")])),
                ..Default::default()
            },
        ];
        assert!(match_event(&routes, &ev));
        assert!(!match_event(&routes[..1], &ev));
    }

    #[test]
    fn test_annotation_mismatch_skips_then_veto_applies() {
        let routes = vec![
            Route {
                annotations: Some(labels(&[("notify", "true")])),
                ..Default::default()
            },
            Route {
                namespaces: Some(Constraint::include(&["prod"]).unwrap()),
                ..Default::default()
            },
        ];
        // First route is skipped, second vetoes on namespace
        assert!(!match_event(&routes, &event("web-1", "default")));

        let mut ev = event("web-1", "default");
        ev.object_meta.annotations = labels(&[("notify", "true")]);
        assert!(match_event(&routes, &ev));
    }

    #[test]
    fn test_kvs_satisfied() {
        let actual = labels(&[("a", "1"), ("b", "2")]);
        assert!(kvs_satisfied(None, &actual));
        assert!(kvs_satisfied(Some(&BTreeMap::new()), &actual));
        assert!(kvs_satisfied(Some(&BTreeMap::new()), &BTreeMap::new()));
        assert!(kvs_satisfied(Some(&labels(&[("a", "1")])), &actual));
        assert!(!kvs_satisfied(Some(&labels(&[("a", "2")])), &actual));
        assert!(!kvs_satisfied(Some(&labels(&[("c", "1")])), &actual));
        assert!(!kvs_satisfied(Some(&labels(&[("a", "1")])), &BTreeMap::new()));
    }
}
