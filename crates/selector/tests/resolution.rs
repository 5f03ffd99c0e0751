//! Resolver behavior over JSON-loaded maps.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use dgx_dom::{ElementSpec, SimDom};
use dgx_selector::{
    merge_entries, ResolveOptions, ResolverTelemetry, SelectorMap, SelectorResolver,
};

fn resolver(dom: &SimDom) -> SelectorResolver {
    SelectorResolver::new(Arc::new(dom.clone()), ResolverTelemetry::default())
}

#[test]
fn deep_scope_chains_resolve_inside_out() {
    let dom = SimDom::new();
    let root = dom.root();
    let app = dom.append(&root, ElementSpec::new("main").id("app"));
    let panel = dom.append(&app, ElementSpec::new("section").class("panel"));
    let button = dom.append(&panel, ElementSpec::new("button").class("go"));
    // Decoys outside each scope level.
    dom.append(&root, ElementSpec::new("section").class("panel"));
    dom.append(&root, ElementSpec::new("button").class("go"));

    let (map, warnings) = SelectorMap::from_json(&json!({
        "app": { "tries": [ { "kind": "css", "selector": "#app" } ] },
        "app.panel": {
            "scopeKey": "app",
            "tries": [ { "kind": "css", "selector": ".panel" } ]
        },
        "app.panel.go": {
            "scopeKey": "app.panel",
            "tries": [ { "kind": "css", "selector": ".go" } ]
        }
    }));
    assert!(warnings.is_empty());

    let result = resolver(&dom).resolve(&map, "app.panel.go", &ResolveOptions::default());
    assert_eq!(result.element, Some(button));
    assert_eq!(result.scope.unwrap().root, panel);
}

#[test]
fn attempts_are_the_exact_prefix_up_to_the_first_hit() {
    let dom = SimDom::new();
    let root = dom.root();
    dom.append(&root, ElementSpec::new("div").attr("data-testid", "row"));

    let (map, _) = SelectorMap::from_json(&json!({
        "row": {
            "tries": [
                { "kind": "role", "role": "row" },
                { "kind": "text", "text": "missing" },
                { "kind": "testId", "testId": "row" },
                { "kind": "css", "selector": ".never-reached" }
            ]
        }
    }));

    let attempts: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = attempts.clone();
    let telemetry = ResolverTelemetry::default()
        .on_attempt(move |event| {
            sink.lock()
                .push((event.strategy_kind.clone(), event.success));
        });
    let resolver = SelectorResolver::new(Arc::new(dom.clone()), telemetry);

    let result = resolver.resolve(&map, "row", &ResolveOptions::default());
    assert!(result.is_hit());
    // The fourth strategy never ran.
    let observed = attempts.lock().clone();
    assert_eq!(
        observed,
        vec![
            ("role".to_string(), false),
            ("text".to_string(), false),
            ("testId".to_string(), true),
        ]
    );
    assert_eq!(result.attempts.len(), 3);
}

#[test]
fn merged_entries_resolve_like_their_parts() {
    let dom = SimDom::new();
    let root = dom.root();
    let target = dom.append(&root, ElementSpec::new("button").class("go"));

    let (recorded, _) = SelectorMap::from_json(&json!({
        "go": { "tries": [ { "kind": "css", "selector": ".go" } ] }
    }));
    let (curated, _) = SelectorMap::from_json(&json!({
        "go": {
            "tries": [
                { "kind": "role", "role": "button", "name": "Go" },
                { "kind": "css", "selector": ".go" }
            ],
            "tags": ["nav"]
        }
    }));

    let mut map = SelectorMap::new();
    map.insert(
        "go",
        merge_entries(curated.get("go").unwrap(), recorded.get("go").unwrap()),
    );
    let entry = map.get("go").unwrap();
    // Role outranks css; the duplicate css try collapsed.
    assert_eq!(entry.tries.len(), 2);
    assert_eq!(entry.tries[0].strategy.kind(), "role");

    let result = resolver(&dom).resolve(&map, "go", &ResolveOptions::default());
    assert_eq!(result.element, Some(target));
}

#[test]
fn caller_scope_root_constrains_unscoped_entries() {
    let dom = SimDom::new();
    let root = dom.root();
    let pane = dom.append(&root, ElementSpec::new("div").id("pane"));
    let inside = dom.append(&pane, ElementSpec::new("span").class("chip"));
    dom.append(&root, ElementSpec::new("span").class("chip"));

    let (map, _) = SelectorMap::from_json(&json!({
        "chip": { "tries": [ { "kind": "css", "selector": ".chip" } ] }
    }));
    let result = resolver(&dom).resolve(
        &map,
        "chip",
        &ResolveOptions {
            scope_root: Some(pane),
            cancel: None,
        },
    );
    assert_eq!(result.element, Some(inside));
    let scope = result.scope.unwrap();
    assert!(scope.key.is_none());
    assert_eq!(scope.root, pane);
}
