//! Cascading selector resolution with scope chaining.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use dgx_dom::{DomBackend, NodeHandle};

use crate::map::SelectorMap;
use crate::strategies::execute_strategy;
use crate::telemetry::{
    merge_tags, AttemptSummary, ResolverAttemptEvent, ResolverMissEvent, ResolverSuccessEvent,
    ResolverTelemetry, ResolverWarning,
};
use crate::types::{ResolveAttempt, ResolveResult, ResolvedScope, SelectorEntry};

/// Per-call resolution options.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Caller-supplied query root for entries without their own scope.
    pub scope_root: Option<NodeHandle>,
    /// Cooperative cancellation; a cancelled resolve returns a miss.
    pub cancel: Option<CancellationToken>,
}

enum ScopeOutcome {
    Resolved { root: NodeHandle, unique: bool },
    Missed,
    Cycle,
}

struct InnerResult {
    result: ResolveResult,
    cycle: bool,
}

/// The selector resolution core.
///
/// Resolution is synchronous and never mutates the DOM. The runtime call
/// graph is tree-shaped even over cyclic maps: each resolution carries a
/// visited-key set, copied on scope recursion so sibling entries may
/// share scopes while cycles are still detected.
pub struct SelectorResolver {
    backend: Arc<dyn DomBackend>,
    telemetry: ResolverTelemetry,
}

impl SelectorResolver {
    pub fn new(backend: Arc<dyn DomBackend>, telemetry: ResolverTelemetry) -> Self {
        Self { backend, telemetry }
    }

    pub fn backend(&self) -> &Arc<dyn DomBackend> {
        &self.backend
    }

    pub fn telemetry(&self) -> &ResolverTelemetry {
        &self.telemetry
    }

    /// Resolve a logical key to a live element.
    pub fn resolve(&self, map: &SelectorMap, key: &str, options: &ResolveOptions) -> ResolveResult {
        let mut visited = HashSet::new();
        self.resolve_inner(map, key, options, &mut visited).result
    }

    fn resolve_inner(
        &self,
        map: &SelectorMap,
        key: &str,
        options: &ResolveOptions,
        visited: &mut HashSet<String>,
    ) -> InnerResult {
        if options
            .cancel
            .as_ref()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
        {
            return InnerResult {
                result: ResolveResult::miss(key),
                cycle: false,
            };
        }

        if visited.contains(key) {
            self.telemetry.warning(&ResolverWarning {
                key: key.to_string(),
                code: "recursion",
                message: format!("recursion detected while resolving '{key}': scope chain forms a cycle"),
            });
            return InnerResult {
                result: ResolveResult::miss(key),
                cycle: true,
            };
        }
        visited.insert(key.to_string());

        let Some(entry) = map.get(key) else {
            self.telemetry.warning(&ResolverWarning {
                key: key.to_string(),
                code: "missing-key",
                message: format!("no selector entry for key '{key}'"),
            });
            return InnerResult {
                result: ResolveResult::miss(key),
                cycle: false,
            };
        };

        let (scope, scope_unique) = match self.resolve_scope(map, entry, options, visited) {
            ScopeOutcome::Cycle => {
                // A cyclic scope chain poisons the dependent key: no
                // strategies run.
                let mut result = ResolveResult::miss(key);
                result.entry = Some(entry.clone());
                return InnerResult {
                    result,
                    cycle: true,
                };
            }
            ScopeOutcome::Resolved { root, unique } => (
                Some(ResolvedScope {
                    key: entry.scope_key.clone(),
                    root,
                }),
                Some(unique),
            ),
            ScopeOutcome::Missed => (
                options.scope_root.map(|root| ResolvedScope { key: None, root }),
                None,
            ),
        };

        let root = scope.as_ref().map(|s| s.root);
        let attempt_count = entry.tries.len();
        let mut attempts = Vec::with_capacity(attempt_count);
        let mut resolved = None;

        for (index, selector_try) in entry.tries.iter().enumerate() {
            let elements = execute_strategy(self.backend.as_ref(), &selector_try.strategy, root.as_ref());
            let success = !elements.is_empty();
            let attempt = ResolveAttempt {
                index: index + 1,
                strategy: selector_try.clone(),
                success,
                elements,
            };
            self.telemetry.attempt(&ResolverAttemptEvent {
                key: key.to_string(),
                scope_key: entry.scope_key.clone(),
                attempt_index: attempt.index,
                attempt_count,
                strategy_kind: selector_try.strategy.kind().to_string(),
                success,
                element_count: attempt.element_count(),
                stability_score: selector_try
                    .metadata
                    .stability_score
                    .or(entry.metadata.stability_score),
                scope_unique,
                tags: merge_tags(&selector_try.metadata.tags, &entry.metadata.tags),
            });
            let hit = success.then(|| (attempt.elements[0], selector_try.clone()));
            attempts.push(attempt);
            if let Some((element, winning_try)) = hit {
                resolved = Some((element, winning_try, index + 1));
                break;
            }
        }

        let result = match resolved {
            Some((element, winning_try, attempt_index)) => {
                self.telemetry.success(&ResolverSuccessEvent {
                    key: key.to_string(),
                    scope_key: entry.scope_key.clone(),
                    strategy_kind: winning_try.strategy.kind().to_string(),
                    attempt_index,
                    attempt_count,
                    element_count: attempts
                        .last()
                        .map(ResolveAttempt::element_count)
                        .unwrap_or(0),
                    stability_score: winning_try
                        .metadata
                        .stability_score
                        .or(entry.metadata.stability_score),
                    scope_unique,
                    tags: merge_tags(&winning_try.metadata.tags, &entry.metadata.tags),
                });
                ResolveResult {
                    key: key.to_string(),
                    element: Some(element),
                    attempts,
                    resolved_by: Some(winning_try),
                    scope,
                    entry: Some(entry.clone()),
                }
            }
            None => {
                self.telemetry.miss(&ResolverMissEvent {
                    key: key.to_string(),
                    scope_key: entry.scope_key.clone(),
                    attempt_count,
                    attempts: attempts
                        .iter()
                        .map(|a| AttemptSummary {
                            kind: a.strategy.strategy.kind().to_string(),
                            success: a.success,
                            element_count: a.element_count(),
                        })
                        .collect(),
                    tags: merge_tags(&[], &entry.metadata.tags),
                });
                ResolveResult {
                    key: key.to_string(),
                    element: None,
                    attempts,
                    resolved_by: None,
                    scope,
                    entry: Some(entry.clone()),
                }
            }
        };

        InnerResult {
            result,
            cycle: false,
        }
    }

    fn resolve_scope(
        &self,
        map: &SelectorMap,
        entry: &SelectorEntry,
        options: &ResolveOptions,
        visited: &HashSet<String>,
    ) -> ScopeOutcome {
        let Some(scope_key) = &entry.scope_key else {
            return ScopeOutcome::Missed;
        };

        // Siblings may share a scope: recurse over a copy of the visited
        // set so only true cycles trip the breaker.
        let mut scope_visited = visited.clone();
        let inner = self.resolve_inner(map, scope_key, options, &mut scope_visited);
        if inner.cycle {
            return ScopeOutcome::Cycle;
        }
        match inner.result.element {
            Some(root) => {
                let unique = inner
                    .result
                    .attempts
                    .iter()
                    .find(|a| a.success)
                    .map(|a| a.element_count() == 1)
                    .unwrap_or(false);
                ScopeOutcome::Resolved { root, unique }
            }
            None => {
                self.telemetry.warning(&ResolverWarning {
                    key: scope_key.clone(),
                    code: "scope-miss",
                    message: format!(
                        "scope key '{scope_key}' did not resolve; falling back to ambient root"
                    ),
                });
                ScopeOutcome::Missed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SelectorTry, Strategy};
    use dgx_dom::{ElementSpec, SimDom};
    use dgx_telemetry::{LogLevel, MemoryLogger};

    fn css_try(selector: &str) -> SelectorTry {
        SelectorTry::new(Strategy::Css {
            selector: selector.to_string(),
        })
    }

    fn role_try(role: &str, name: &str) -> SelectorTry {
        SelectorTry::new(Strategy::Role {
            role: role.to_string(),
            name: Some(name.to_string()),
            label: None,
            text: None,
        })
    }

    fn resolver_with_logger(dom: &SimDom) -> (SelectorResolver, Arc<MemoryLogger>) {
        let logger = MemoryLogger::new();
        let telemetry = ResolverTelemetry::new(logger.clone());
        (
            SelectorResolver::new(Arc::new(dom.clone()), telemetry),
            logger,
        )
    }

    #[test]
    fn resolves_via_fallback_strategy() {
        // No role=button match; one .primary element.
        let dom = SimDom::new();
        let root = dom.root();
        let button = dom.append(&root, ElementSpec::new("button").class("primary"));
        let mut map = SelectorMap::new();
        map.insert(
            "primary",
            SelectorEntry::new(vec![role_try("button", "Submit"), css_try(".primary")]),
        );

        let (resolver, logger) = resolver_with_logger(&dom);
        let result = resolver.resolve(&map, "primary", &ResolveOptions::default());

        assert_eq!(result.element, Some(button));
        assert_eq!(result.resolved_by.as_ref().map(|t| t.strategy.kind()), Some("css"));
        assert_eq!(result.attempts.len(), 2);
        assert!(!result.attempts[0].success);
        assert!(result.attempts[1].success);
        assert_eq!(logger.messages_at(LogLevel::Debug).len(), 2);
        assert_eq!(logger.messages_at(LogLevel::Info), vec!["resolver success"]);
    }

    #[test]
    fn miss_reports_every_attempt_in_order() {
        let dom = SimDom::new();
        let mut map = SelectorMap::new();
        map.insert(
            "gone",
            SelectorEntry::new(vec![css_try(".a"), css_try(".b"), css_try(".c")]),
        );
        let (resolver, logger) = resolver_with_logger(&dom);
        let result = resolver.resolve(&map, "gone", &ResolveOptions::default());
        assert!(result.element.is_none());
        assert_eq!(result.attempts.len(), 3);
        assert!(result.attempts.iter().all(|a| !a.success));
        assert_eq!(logger.messages_at(LogLevel::Warn), vec!["resolver miss"]);
    }

    #[test]
    fn missing_key_warns_and_misses() {
        let dom = SimDom::new();
        let map = SelectorMap::new();
        let (resolver, logger) = resolver_with_logger(&dom);
        let result = resolver.resolve(&map, "absent", &ResolveOptions::default());
        assert!(result.element.is_none());
        assert!(result.attempts.is_empty());
        assert!(logger.contains("no selector entry"));
    }

    #[test]
    fn cyclic_scope_chain_breaks_with_one_warning() {
        let dom = SimDom::new();
        let root = dom.root();
        dom.append(&root, ElementSpec::new("div").class("a"));
        dom.append(&root, ElementSpec::new("div").class("b"));

        let mut map = SelectorMap::new();
        map.insert(
            "A",
            SelectorEntry::new(vec![css_try(".a")]).with_scope("B"),
        );
        map.insert(
            "B",
            SelectorEntry::new(vec![css_try(".b")]).with_scope("A"),
        );

        let (resolver, logger) = resolver_with_logger(&dom);
        let result = resolver.resolve(&map, "A", &ResolveOptions::default());

        assert!(result.element.is_none());
        assert!(result.attempts.is_empty(), "no strategies may run under a cyclic scope");
        let recursion_warnings: Vec<_> = logger
            .lines()
            .into_iter()
            .filter(|l| l.message.contains("recursion") || l.message.contains("cycle"))
            .collect();
        assert_eq!(recursion_warnings.len(), 1);
    }

    #[test]
    fn scope_chain_constrains_resolution() {
        let dom = SimDom::new();
        let root = dom.root();
        let panel = dom.append(&root, ElementSpec::new("section").id("panel"));
        let inside = dom.append(&panel, ElementSpec::new("button").class("go"));
        dom.append(&root, ElementSpec::new("button").class("go"));

        let mut map = SelectorMap::new();
        map.insert("panel", SelectorEntry::new(vec![css_try("#panel")]));
        map.insert(
            "panel.go",
            SelectorEntry::new(vec![css_try(".go")]).with_scope("panel"),
        );

        let (resolver, _) = resolver_with_logger(&dom);
        let result = resolver.resolve(&map, "panel.go", &ResolveOptions::default());
        assert_eq!(result.element, Some(inside));
        let scope = result.scope.unwrap();
        assert_eq!(scope.key.as_deref(), Some("panel"));
        assert_eq!(scope.root, panel);
    }

    #[test]
    fn scope_miss_falls_back_to_ambient() {
        let dom = SimDom::new();
        let root = dom.root();
        let target = dom.append(&root, ElementSpec::new("button").class("go"));

        let mut map = SelectorMap::new();
        map.insert("panel", SelectorEntry::new(vec![css_try("#missing-panel")]));
        map.insert(
            "panel.go",
            SelectorEntry::new(vec![css_try(".go")]).with_scope("panel"),
        );

        let (resolver, logger) = resolver_with_logger(&dom);
        let result = resolver.resolve(&map, "panel.go", &ResolveOptions::default());
        assert_eq!(result.element, Some(target));
        assert!(logger.contains("falling back to ambient"));
    }

    #[test]
    fn siblings_may_share_a_scope() {
        let dom = SimDom::new();
        let root = dom.root();
        let panel = dom.append(&root, ElementSpec::new("section").id("panel"));
        dom.append(&panel, ElementSpec::new("button").class("one"));
        dom.append(&panel, ElementSpec::new("button").class("two"));

        let mut map = SelectorMap::new();
        map.insert("panel", SelectorEntry::new(vec![css_try("#panel")]));
        map.insert(
            "one",
            SelectorEntry::new(vec![css_try(".one")]).with_scope("panel"),
        );
        map.insert(
            "two",
            SelectorEntry::new(vec![css_try(".two")]).with_scope("panel"),
        );

        let (resolver, _) = resolver_with_logger(&dom);
        assert!(resolver.resolve(&map, "one", &ResolveOptions::default()).is_hit());
        assert!(resolver.resolve(&map, "two", &ResolveOptions::default()).is_hit());
    }

    #[test]
    fn first_element_in_source_order_wins_ties() {
        let dom = SimDom::new();
        let root = dom.root();
        let first = dom.append(&root, ElementSpec::new("li").class("row"));
        dom.append(&root, ElementSpec::new("li").class("row"));
        dom.append(&root, ElementSpec::new("li").class("row"));

        let mut map = SelectorMap::new();
        map.insert("row", SelectorEntry::new(vec![css_try(".row")]));
        let (resolver, _) = resolver_with_logger(&dom);
        let result = resolver.resolve(&map, "row", &ResolveOptions::default());
        assert_eq!(result.element, Some(first));
        assert_eq!(result.attempts[0].element_count(), 3);
    }

    #[test]
    fn cancelled_resolution_returns_miss() {
        let dom = SimDom::new();
        let root = dom.root();
        dom.append(&root, ElementSpec::new("button").class("go"));
        let mut map = SelectorMap::new();
        map.insert("go", SelectorEntry::new(vec![css_try(".go")]));

        let token = CancellationToken::new();
        token.cancel();
        let (resolver, _) = resolver_with_logger(&dom);
        let result = resolver.resolve(
            &map,
            "go",
            &ResolveOptions {
                scope_root: None,
                cancel: Some(token),
            },
        );
        assert!(result.element.is_none());
    }
}
