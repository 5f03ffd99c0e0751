//! Strategy execution against a query root.
//!
//! Executors are pure with respect to the DOM and never fail upward:
//! backend query errors (bad CSS, bad XPath) collapse to "no match".

use tracing::debug;

use dgx_dom::{DomBackend, NodeHandle};
use dgx_telemetry::collapse_whitespace;

use crate::types::Strategy;

/// Evaluate one strategy under `root` (ambient document when `None`),
/// returning matches in document order.
pub fn execute_strategy(
    backend: &dyn DomBackend,
    strategy: &Strategy,
    root: Option<&NodeHandle>,
) -> Vec<NodeHandle> {
    match strategy {
        Strategy::Role {
            role,
            name,
            label,
            text,
        } => {
            let mut candidates: Vec<NodeHandle> = backend
                .elements_with_attribute(root, "role")
                .into_iter()
                .filter(|node| backend.attribute(node, "role").as_deref() == Some(role.as_str()))
                .collect();
            if let Some(expected) = name.as_deref().or(label.as_deref()) {
                candidates.retain(|node| {
                    accessible_name(backend, node)
                        .map(|actual| names_equal(&actual, expected, false))
                        .unwrap_or(false)
                });
            }
            if let Some(fragment) = text {
                let needle = collapse_whitespace(fragment);
                candidates.retain(|node| {
                    backend
                        .text_content(node)
                        .map(|t| collapse_whitespace(&t).contains(&needle))
                        .unwrap_or(false)
                });
            }
            candidates
        }

        Strategy::Name { name } => backend
            .elements_with_attribute(root, "name")
            .into_iter()
            .filter(|node| backend.attribute(node, "name").as_deref() == Some(name.as_str()))
            .collect(),

        Strategy::Label {
            label,
            case_sensitive,
        } => all_elements(backend, root)
            .into_iter()
            .filter(|node| {
                accessible_name(backend, node)
                    .map(|actual| names_equal(&actual, label, *case_sensitive))
                    .unwrap_or(false)
            })
            .collect(),

        Strategy::Text {
            text,
            exact,
            case_sensitive,
            normalize_whitespace,
        } => {
            let expected = prepare_text(text, *normalize_whitespace, *case_sensitive);
            all_elements(backend, root)
                .into_iter()
                .filter(|node| {
                    let Some(actual) = backend.text_content(node) else {
                        return false;
                    };
                    let actual = prepare_text(&actual, *normalize_whitespace, *case_sensitive);
                    if *exact {
                        actual == expected
                    } else {
                        actual.contains(&expected)
                    }
                })
                .collect()
        }

        Strategy::DataAttr { attribute, value } => backend
            .elements_with_attribute(root, attribute)
            .into_iter()
            .filter(|node| match value {
                None => true,
                Some(expected) => {
                    backend.attribute(node, attribute).as_deref() == Some(expected.as_str())
                }
            })
            .collect(),

        Strategy::TestId { test_id, attribute } => {
            let attribute = attribute.as_deref().unwrap_or("data-testid");
            backend
                .elements_with_attribute(root, attribute)
                .into_iter()
                .filter(|node| backend.attribute(node, attribute).as_deref() == Some(test_id.as_str()))
                .collect()
        }

        Strategy::Css { selector } => match backend.query_css(root, selector) {
            Ok(matches) => matches,
            Err(err) => {
                debug!(error = %err, "css strategy yielded no match");
                Vec::new()
            }
        },

        Strategy::Xpath { expression } => match backend.query_xpath(root, expression) {
            Ok(matches) => matches,
            Err(err) => {
                debug!(error = %err, "xpath strategy yielded no match");
                Vec::new()
            }
        },
    }
}

fn all_elements(backend: &dyn DomBackend, root: Option<&NodeHandle>) -> Vec<NodeHandle> {
    backend.query_css(root, "*").unwrap_or_default()
}

fn prepare_text(text: &str, normalize: bool, case_sensitive: bool) -> String {
    let text = if normalize {
        collapse_whitespace(text)
    } else {
        text.trim().to_string()
    };
    if case_sensitive {
        text
    } else {
        text.to_lowercase()
    }
}

fn names_equal(actual: &str, expected: &str, case_sensitive: bool) -> bool {
    let actual = collapse_whitespace(actual);
    let expected = collapse_whitespace(expected);
    if case_sensitive {
        actual == expected
    } else {
        actual.to_lowercase() == expected.to_lowercase()
    }
}

/// Assemble the accessible name of a node: `aria-label`, then the
/// elements referenced by `aria-labelledby` tokens, then form labels,
/// then `title`, then direct text content.
pub fn accessible_name(backend: &dyn DomBackend, node: &NodeHandle) -> Option<String> {
    if let Some(label) = backend.attribute(node, "aria-label") {
        let trimmed = label.trim().to_string();
        if !trimmed.is_empty() {
            return Some(trimmed);
        }
    }

    if let Some(labelled_by) = backend.attribute(node, "aria-labelledby") {
        let mut parts = Vec::new();
        for token in labelled_by.split_whitespace() {
            if let Some(referent) = backend.element_by_id(token) {
                if let Some(text) = backend.text_content(&referent) {
                    let trimmed = text.trim().to_string();
                    if !trimmed.is_empty() {
                        parts.push(trimmed);
                    }
                }
            }
        }
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
    }

    let labels = backend.labels(node);
    if !labels.is_empty() {
        let mut parts = Vec::new();
        for label in labels {
            if let Some(text) = backend.text_content(&label) {
                let trimmed = text.trim().to_string();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
            }
        }
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
    }

    if let Some(title) = backend.attribute(node, "title") {
        let trimmed = title.trim().to_string();
        if !trimmed.is_empty() {
            return Some(trimmed);
        }
    }

    backend
        .text_content(node)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgx_dom::{ElementSpec, SimDom};

    fn dom_with_form() -> (SimDom, NodeHandle, NodeHandle) {
        let dom = SimDom::new();
        let root = dom.root();
        let heading = dom.append(
            &root,
            ElementSpec::new("span").id("email-label").text("Email address"),
        );
        let input = dom.append(
            &root,
            ElementSpec::new("input")
                .id("email")
                .attr("name", "email")
                .attr("aria-labelledby", "email-label"),
        );
        (dom, heading, input)
    }

    #[test]
    fn role_strategy_filters_by_accessible_name() {
        let dom = SimDom::new();
        let root = dom.root();
        let submit = dom.append(
            &root,
            ElementSpec::new("button")
                .attr("role", "button")
                .attr("aria-label", "Submit"),
        );
        dom.append(
            &root,
            ElementSpec::new("button")
                .attr("role", "button")
                .attr("aria-label", "Cancel"),
        );
        let hits = execute_strategy(
            &dom,
            &Strategy::Role {
                role: "button".into(),
                name: Some("submit".into()),
                label: None,
                text: None,
            },
            None,
        );
        assert_eq!(hits, vec![submit]);
    }

    #[test]
    fn label_strategy_uses_labelledby_referents() {
        let (dom, _, input) = dom_with_form();
        let hits = execute_strategy(
            &dom,
            &Strategy::Label {
                label: "email   address".into(),
                case_sensitive: false,
            },
            None,
        );
        assert_eq!(hits, vec![input]);
    }

    #[test]
    fn text_strategy_exact_and_substring() {
        let dom = SimDom::new();
        let root = dom.root();
        let node = dom.append(&root, ElementSpec::new("p").text("  Hello   World "));
        let exact = execute_strategy(
            &dom,
            &Strategy::Text {
                text: "hello world".into(),
                exact: true,
                case_sensitive: false,
                normalize_whitespace: true,
            },
            None,
        );
        assert!(exact.contains(&node));
        let case_miss = execute_strategy(
            &dom,
            &Strategy::Text {
                text: "hello world".into(),
                exact: true,
                case_sensitive: true,
                normalize_whitespace: true,
            },
            None,
        );
        assert!(!case_miss.contains(&node));
    }

    #[test]
    fn test_id_strategy_honors_custom_attribute() {
        let dom = SimDom::new();
        let root = dom.root();
        let node = dom.append(&root, ElementSpec::new("div").attr("data-qa", "row"));
        let hits = execute_strategy(
            &dom,
            &Strategy::TestId {
                test_id: "row".into(),
                attribute: Some("data-qa".into()),
            },
            None,
        );
        assert_eq!(hits, vec![node]);
        let default_attr = execute_strategy(
            &dom,
            &Strategy::TestId {
                test_id: "row".into(),
                attribute: None,
            },
            None,
        );
        assert!(default_attr.is_empty());
    }

    #[test]
    fn name_and_data_attr_strategies_filter_exactly() {
        let dom = SimDom::new();
        let root = dom.root();
        let field = dom.append(&root, ElementSpec::new("input").attr("name", "email"));
        dom.append(&root, ElementSpec::new("input").attr("name", "phone"));
        let tagged = dom.append(&root, ElementSpec::new("div").attr("data-state", "open"));
        dom.append(&root, ElementSpec::new("div").attr("data-state", "closed"));

        let by_name = execute_strategy(&dom, &Strategy::Name { name: "email".into() }, None);
        assert_eq!(by_name, vec![field]);

        let any_state = execute_strategy(
            &dom,
            &Strategy::DataAttr {
                attribute: "data-state".into(),
                value: None,
            },
            None,
        );
        assert_eq!(any_state.len(), 2);

        let open_only = execute_strategy(
            &dom,
            &Strategy::DataAttr {
                attribute: "data-state".into(),
                value: Some("open".into()),
            },
            None,
        );
        assert_eq!(open_only, vec![tagged]);
    }

    #[test]
    fn role_strategy_text_filter_collapses_whitespace() {
        let dom = SimDom::new();
        let root = dom.root();
        let tab = dom.append(
            &root,
            ElementSpec::new("div").attr("role", "tab").text("Open   orders"),
        );
        dom.append(&root, ElementSpec::new("div").attr("role", "tab").text("Returns"));
        let hits = execute_strategy(
            &dom,
            &Strategy::Role {
                role: "tab".into(),
                name: None,
                label: None,
                text: Some("open orders".into()),
            },
            None,
        );
        assert_eq!(hits, vec![tab]);
    }

    #[test]
    fn xpath_strategy_returns_ordered_matches() {
        let dom = SimDom::new();
        let root = dom.root();
        let first = dom.append(&root, ElementSpec::new("li").attr("data-row", "1"));
        let second = dom.append(&root, ElementSpec::new("li").attr("data-row", "2"));
        let hits = execute_strategy(
            &dom,
            &Strategy::Xpath {
                expression: "//li[@data-row]".into(),
            },
            None,
        );
        assert_eq!(hits, vec![first, second]);
    }

    #[test]
    fn shadow_root_works_as_query_root() {
        let dom = SimDom::new();
        let root = dom.root();
        let host = dom.append(&root, ElementSpec::new("x-card"));
        let shadow = dom.attach_shadow(&host);
        let inner = dom.append(&shadow, ElementSpec::new("button").class("cta"));
        let scoped = execute_strategy(
            &dom,
            &Strategy::Css {
                selector: ".cta".into(),
            },
            Some(&shadow),
        );
        assert_eq!(scoped, vec![inner]);
        let ambient = execute_strategy(
            &dom,
            &Strategy::Css {
                selector: ".cta".into(),
            },
            None,
        );
        assert!(ambient.is_empty());
    }

    #[test]
    fn css_syntax_errors_collapse_to_empty() {
        let dom = SimDom::new();
        let hits = execute_strategy(
            &dom,
            &Strategy::Css {
                selector: ":::".into(),
            },
            None,
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn scoped_execution_stays_inside_root() {
        let dom = SimDom::new();
        let root = dom.root();
        let panel = dom.append(&root, ElementSpec::new("section").id("panel"));
        let inside = dom.append(&panel, ElementSpec::new("button").class("go"));
        dom.append(&root, ElementSpec::new("button").class("go"));
        let hits = execute_strategy(
            &dom,
            &Strategy::Css {
                selector: ".go".into(),
            },
            Some(&panel),
        );
        assert_eq!(hits, vec![inside]);
    }
}
