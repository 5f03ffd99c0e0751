//! Minimal XPath evaluator for the simulated backend.
//!
//! Supports the descendant-axis shapes recorded selector maps actually
//! contain: `//tag`, `//*`, optionally with one attribute predicate
//! (`[@attr]`, `[@attr='value']`). Evaluation is an ordered snapshot
//! filtered to elements; anything else is a syntax error.

use super::SimState;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct XPathQuery {
    tag: Option<String>,
    attr: Option<(String, Option<String>)>,
}

pub(super) fn parse(expression: &str) -> Result<XPathQuery, String> {
    let mut rest = expression.trim();
    if let Some(stripped) = rest.strip_prefix('.') {
        rest = stripped;
    }
    let Some(stripped) = rest.strip_prefix("//") else {
        return Err(format!("unsupported xpath axis in '{expression}'"));
    };
    rest = stripped;

    let name_end = rest
        .find('[')
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    let tag = match name {
        "*" => None,
        n if !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') => {
            Some(n.to_ascii_lowercase())
        }
        _ => return Err(format!("unsupported xpath node test in '{expression}'")),
    };

    let mut attr = None;
    let predicate = rest[name_end..].trim();
    if !predicate.is_empty() {
        let inner = predicate
            .strip_prefix('[')
            .and_then(|p| p.strip_suffix(']'))
            .ok_or_else(|| format!("unterminated predicate in '{expression}'"))?;
        let inner = inner.trim();
        let Some(inner) = inner.strip_prefix('@') else {
            return Err(format!("unsupported predicate in '{expression}'"));
        };
        attr = Some(match inner.split_once('=') {
            None => (inner.trim().to_string(), None),
            Some((name, value)) => {
                let value = value.trim();
                let unquoted = value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                    .ok_or_else(|| format!("unquoted predicate value in '{expression}'"))?;
                (name.trim().to_string(), Some(unquoted.to_string()))
            }
        });
    }

    Ok(XPathQuery { tag, attr })
}

pub(super) fn matches(state: &SimState, id: u64, query: &XPathQuery) -> bool {
    let Some(node) = state.node(id) else {
        return false;
    };
    if let Some(tag) = &query.tag {
        if node.tag != *tag {
            return false;
        }
    }
    if let Some((name, expected)) = &query.attr {
        match node.attributes.get(name) {
            None => return false,
            Some(actual) => {
                if let Some(expected) = expected {
                    if actual != expected {
                        return false;
                    }
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_descendant_query() {
        let q = parse("//button").unwrap();
        assert_eq!(q.tag.as_deref(), Some("button"));
        assert!(q.attr.is_none());
    }

    #[test]
    fn parses_wildcard_with_predicate() {
        let q = parse("//*[@data-testid='row']").unwrap();
        assert!(q.tag.is_none());
        assert_eq!(
            q.attr,
            Some(("data-testid".to_string(), Some("row".to_string())))
        );
    }

    #[test]
    fn rejects_absolute_and_function_paths() {
        assert!(parse("/html/body").is_err());
        assert!(parse("//div[text()='x']").is_err());
        assert!(parse("//div[@a='b").is_err());
    }
}
