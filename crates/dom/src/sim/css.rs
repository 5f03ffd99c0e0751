//! Minimal CSS selector engine for the simulated backend.
//!
//! Supports the subset the selector strategies exercise: tag, `*`, `#id`,
//! `.class`, `[attr]`, `[attr=value]`, descendant and child combinators,
//! and comma-separated selector lists. Anything else is a syntax error,
//! which the strategy layer collapses to "no match".

use super::SimState;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct AttrMatch {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Complex {
    /// Compounds right-to-left: `parts[0]` is the subject.
    parts: Vec<(Compound, Option<Combinator>)>,
}

pub(super) type SelectorList = Vec<Complex>;

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, String> {
    let mut out = String::new();
    while let Some(c) = chars.peek() {
        if is_ident_char(*c) {
            out.push(*c);
            chars.next();
        } else {
            break;
        }
    }
    if out.is_empty() {
        return Err("expected identifier".to_string());
    }
    Ok(out)
}

fn parse_compound(token: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let mut chars = token.chars().peekable();
    let mut saw_universal = false;

    match chars.peek() {
        Some('*') => {
            chars.next();
            saw_universal = true;
        }
        Some(c) if c.is_ascii_alphabetic() => {
            compound.tag = Some(parse_ident(&mut chars)?.to_ascii_lowercase());
        }
        _ => {}
    }

    while let Some(c) = chars.peek().copied() {
        match c {
            '#' => {
                chars.next();
                compound.id = Some(parse_ident(&mut chars)?);
            }
            '.' => {
                chars.next();
                compound.classes.push(parse_ident(&mut chars)?);
            }
            '[' => {
                chars.next();
                let name = parse_ident(&mut chars)?;
                match chars.next() {
                    Some(']') => compound.attrs.push(AttrMatch { name, value: None }),
                    Some('=') => {
                        let mut value = String::new();
                        let quote = match chars.peek() {
                            Some('"') | Some('\'') => chars.next(),
                            _ => None,
                        };
                        while let Some(vc) = chars.peek().copied() {
                            match quote {
                                Some(q) if vc == q => break,
                                None if vc == ']' => break,
                                _ => {
                                    value.push(vc);
                                    chars.next();
                                }
                            }
                        }
                        if quote.is_some() {
                            chars.next();
                        }
                        if chars.next() != Some(']') {
                            return Err(format!("unterminated attribute in '{token}'"));
                        }
                        compound.attrs.push(AttrMatch {
                            name,
                            value: Some(value),
                        });
                    }
                    _ => return Err(format!("unterminated attribute in '{token}'")),
                }
            }
            other => return Err(format!("unsupported selector syntax '{other}' in '{token}'")),
        }
    }

    if !saw_universal && compound == Compound::default() {
        return Err(format!("empty compound selector in '{token}'"));
    }
    Ok(compound)
}

fn parse_complex(input: &str) -> Result<Complex, String> {
    // Normalize child combinators so tokens split on whitespace.
    let normalized = input.replace('>', " > ");
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if tokens.is_empty() {
        return Err("empty selector".to_string());
    }

    let mut parts: Vec<(Compound, Option<Combinator>)> = Vec::new();
    let mut pending = Combinator::Descendant;
    let mut expect_compound = true;
    for token in tokens {
        if token == ">" {
            if expect_compound || parts.is_empty() {
                return Err("dangling child combinator".to_string());
            }
            pending = Combinator::Child;
            expect_compound = true;
            continue;
        }
        let compound = parse_compound(token)?;
        if parts.is_empty() {
            parts.push((compound, None));
        } else {
            parts.push((compound, Some(pending)));
        }
        pending = Combinator::Descendant;
        expect_compound = false;
    }
    if expect_compound {
        return Err("dangling child combinator".to_string());
    }

    // Reverse so the subject compound comes first. Each ancestor entry
    // carries the combinator that joins it to the compound on its right
    // (the one closer to the subject), which is what the right-to-left
    // matcher consumes.
    let n = parts.len();
    let mut linked = Vec::with_capacity(n);
    for i in 0..n {
        let compound = parts[n - 1 - i].0.clone();
        let link = if i == 0 { None } else { parts[n - i].1 };
        linked.push((compound, link));
    }
    Ok(Complex { parts: linked })
}

pub(super) fn parse(selector: &str) -> Result<SelectorList, String> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err("empty selector".to_string());
    }
    trimmed
        .split(',')
        .map(|part| parse_complex(part.trim()))
        .collect()
}

fn compound_matches(state: &SimState, id: u64, compound: &Compound) -> bool {
    let Some(node) = state.node(id) else {
        return false;
    };
    if let Some(tag) = &compound.tag {
        if node.tag != *tag {
            return false;
        }
    }
    if let Some(expected) = &compound.id {
        if node.attributes.get("id") != Some(expected) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let classes = node.classes();
        if !compound.classes.iter().all(|c| classes.contains(c)) {
            return false;
        }
    }
    for attr in &compound.attrs {
        match node.attributes.get(&attr.name) {
            None => return false,
            Some(actual) => {
                if let Some(expected) = &attr.value {
                    if actual != expected {
                        return false;
                    }
                }
            }
        }
    }
    true
}

fn complex_matches(state: &SimState, id: u64, complex: &Complex) -> bool {
    if !compound_matches(state, id, &complex.parts[0].0) {
        return false;
    }
    let mut cursor = id;
    for (compound, link) in complex.parts.iter().skip(1) {
        let combinator = link.unwrap_or(Combinator::Descendant);
        match combinator {
            Combinator::Child => {
                let Some(parent) = state.node(cursor).and_then(|n| n.parent) else {
                    return false;
                };
                if !compound_matches(state, parent, compound) {
                    return false;
                }
                cursor = parent;
            }
            Combinator::Descendant => {
                let mut found = false;
                let mut walker = state.node(cursor).and_then(|n| n.parent);
                while let Some(ancestor) = walker {
                    if compound_matches(state, ancestor, compound) {
                        cursor = ancestor;
                        found = true;
                        break;
                    }
                    walker = state.node(ancestor).and_then(|n| n.parent);
                }
                if !found {
                    return false;
                }
            }
        }
    }
    true
}

pub(super) fn matches(state: &SimState, id: u64, _scope: u64, list: &SelectorList) -> bool {
    list.iter().any(|complex| complex_matches(state, id, complex))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_selector() {
        let list = parse("button#go.primary[data-kind='x']").unwrap();
        assert_eq!(list.len(), 1);
        let subject = &list[0].parts[0].0;
        assert_eq!(subject.tag.as_deref(), Some("button"));
        assert_eq!(subject.id.as_deref(), Some("go"));
        assert_eq!(subject.classes, vec!["primary".to_string()]);
        assert_eq!(subject.attrs.len(), 1);
    }

    #[test]
    fn parses_descendant_and_child_chains() {
        let list = parse("div.list > li .label").unwrap();
        assert_eq!(list[0].parts.len(), 3);
    }

    #[test]
    fn parses_the_universal_selector() {
        assert!(parse("*").is_ok());
        assert!(parse("div > *").is_ok());
    }

    #[test]
    fn rejects_pseudo_selectors() {
        assert!(parse("li:first-child").is_err());
        assert!(parse("a::before").is_err());
        assert!(parse("").is_err());
        assert!(parse("ul >").is_err());
    }
}
