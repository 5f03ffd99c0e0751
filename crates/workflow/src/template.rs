//! Template interpolation.
//!
//! Exactly two forms are interpolated: `${ctx:path}` and `${env:NAME}`.
//! Unknown paths and names expand to the empty string; nothing else in
//! the input is touched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::env::Environment;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(ctx|env):([^}]*)\}").expect("template pattern is valid"));

/// Textual form of a JSON value for interpolation and logging.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render a template against the context and environment.
pub fn render_template(template: &str, context: &WorkflowContext, env: &Environment) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = caps[2].trim();
            match &caps[1] {
                "ctx" => context
                    .peek(name)
                    .map(|v| value_to_text(&v))
                    .unwrap_or_default(),
                "env" => env.lookup(name).unwrap_or_default(),
                _ => String::new(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SetOptions;
    use serde_json::json;

    #[test]
    fn interpolates_context_and_env() {
        let mut ctx = WorkflowContext::new();
        ctx.set("user.name", json!("alice"), SetOptions::default());
        ctx.set("order", json!(7), SetOptions::default());
        let env = Environment::with_explicit(
            [("REGION".to_string(), "eu-west".to_string())].into(),
        );
        let out = render_template("hi ${ctx:user.name}, order ${ctx:order} in ${env:REGION}", &ctx, &env);
        assert_eq!(out, "hi alice, order 7 in eu-west");
    }

    #[test]
    fn unknown_placeholders_expand_empty() {
        let ctx = WorkflowContext::new();
        let env = Environment::new();
        assert_eq!(render_template("[${ctx:nope}][${env:NOPE}]", &ctx, &env), "[][]");
    }

    #[test]
    fn other_text_is_untouched() {
        let ctx = WorkflowContext::new();
        let env = Environment::new();
        assert_eq!(
            render_template("plain ${weird:thing} $notatemplate", &ctx, &env),
            "plain ${weird:thing} $notatemplate"
        );
    }
}
