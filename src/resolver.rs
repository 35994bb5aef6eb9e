//! Resolving dotted-path references and `<placeholder>` substitutions
//! against a context view (`workflow_data` plus any mapped-iteration overlay).

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]+)>").unwrap());

/// Resolves a single reference string against `context`.
///
/// Rules, evaluated top-down:
/// 1. The literal `item` — the mapped-iteration overlay value.
/// 2. A quoted literal `'...'` — the inner string, verbatim.
/// 3. A dotted form `a.b.c` — left-fold: resolve `a`, then descend into `b`,
///    then `c`, as long as each step lands on an object; otherwise `null`.
/// 4. A bare key — `context[key]` or `null`.
pub fn resolve_ref(context: &FxHashMap<String, Value>, reference: &str) -> Value {
    if reference == "item" {
        return context.get("item").cloned().unwrap_or(Value::Null);
    }

    if reference.len() >= 2 && reference.starts_with('\'') && reference.ends_with('\'') {
        return Value::String(reference[1..reference.len() - 1].to_string());
    }

    let mut parts = reference.splitn(2, '.');
    let head = parts.next().unwrap_or(reference);
    let rest = parts.next();

    let mut current = context.get(head).cloned().unwrap_or(Value::Null);
    let Some(mut remaining) = rest else {
        return current;
    };

    loop {
        let Value::Object(map) = &current else {
            return Value::Null;
        };
        let mut it = remaining.splitn(2, '.');
        let key = it.next().unwrap_or(remaining);
        let next_remaining = it.next();
        current = map.get(key).cloned().unwrap_or(Value::Null);
        match next_remaining {
            Some(r) => remaining = r,
            None => return current,
        }
    }
}

/// Recursively walks a JSON-like tree, substituting `<ref>` tokens found in
/// strings. If an entire string equals a single `<ref>` token, the tree cell
/// is replaced by the typed resolved value (objects/arrays/numbers survive
/// intact); otherwise each token is stringified and spliced into the
/// surrounding text. Substitution is single-pass: a resolved value that
/// itself contains `<...>` is not re-expanded.
pub fn resolve_placeholders(tree: &Value, context: &FxHashMap<String, Value>) -> Value {
    match tree {
        Value::String(s) => resolve_string(s, context),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_placeholders(v, context)).collect())
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_placeholders(v, context));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn resolve_string(s: &str, context: &FxHashMap<String, Value>) -> Value {
    if let Some(caps) = PLACEHOLDER.captures(s) {
        let whole_match = caps.get(0).unwrap();
        if whole_match.start() == 0 && whole_match.end() == s.len() {
            let reference = caps.get(1).unwrap().as_str();
            return resolve_ref(context, reference);
        }
    }

    let replaced = PLACEHOLDER.replace_all(s, |caps: &regex::Captures| {
        let reference = &caps[1];
        stringify(&resolve_ref(context, reference))
    });
    Value::String(replaced.into_owned())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
        other => other.to_string(),
    }
}

/// `true` when every value in `resolved` is `Value::Null` — the llm handler's
/// upstream-data-loss guard.
pub fn all_null<'a>(resolved: impl IntoIterator<Item = &'a Value>) -> bool {
    resolved.into_iter().all(|v| v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> FxHashMap<String, Value> {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn resolves_bare_key() {
        let c = ctx(&[("stats", json!({"word_count": 2}))]);
        assert_eq!(resolve_ref(&c, "stats"), json!({"word_count": 2}));
    }

    #[test]
    fn resolves_dotted_path() {
        let c = ctx(&[("stats", json!({"word_count": 2}))]);
        assert_eq!(resolve_ref(&c, "stats.word_count"), json!(2));
    }

    #[test]
    fn missing_dotted_path_is_null() {
        let c = ctx(&[("stats", json!({"word_count": 2}))]);
        assert_eq!(resolve_ref(&c, "stats.missing"), Value::Null);
        assert_eq!(resolve_ref(&c, "nope.missing"), Value::Null);
    }

    #[test]
    fn resolves_item_and_quoted_literal() {
        let c = ctx(&[("item", json!("hello"))]);
        assert_eq!(resolve_ref(&c, "item"), json!("hello"));
        assert_eq!(resolve_ref(&c, "'literal'"), json!("literal"));
    }

    #[test]
    fn whole_string_placeholder_preserves_type() {
        let c = ctx(&[("stats", json!({"word_count": 2}))]);
        let tree = json!("<stats>");
        assert_eq!(resolve_placeholders(&tree, &c), json!({"word_count": 2}));
    }

    #[test]
    fn embedded_placeholder_is_stringified() {
        let c = ctx(&[("name", json!("world"))]);
        let tree = json!("hello <name>!");
        assert_eq!(resolve_placeholders(&tree, &c), json!("hello world!"));
    }

    #[test]
    fn single_pass_does_not_reexpand() {
        let c = ctx(&[("a", json!("<b>")), ("b", json!("resolved"))]);
        let tree = json!("<a>");
        assert_eq!(resolve_placeholders(&tree, &c), json!("<b>"));
    }

    #[test]
    fn all_null_detects_total_data_loss() {
        assert!(all_null([&Value::Null, &Value::Null]));
        assert!(!all_null([&Value::Null, &json!(1)]));
    }
}
