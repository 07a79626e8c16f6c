//! Coercion of synthesized answers to the requested format hint.
//!
//! Models tend to answer `"42"` when asked for an int or wrap JSON in a
//! string. Coercion fixes the obvious cases and otherwise returns the value
//! untouched.

use serde_json::{Number, Value};

use crate::models::FormatHint;

pub fn coerce_answer(raw: Value, hint: &FormatHint) -> Value {
    let hint = hint.as_str().trim().to_lowercase();
    match hint.as_str() {
        "int" | "integer" => to_int(&raw).unwrap_or(raw),
        "float" | "number" => to_float(&raw).unwrap_or(raw),
        "str" | "string" | "text" => match raw {
            Value::String(_) => raw,
            Value::Null => Value::Null,
            other => Value::String(other.to_string()),
        },
        h if is_structured(h) => parse_embedded_json(&raw).unwrap_or(raw),
        _ => raw,
    }
}

fn is_structured(hint: &str) -> bool {
    hint == "json"
        || hint.starts_with('{')
        || hint.starts_with('[')
        || hint.starts_with("list")
        || hint.starts_with("dict")
}

fn to_int(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(raw.clone()),
        Value::Number(n) => n.as_f64().map(|f| Value::from(f.round() as i64)),
        Value::String(s) => {
            let cleaned = clean_numeric(s);
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| cleaned.parse::<f64>().ok().map(|f| f.round() as i64))
                .map(Value::from)
        }
        _ => None,
    }
}

fn to_float(raw: &Value) -> Option<Value> {
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => clean_numeric(s).parse::<f64>().ok()?,
        _ => return None,
    };
    Number::from_f64(value).map(Value::Number)
}

/// Strip thousands separators, currency symbols and surrounding quotes.
fn clean_numeric(s: &str) -> String {
    s.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' ' | '%'))
        .collect()
}

fn parse_embedded_json(raw: &Value) -> Option<Value> {
    let Value::String(s) = raw else {
        return None;
    };
    let trimmed = s.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(unfenced).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hint(s: &str) -> FormatHint {
        FormatHint::new(s)
    }

    #[test]
    fn test_int_from_string_and_float() {
        assert_eq!(coerce_answer(json!("42"), &hint("int")), json!(42));
        assert_eq!(coerce_answer(json!("1,234"), &hint("int")), json!(1234));
        assert_eq!(coerce_answer(json!(14.0), &hint("int")), json!(14));
        assert_eq!(coerce_answer(json!(7), &hint("int")), json!(7));
    }

    #[test]
    fn test_float_from_string() {
        assert_eq!(coerce_answer(json!("$1,530.25"), &hint("float")), json!(1530.25));
        assert_eq!(coerce_answer(json!(3), &hint("float")), json!(3.0));
    }

    #[test]
    fn test_uncoercible_values_are_unchanged() {
        assert_eq!(
            coerce_answer(json!("no data"), &hint("int")),
            json!("no data")
        );
        assert_eq!(coerce_answer(json!(null), &hint("float")), json!(null));
    }

    #[test]
    fn test_structured_hints_parse_embedded_json() {
        let raw = json!("{\"category\": \"Beverages\", \"quantity\": 12}");
        assert_eq!(
            coerce_answer(raw, &hint("{category:str, quantity:int}")),
            json!({"category": "Beverages", "quantity": 12})
        );

        let fenced = json!("```json\n[{\"product\": \"Chai\"}]\n```");
        assert_eq!(
            coerce_answer(fenced, &hint("list[{product:str}]")),
            json!([{"product": "Chai"}])
        );
    }

    #[test]
    fn test_str_hint_stringifies() {
        assert_eq!(coerce_answer(json!(5), &hint("str")), json!("5"));
        assert_eq!(coerce_answer(json!("ok"), &hint("str")), json!("ok"));
    }
}
