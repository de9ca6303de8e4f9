use crate::state::Record;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A registered client-side computed attribute, usable both as a derived
/// value and as a filter predicate input.
pub type ComputeFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

pub type Functions = BTreeMap<String, ComputeFn>;

/// Tri-state a filter token may coerce to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolToken {
    True,
    False,
    Null,
}

/// Coerces the conventional boolean tokens: `true/"true"/1/"1"/"t"/"y"`,
/// `false/"false"/0/"0"/"f"/"n"` and `null/"null"`. Anything else is not a
/// boolean token.
pub fn as_bool_token(value: &Value) -> Option<BoolToken> {
    match value {
        Value::Bool(true) => Some(BoolToken::True),
        Value::Bool(false) => Some(BoolToken::False),
        Value::Null => Some(BoolToken::Null),
        Value::String(s) => match s.as_str() {
            "true" | "1" | "t" | "y" => Some(BoolToken::True),
            "false" | "0" | "f" | "n" => Some(BoolToken::False),
            "null" => Some(BoolToken::Null),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(BoolToken::True),
            Some(0) => Some(BoolToken::False),
            _ => None,
        },
        _ => None,
    }
}

pub fn is_potential_boolean(value: &Value) -> bool {
    as_bool_token(value).is_some()
}

fn raw_bool_token(value: &Value) -> Option<BoolToken> {
    match value {
        Value::Bool(true) => Some(BoolToken::True),
        Value::Bool(false) => Some(BoolToken::False),
        Value::Null => Some(BoolToken::Null),
        _ => None,
    }
}

/// A filter attribute is "custom" (predicate-matched rather than index
/// equality) when it names a registered function, or its comparison value is
/// array-valued or a potential boolean token.
pub fn is_custom(functions: &Functions, attr: &str, comp: &Value) -> bool {
    functions.contains_key(attr) || comp.is_array() || is_potential_boolean(comp)
}

/// Predicate match for custom filters: boolean-valued fields compare against
/// the coerced token, numeric fields under numeric coercion, array-valued
/// fields if any element matches, everything else by strict equality.
pub fn check_value(value: &Value, comp: &Value) -> bool {
    if let Some(raw) = raw_bool_token(value) {
        return as_bool_token(comp) == Some(raw);
    }
    if let Value::Number(n) = value {
        return number_eq(n, comp);
    }
    if let Value::Array(items) = value {
        return items.iter().any(|v| check_value(v, comp));
    }
    value == comp
}

fn number_eq(n: &serde_json::Number, comp: &Value) -> bool {
    let Some(value) = n.as_f64() else {
        return false;
    };
    let coerced = match comp {
        Value::Number(m) => m.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    coerced.is_some_and(|c| value == c)
}

/// Whether `record` satisfies one filter condition. The attribute resolves
/// through a registered function when one exists; a record lacking the
/// attribute never matches. An array-valued comparison matches if any of its
/// elements does.
pub fn matches(functions: &Functions, record: &Record, attr: &str, comp: &Value) -> bool {
    let computed;
    let value = if let Some(f) = functions.get(attr) {
        computed = f(record);
        &computed
    } else {
        match record.get(attr) {
            Some(v) => v,
            None => return false,
        }
    };
    if let Value::Array(comps) = comp {
        comps.iter().any(|c| check_value(value, c))
    } else {
        check_value(value, comp)
    }
}
