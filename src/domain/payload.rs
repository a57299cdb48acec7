// Fail-closed field access over raw JSON payloads
use serde_json::Value;

/// Read-only view over a JSON object where every accessor has a neutral
/// default. A missing or mistyped field never fails the caller.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    value: &'a Value,
}

static NULL: Value = Value::Null;

impl<'a> Fields<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn get(&self, key: &str) -> &'a Value {
        self.value.get(key).unwrap_or(&NULL)
    }

    pub fn nested(&self, key: &str) -> Fields<'a> {
        Fields::new(self.get(key))
    }

    /// Numbers and numeric strings are accepted. Booleans are not numbers.
    pub fn number(&self, key: &str) -> Option<f64> {
        as_number(self.get(key))
    }

    pub fn number_or_zero(&self, key: &str) -> f64 {
        self.number(key).unwrap_or(0.0)
    }

    pub fn count(&self, key: &str) -> u64 {
        self.number(key)
            .filter(|n| *n > 0.0)
            .map(|n| n as u64)
            .unwrap_or(0)
    }

    pub fn text(&self, key: &str) -> Option<&'a str> {
        self.get(key).as_str().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or(default).to_string()
    }

    pub fn array(&self, key: &str) -> &'a [Value] {
        self.get(key).as_array().map(Vec::as_slice).unwrap_or(&[])
    }

    /// First element when the field is an array, the value itself when it is a number.
    pub fn first_number(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Value::Array(items) => items.first().and_then(as_number),
            other => as_number(other),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
