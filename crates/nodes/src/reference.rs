//! `${steps.<name>.<path>}` references into the run context.
//!
//! The grammar is tiny: a value that is *exactly* such a
//! string is a reference; anything else is a literal. `<path>` is a dotted
//! walk through the referenced step's `result` (object keys, or array
//! indices for numeric segments).

use serde_json::{Map, Value};

use crate::ExecutionContext;

const OPEN: &str = "${";
const CLOSE: &str = "}";
const ROOT: &str = "steps";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub step: &'a str,
    pub path: Vec<&'a str>,
}

impl<'a> Reference<'a> {
    /// `None` when `text` is not a well-formed reference.
    pub fn parse(text: &'a str) -> Option<Self> {
        let inner = text.strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
        let mut segments = inner.split('.');
        if segments.next()? != ROOT {
            return None;
        }
        let step = segments.next()?;
        let path: Vec<&str> = segments.collect();
        if step.is_empty() || path.is_empty() || path.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self { step, path })
    }

    /// Look the reference up; `None` when the step or property is missing.
    pub fn resolve(&self, ctx: &ExecutionContext) -> Option<Value> {
        let mut current = ctx.step(self.step)?.result.as_ref()?;
        for segment in &self.path {
            current = match current {
                Value::Object(map) => map.get(*segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

/// Resolve a property value. References are substituted, literals pass
/// through, and objects/arrays are resolved member by member with
/// unresolved members dropped. `None` means "omit this value".
pub fn resolve_value(value: &Value, ctx: &ExecutionContext) -> Option<Value> {
    match value {
        Value::String(text) => match Reference::parse(text) {
            Some(reference) => reference.resolve(ctx),
            None => Some(value.clone()),
        },
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .filter_map(|(k, v)| resolve_value(v, ctx).map(|v| (k.clone(), v)))
                .collect::<Map<String, Value>>(),
        )),
        Value::Array(items) => Some(Value::Array(
            items.iter().filter_map(|v| resolve_value(v, ctx)).collect(),
        )),
        other => Some(other.clone()),
    }
}
