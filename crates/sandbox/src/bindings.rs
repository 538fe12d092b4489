//! Named constants injected ahead of user code.
//!
//! Each binding becomes one `const <name> = <value>;` line of the prelude.
//! JSON values are written as JSON literals; functions are written as their
//! source text so they stay callable inside the isolate.

use serde_json::Value;

use crate::SandboxError;

/// Source of the identity completion marker available to every script.
pub const DONE_SOURCE: &str = "(result) => result";

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield", "await",
];

/// A single injected value.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Structurally serialized value.
    Json(Value),
    /// JavaScript function source, injected verbatim.
    Function(String),
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Json(value)
    }
}

/// Insertion-ordered set of bindings. Re-binding a name replaces it in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<(String, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings with the `done` marker already present.
    pub fn with_done() -> Self {
        let mut bindings = Self::new();
        bindings.insert("done", Binding::Function(DONE_SOURCE.to_owned()));
        bindings
    }

    pub fn insert(&mut self, name: impl Into<String>, binding: impl Into<Binding>) -> &mut Self {
        let name = name.into();
        let binding = binding.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = binding,
            None => self.entries.push((name, binding)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, b)| b)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the prelude. Fails on the first name that is not a plain
    /// identifier.
    pub fn prelude(&self) -> Result<String, SandboxError> {
        let mut out = String::new();
        for (name, binding) in &self.entries {
            if !is_identifier(name) {
                return Err(SandboxError::InvalidBinding(name.clone()));
            }
            let rendered = match binding {
                Binding::Json(value) => serde_json::to_string(value)
                    .map_err(|e| SandboxError::Runtime(e.to_string()))?,
                Binding::Function(source) => source.clone(),
            };
            out.push_str("const ");
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(&rendered);
            out.push_str(";\n");
        }
        Ok(out)
    }

    /// Prelude followed by `code`.
    pub fn wrap(&self, code: &str) -> Result<String, SandboxError> {
        let mut source = self.prelude()?;
        source.push_str(code);
        Ok(source)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$');
    head_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prelude_renders_json_and_functions_in_order() {
        let mut bindings = Bindings::with_done();
        bindings.insert("input", json!({ "a": 1 }));
        bindings.insert("label", json!("x\"y"));

        let prelude = bindings.prelude().unwrap();
        assert_eq!(
            prelude,
            "const done = (result) => result;\n\
             const input = {\"a\":1};\n\
             const label = \"x\\\"y\";\n"
        );
    }

    #[test]
    fn rebinding_replaces_in_place() {
        let mut bindings = Bindings::new();
        bindings.insert("a", json!(1)).insert("b", json!(2)).insert("a", json!(3));
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings.get("a"), Some(&Binding::Json(json!(3))));
        assert!(bindings.prelude().unwrap().starts_with("const a = 3;"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        for bad in ["1abc", "a-b", "", "return", "a b"] {
            let mut bindings = Bindings::new();
            bindings.insert(bad, json!(null));
            assert_eq!(
                bindings.prelude(),
                Err(SandboxError::InvalidBinding(bad.to_owned())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn dollar_and_underscore_names_are_accepted() {
        let mut bindings = Bindings::new();
        bindings.insert("$ctx", json!(1)).insert("_private", json!(2));
        assert!(bindings.wrap("$ctx + _private").unwrap().ends_with("$ctx + _private"));
    }
}
