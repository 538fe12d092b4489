//! Core domain models for formulas.
//!
//! These types are the source of truth for what a formula looks like in
//! memory, and (de)serialize to the camelCase JSON shape the HTTP front
//! end accepts.

use std::fmt;

use nodes::StepKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Entry point of a formula. Exactly one trigger must be active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    /// Names of candidate first steps.
    #[serde(default)]
    pub on_success: Vec<String>,
}

impl Trigger {
    pub fn active(name: impl Into<String>, first_steps: &[&str]) -> Self {
        Self {
            name: name.into(),
            active: true,
            on_success: first_steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn inactive(name: impl Into<String>, first_steps: &[&str]) -> Self {
        Self {
            active: false,
            ..Self::active(name, first_steps)
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Caller-supplied step id; informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepId {
    Number(i64),
    Text(String),
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::Number(n) => write!(f, "{n}"),
            StepId::Text(s) => f.write_str(s),
        }
    }
}

/// A single node of the step graph, keyed by `name`.
///
/// Only the first entry of `on_success` / `on_failure` is ever followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct Step {
    pub id: Option<StepId>,
    pub name: String,
    pub kind: StepKind,
    pub on_success: Vec<String>,
    pub on_failure: Vec<String>,
}

impl Step {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            on_success: Vec::new(),
            on_failure: Vec::new(),
        }
    }

    pub fn on_success(mut self, next: &str) -> Self {
        self.on_success.push(next.to_owned());
        self
    }

    pub fn on_failure(mut self, next: &str) -> Self {
        self.on_failure.push(next.to_owned());
        self
    }

    /// Name of the step to run after this one, if any.
    pub fn next_name(&self, succeeded: bool) -> Option<&str> {
        let edges = if succeeded { &self.on_success } else { &self.on_failure };
        edges.first().map(String::as_str)
    }
}

/// Wire shape of a step: a `type` tag plus untyped `properties`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<StepId>,
    name: String,
    #[serde(rename = "type")]
    step_type: String,
    #[serde(default)]
    properties: Value,
    #[serde(default)]
    on_success: Vec<String>,
    #[serde(default)]
    on_failure: Vec<String>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let kind = StepKind::from_parts(&raw.step_type, raw.properties)
            .map_err(|e| format!("step '{}' has invalid properties: {e}", raw.name))?;
        Ok(Self {
            id: raw.id,
            name: raw.name,
            kind,
            on_success: raw.on_success,
            on_failure: raw.on_failure,
        })
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        Self {
            id: step.id,
            step_type: step.kind.type_name().to_owned(),
            properties: step.kind.properties(),
            name: step.name,
            on_success: step.on_success,
            on_failure: step.on_failure,
        }
    }
}

// ---------------------------------------------------------------------------
// Formula
// ---------------------------------------------------------------------------

/// A complete formula: trigger set, step graph, and the run's input payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub triggers: Vec<Trigger>,
    pub steps: Vec<Step>,
    /// Exposed to script steps as the `input` binding.
    #[serde(default)]
    pub input: Value,
}

impl Formula {
    /// Convenience constructor for testing.
    pub fn new(triggers: Vec<Trigger>, steps: Vec<Step>) -> Self {
        Self {
            triggers,
            steps,
            input: Value::Null,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formula_parses_from_wire_json() {
        let formula: Formula = serde_json::from_value(json!({
            "triggers": [{ "name": "manual", "active": true, "onSuccess": ["fetch"] }],
            "steps": [
                {
                    "id": 1,
                    "name": "fetch",
                    "type": "httpRequest",
                    "properties": { "url": "http://api/x", "method": "GET" },
                    "onSuccess": ["shape"],
                    "onFailure": ["cleanup"]
                },
                { "id": "two", "name": "shape", "type": "script", "properties": { "body": "1" } },
                { "name": "cleanup", "type": "note" }
            ]
        }))
        .unwrap();

        assert_eq!(formula.triggers[0], Trigger::active("manual", &["fetch"]));
        assert_eq!(formula.steps[0].id, Some(StepId::Number(1)));
        assert_eq!(formula.steps[1].id.as_ref().map(ToString::to_string), Some("two".into()));
        assert!(matches!(formula.steps[0].kind, StepKind::HttpRequest(_)));
        assert!(matches!(formula.steps[1].kind, StepKind::Script(_)));
        assert!(matches!(formula.steps[2].kind, StepKind::NoOp { .. }));
        assert_eq!(formula.steps[0].next_name(true), Some("shape"));
        assert_eq!(formula.steps[0].next_name(false), Some("cleanup"));
        assert_eq!(formula.steps[1].next_name(true), None);
        assert_eq!(formula.input, Value::Null);
    }

    #[test]
    fn malformed_step_properties_are_rejected() {
        let err = serde_json::from_value::<Formula>(json!({
            "triggers": [],
            "steps": [{ "name": "broken", "type": "script", "properties": {} }]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("step 'broken'"));
    }

    #[test]
    fn steps_serialize_back_to_wire_shape() {
        let step = Step::new("s", StepKind::from_parts("script", json!({ "body": "1" })).unwrap())
            .on_success("t");
        assert_eq!(
            serde_json::to_value(&step).unwrap(),
            json!({
                "name": "s",
                "type": "script",
                "properties": { "body": "1" },
                "onSuccess": ["t"],
                "onFailure": []
            })
        );
    }
}
