//! The closed set of step kinds and their typed properties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HTTP_REQUEST: &str = "httpRequest";
pub const SCRIPT: &str = "script";

/// Properties of an `httpRequest` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestProps {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Literal JSON or `${steps.X.Y}` references, resolved at run time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// An object of query parameters, or a single value (often a
    /// reference) used as the raw query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_owned()
}

/// Properties of a `script` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptProps {
    /// JavaScript source; its completion value is the step result.
    pub body: String,
}

/// What a step does.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    HttpRequest(HttpRequestProps),
    Script(ScriptProps),
    /// Any other `type`: succeeds without doing anything.
    NoOp { step_type: String, properties: Value },
}

impl StepKind {
    /// Build a kind from the wire `type` tag and raw `properties`.
    pub fn from_parts(step_type: &str, properties: Value) -> Result<Self, serde_json::Error> {
        Ok(match step_type {
            HTTP_REQUEST => StepKind::HttpRequest(serde_json::from_value(properties)?),
            SCRIPT => StepKind::Script(serde_json::from_value(properties)?),
            other => StepKind::NoOp {
                step_type: other.to_owned(),
                properties,
            },
        })
    }

    pub fn type_name(&self) -> &str {
        match self {
            StepKind::HttpRequest(_) => HTTP_REQUEST,
            StepKind::Script(_) => SCRIPT,
            StepKind::NoOp { step_type, .. } => step_type,
        }
    }

    /// Raw `properties` for serialization back to the wire shape.
    pub fn properties(&self) -> Value {
        match self {
            StepKind::HttpRequest(props) => serde_json::to_value(props).unwrap_or(Value::Null),
            StepKind::Script(props) => serde_json::to_value(props).unwrap_or(Value::Null),
            StepKind::NoOp { properties, .. } => properties.clone(),
        }
    }
}
