//! Flow Data Models
//!
//! The JSON-described automation program: steps keyed by id, each holding an
//! ordered list of actions followed by an ordered list of transitions.

use crate::error::{FlowEngineError, FlowResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a step inside a flow
pub type StepId = String;

/// A complete flow: the entry step, browser mode and every step by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Step executed first
    pub init: StepId,
    /// Launch the browser without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// All steps keyed by id
    #[serde(default)]
    pub steps: HashMap<StepId, Step>,
}

fn default_headless() -> bool {
    true
}

impl FlowDefinition {
    /// Parse a flow from its JSON source, naming unnamed steps after their id
    pub fn from_json(source: &str) -> FlowResult<Self> {
        let mut flow: FlowDefinition = serde_json::from_str(source)?;
        for (id, step) in flow.steps.iter_mut() {
            if step.name.is_empty() {
                step.name = id.clone();
            }
        }
        Ok(flow)
    }

    /// Look up a step, failing with `InvalidStepReference` when absent
    pub fn step(&self, id: &str, origin: &str) -> FlowResult<&Step> {
        self.steps
            .get(id)
            .ok_or_else(|| FlowEngineError::InvalidStepReference {
                target: id.to_string(),
                origin: origin.to_string(),
            })
    }

    /// Check that `init` and every step reference (transition targets and
    /// redirect parameters of actions) point at existing steps.
    pub fn validate(&self) -> FlowResult<()> {
        self.step(&self.init, "init")?;

        for (id, step) in &self.steps {
            for (i, transition) in step.transitions.iter().enumerate() {
                self.step(
                    transition.target(),
                    &format!("transition #{} of step '{}'", i + 1, id),
                )?;
            }
            for (i, action) in step.actions.iter().enumerate() {
                if let Some(target) = action.redirect_target() {
                    self.step(
                        target,
                        &format!("action #{} ({}) of step '{}'", i + 1, action.kind, id),
                    )?;
                }
            }
        }

        Ok(())
    }
}

/// A named unit of actions plus outgoing transitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// Closed vocabulary of action kinds.
///
/// Names that are not part of the vocabulary decode to `Unknown` so the
/// dispatcher decides what to do with them instead of the parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    OpenPage,
    Goto,
    WaitForSelector,
    SetValue,
    GetValue,
    GetTableValues,
    GetCaptcha,
    GetScreenShot,
    Click,
    WaitForTimeout,
    WaitWhile,
    AvoidAlert,
    SaveContext,
    SolveReCaptcha,
    Function,
    Rest,
    Unknown(String),
}

impl ActionKind {
    /// Every kind with a built-in meaning
    pub const BUILTIN: [ActionKind; 16] = [
        ActionKind::OpenPage,
        ActionKind::Goto,
        ActionKind::WaitForSelector,
        ActionKind::SetValue,
        ActionKind::GetValue,
        ActionKind::GetTableValues,
        ActionKind::GetCaptcha,
        ActionKind::GetScreenShot,
        ActionKind::Click,
        ActionKind::WaitForTimeout,
        ActionKind::WaitWhile,
        ActionKind::AvoidAlert,
        ActionKind::SaveContext,
        ActionKind::SolveReCaptcha,
        ActionKind::Function,
        ActionKind::Rest,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::OpenPage => "openPage",
            ActionKind::Goto => "goto",
            ActionKind::WaitForSelector => "waitForSelector",
            ActionKind::SetValue => "setValue",
            ActionKind::GetValue => "getValue",
            ActionKind::GetTableValues => "getTableValues",
            ActionKind::GetCaptcha => "getCaptcha",
            ActionKind::GetScreenShot => "getScreenShot",
            ActionKind::Click => "click",
            ActionKind::WaitForTimeout => "waitForTimeout",
            ActionKind::WaitWhile => "waitWhile",
            ActionKind::AvoidAlert => "avoidAlert",
            ActionKind::SaveContext => "saveContext",
            ActionKind::SolveReCaptcha => "solveReCaptcha",
            ActionKind::Function => "function",
            ActionKind::Rest => "rest",
            ActionKind::Unknown(name) => name,
        }
    }
}

impl From<String> for ActionKind {
    fn from(name: String) -> Self {
        ActionKind::BUILTIN
            .iter()
            .find(|kind| kind.as_str() == name)
            .cloned()
            .unwrap_or(ActionKind::Unknown(name))
    }
}

impl From<&str> for ActionKind {
    fn from(name: &str) -> Self {
        ActionKind::from(name.to_string())
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One browser or context operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type", alias = "kind")]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Action {
    pub fn new(kind: impl Into<ActionKind>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    /// Builder-style parameter setter
    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name).filter(|v| !v.is_null())
    }

    /// Required string parameter. Numbers and booleans are accepted in their
    /// textual form.
    pub fn str_param(&self, name: &str) -> FlowResult<String> {
        self.opt_str_param(name)
            .ok_or_else(|| FlowEngineError::MissingParam {
                action: self.kind.to_string(),
                param: name.to_string(),
            })
    }

    pub fn opt_str_param(&self, name: &str) -> Option<String> {
        match self.param(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Unsigned integer parameter with a default; numeric strings are accepted
    pub fn u64_param_or(&self, name: &str, default: u64) -> FlowResult<u64> {
        match self.param(name) {
            None => Ok(default),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| self.invalid(name, "expected a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| self.invalid(name, &e.to_string())),
            Some(_) => Err(self.invalid(name, "expected a number")),
        }
    }

    /// Step this action may redirect to (`waitForSelector`, `getCaptcha`)
    pub fn redirect_target(&self) -> Option<&str> {
        match self.kind {
            ActionKind::WaitForSelector | ActionKind::GetCaptcha => {
                self.param("transition").and_then(Value::as_str)
            }
            _ => None,
        }
    }

    fn invalid(&self, name: &str, reason: &str) -> FlowEngineError {
        FlowEngineError::InvalidParam {
            action: self.kind.to_string(),
            param: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Comparison used by `if` transitions and `waitWhile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Eq,
    Ne,
    Unsupported(String),
}

impl From<String> for Operator {
    fn from(op: String) -> Self {
        match op.as_str() {
            "=" => Operator::Eq,
            "!=" => Operator::Ne,
            _ => Operator::Unsupported(op),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Eq => "=".to_string(),
            Operator::Ne => "!=".to_string(),
            Operator::Unsupported(op) => op,
        }
    }
}

/// Rule selecting the next step after a step's actions complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transition {
    /// Unconditional
    To { target: StepId },
    /// Compare a variable against a literal `value` or another variable
    If {
        target: StepId,
        #[serde(default)]
        operator: Option<Operator>,
        variable: String,
        /// An explicit `null` is a literal, unlike an absent key
        #[serde(
            default,
            deserialize_with = "present_value",
            skip_serializing_if = "Option::is_none"
        )]
        value: Option<Value>,
        #[serde(default)]
        variable2: Option<String>,
    },
    /// Reserved extension point
    Function {
        target: StepId,
        #[serde(default)]
        name: Option<String>,
    },
}

fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Transition {
    pub fn target(&self) -> &str {
        match self {
            Transition::To { target }
            | Transition::If { target, .. }
            | Transition::Function { target, .. } => target,
        }
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOutput {
    pub status: u16,
    /// Context the run was started with
    pub input: Value,
    /// Context snapshot at run end
    pub output: Value,
}
