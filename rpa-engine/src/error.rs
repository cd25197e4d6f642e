//! RPA Engine Error Types

use thiserror::Error;

/// Main error type for the RPA engine
#[derive(Debug, Error)]
pub enum FlowEngineError {
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Page navigation failed: {0}")]
    Navigation(String),

    #[error("Navigation did not settle: {0}")]
    NavigationFailure(String),

    #[error("Timed out after {timeout_ms}ms waiting for selector: {selector}")]
    SelectorTimeout { selector: String, timeout_ms: u64 },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Page not found: {name}")]
    PageNotFound { name: String },

    #[error("No active page; an openPage action must run first")]
    NoActivePage,

    #[error("Step '{target}' referenced by {origin} does not exist")]
    InvalidStepReference { target: String, origin: String },

    #[error("Action '{action}' is missing required parameter '{param}'")]
    MissingParam { action: String, param: String },

    #[error("Action '{action}' has invalid parameter '{param}': {reason}")]
    InvalidParam {
        action: String,
        param: String,
        reason: String,
    },

    #[error("Unsupported action kind: {0}")]
    UnsupportedAction(String),

    #[error("Captcha recognition failed: {0}")]
    Captcha(String),

    #[error("Captcha unresolved after {attempts} attempt(s): got {got} of {required} characters")]
    CaptchaUnresolved {
        attempts: u32,
        got: usize,
        required: usize,
    },

    #[error("No reCAPTCHA solver configured")]
    RecaptchaUnavailable,

    #[error("Step recursion exceeded depth {0}")]
    RecursionLimit(usize),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FlowEngineError {
    fn from(err: serde_json::Error) -> Self {
        FlowEngineError::Serialization(err.to_string())
    }
}

/// Result type alias for RPA engine operations
pub type FlowResult<T> = Result<T, FlowEngineError>;
