//! RPA Engine - JSON-described browser automation flows
//!
//! A flow is a set of named steps. Each step runs an ordered list of actions
//! against a headless browser and a shared variable context, then follows
//! its transitions into further steps:
//!
//! - **Actions** navigate, click, read and write DOM properties, extract
//!   tables, solve image captchas and persist the context
//! - **Transitions** compare context variables to decide which steps run next
//! - **Pages** are opened by name and one of them is current at a time
//!
//! ## Example
//!
//! ```rust,ignore
//! use rpa_engine::{EngineConfig, FlowDefinition, FlowEngine};
//!
//! let flow = FlowDefinition::from_json(&std::fs::read_to_string("flow.json")?)?;
//! let engine = FlowEngine::new(EngineConfig::default());
//! let result = engine.run(&flow, serde_json::json!({ "user": "demo" })).await?;
//! println!("{}", result.output);
//! ```

pub mod config;
pub mod error;
pub mod flow;

// Re-exports
pub use config::{EngineConfig, TransitionMode, UnknownActionPolicy};
pub use error::{FlowEngineError, FlowResult};
pub use flow::actions::{ActionHandler, ActionRegistry};
pub use flow::browser::{
    BrowserDriver, BrowserLauncher, BrowserOptions, ChromiumBrowser, ChromiumLauncher, ProxyConfig,
};
pub use flow::captcha::{CaptchaRecognizer, RecaptchaSolver, TesseractRecognizer};
pub use flow::context::{Context, PathLookup};
pub use flow::engine::{FlowEngine, STATUS_OK};
pub use flow::executor::Run;
pub use flow::model::{Action, ActionKind, FlowDefinition, FlowOutput, Operator, Step, StepId, Transition};
pub use flow::page::{ChromiumPage, PageDriver};
pub use flow::session::{BrowserSession, PageId};
pub use flow::table::extract as extract_table;
