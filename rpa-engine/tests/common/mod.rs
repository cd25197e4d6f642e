//! In-memory browser used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use rpa_engine::{
    Action, ActionHandler, ActionRegistry, BrowserDriver, BrowserLauncher, BrowserOptions,
    EngineConfig, FlowDefinition, FlowEngine, FlowEngineError, FlowResult, PageDriver, Run,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct BrowserState {
    /// Every driver call, in order ("goto:https://...", "click:#a", ...)
    pub calls: Vec<String>,
    /// Selectors present on every page
    pub present: HashSet<String>,
    /// DOM properties keyed by (selector, property)
    pub properties: HashMap<(String, String), Value>,
    pub navigation_fails: bool,
    pub launches: usize,
    pub closes: usize,
    pub pages_opened: usize,
    pub last_options: Option<BrowserOptions>,
}

#[derive(Clone, Default)]
pub struct MockBrowser {
    pub state: Arc<Mutex<BrowserState>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, selector: &str) -> Self {
        self.state.lock().unwrap().present.insert(selector.to_string());
        self
    }

    pub fn with_property(self, selector: &str, property: &str, value: Value) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.present.insert(selector.to_string());
            state
                .properties
                .insert((selector.to_string(), property.to_string()), value);
        }
        self
    }

    pub fn failing_navigation(self) -> Self {
        self.state.lock().unwrap().navigation_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().launches
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn pages_opened(&self) -> usize {
        self.state.lock().unwrap().pages_opened
    }

    pub fn property(&self, selector: &str, property: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .properties
            .get(&(selector.to_string(), property.to_string()))
            .cloned()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn has(&self, selector: &str) -> bool {
        self.state.lock().unwrap().present.contains(selector)
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    async fn launch(&self, options: &BrowserOptions) -> FlowResult<Box<dyn BrowserDriver>> {
        {
            let mut state = self.state.lock().unwrap();
            state.launches += 1;
            state.last_options = Some(options.clone());
        }
        Ok(Box::new(MockProcess {
            browser: self.clone(),
            open: true,
        }))
    }
}

struct MockProcess {
    browser: MockBrowser,
    open: bool,
}

#[async_trait]
impl BrowserDriver for MockProcess {
    async fn new_page(&self) -> FlowResult<Box<dyn PageDriver>> {
        let id = {
            let mut state = self.browser.state.lock().unwrap();
            state.pages_opened += 1;
            state.pages_opened
        };
        Ok(Box::new(MockPage {
            browser: self.browser.clone(),
            id,
        }))
    }

    async fn close(&mut self) -> FlowResult<()> {
        if self.open {
            self.open = false;
            self.browser.state.lock().unwrap().closes += 1;
        }
        Ok(())
    }
}

pub struct MockPage {
    browser: MockBrowser,
    id: usize,
}

#[async_trait]
impl PageDriver for MockPage {
    async fn set_user_agent(&self, user_agent: &str) -> FlowResult<()> {
        self.browser.record(format!("ua:{}", user_agent));
        Ok(())
    }

    async fn goto(&self, url: &str) -> FlowResult<()> {
        self.browser.record(format!("goto:{}:page{}", url, self.id));
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> FlowResult<Value> {
        Ok(Value::Null)
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> FlowResult<()> {
        if self.browser.has(selector) {
            Ok(())
        } else {
            Err(FlowEngineError::SelectorTimeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn click(&self, selector: &str) -> FlowResult<()> {
        if !self.browser.has(selector) {
            return Err(FlowEngineError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        self.browser.record(format!("click:{}", selector));
        Ok(())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> FlowResult<()> {
        if self.browser.state.lock().unwrap().navigation_fails {
            Err(FlowEngineError::NavigationFailure("no navigation".to_string()))
        } else {
            Ok(())
        }
    }

    async fn screenshot(&self) -> FlowResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn handle_next_dialog(&self, accept: bool) -> FlowResult<()> {
        self.browser
            .record(format!("dialog:{}", if accept { "accept" } else { "dismiss" }));
        Ok(())
    }

    async fn get_property(&self, selector: &str, property: &str) -> FlowResult<Value> {
        if !self.browser.has(selector) {
            return Err(FlowEngineError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(self.browser.property(selector, property).unwrap_or(Value::Null))
    }

    async fn set_property(&self, selector: &str, property: &str, value: &Value) -> FlowResult<()> {
        if !self.browser.has(selector) {
            return Err(FlowEngineError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        self.browser.record(format!("set:{}.{}={}", selector, property, value));
        self.browser
            .state
            .lock()
            .unwrap()
            .properties
            .insert((selector.to_string(), property.to_string()), value.clone());
        Ok(())
    }
}

/// Appends `params.name` to the `trail` array in the context
pub struct Mark;

#[async_trait]
impl ActionHandler for Mark {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let name = action.str_param("name")?;
        let mut trail = match run.context().get("trail") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        trail.push(json!(name));
        run.context().set("trail", Value::Array(trail));
        Ok(())
    }
}

/// Copies `params.from` into `params.to` at the moment the action runs
pub struct CopyVar;

#[async_trait]
impl ActionHandler for CopyVar {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let from = action.str_param("from")?;
        let to = action.str_param("to")?;
        let value = run.context().get(&from).unwrap_or(Value::Null);
        run.context().set(to, value);
        Ok(())
    }
}

pub fn test_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::with_builtins();
    registry.register("mark", Arc::new(Mark));
    registry.register("copy", Arc::new(CopyVar));
    registry
}

pub fn engine(browser: &MockBrowser, config: EngineConfig) -> FlowEngine {
    FlowEngine::new(config)
        .with_launcher(Arc::new(browser.clone()))
        .with_registry(test_registry())
}

pub fn flow(value: Value) -> FlowDefinition {
    FlowDefinition::from_json(&value.to_string()).expect("valid flow")
}

pub fn trail(output: &Value) -> Vec<String> {
    output["trail"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
