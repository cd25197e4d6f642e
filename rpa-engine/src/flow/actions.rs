//! Action Dispatcher
//!
//! Every action kind is served by an [`ActionHandler`] looked up in an
//! [`ActionRegistry`]. The built-in vocabulary is registered by
//! [`ActionRegistry::with_builtins`]; hosts may replace handlers or attach one
//! to the reserved `function`/`rest` kinds.

use crate::error::{FlowEngineError, FlowResult};
use crate::flow::captcha::{self, CaptchaRequest};
use crate::flow::executor::Run;
use crate::flow::model::{Action, ActionKind, Operator};
use crate::flow::table;
use crate::flow::transition;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Executes one kind of action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()>;
}

/// Dispatch table keyed by action kind
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Registry with no handlers at all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(ActionKind::OpenPage, Arc::new(OpenPage));
        registry.register(ActionKind::Goto, Arc::new(Goto));
        registry.register(ActionKind::WaitForSelector, Arc::new(WaitForSelector));
        registry.register(ActionKind::SetValue, Arc::new(SetValue));
        registry.register(ActionKind::GetValue, Arc::new(GetValue));
        registry.register(ActionKind::GetTableValues, Arc::new(GetTableValues));
        registry.register(ActionKind::GetCaptcha, Arc::new(GetCaptcha));
        registry.register(ActionKind::GetScreenShot, Arc::new(GetScreenShot));
        registry.register(ActionKind::Click, Arc::new(Click));
        registry.register(ActionKind::WaitForTimeout, Arc::new(WaitForTimeout));
        registry.register(ActionKind::WaitWhile, Arc::new(WaitWhile));
        registry.register(ActionKind::AvoidAlert, Arc::new(AvoidAlert));
        registry.register(ActionKind::SaveContext, Arc::new(SaveContext));
        registry.register(ActionKind::SolveReCaptcha, Arc::new(SolveReCaptcha));
        registry.register(ActionKind::Function, Arc::new(Reserved));
        registry.register(ActionKind::Rest, Arc::new(Reserved));
        registry
    }

    /// Install `handler` for `kind`, returning the handler it replaces
    pub fn register(
        &mut self,
        kind: impl Into<ActionKind>,
        handler: Arc<dyn ActionHandler>,
    ) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.insert(kind.into(), handler)
    }

    pub fn get(&self, kind: &ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &ActionKind) -> bool {
        self.handlers.contains_key(kind)
    }
}

fn timeout_param(action: &Action, run: &Run) -> FlowResult<Duration> {
    action
        .u64_param_or("timeout", run.config().default_timeout_ms)
        .map(Duration::from_millis)
}

struct OpenPage;

#[async_trait]
impl ActionHandler for OpenPage {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let name = action.str_param("name")?;
        run.session_mut().open_page(&name).await?;
        Ok(())
    }
}

struct Goto;

#[async_trait]
impl ActionHandler for Goto {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let url = action.str_param("url")?;
        Url::parse(&url)
            .map_err(|e| FlowEngineError::Navigation(format!("Invalid URL '{}': {}", url, e)))?;

        let user_agent = run.config().random_user_agent().map(str::to_string);
        run.session().navigate(&url, user_agent.as_deref()).await
    }
}

struct WaitForSelector;

#[async_trait]
impl ActionHandler for WaitForSelector {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let waited = async {
            let selector = action.str_param("selector")?;
            let timeout = timeout_param(action, run)?;
            run.cancellable(run.session().wait_for_selector(&selector, timeout))
                .await
        }
        .await;

        match waited {
            Ok(()) => Ok(()),
            Err(FlowEngineError::Cancelled) => Err(FlowEngineError::Cancelled),
            Err(e) => {
                warn!("waitForSelector failed: {}", e);
                match action.opt_str_param("transition") {
                    Some(target) => {
                        info!("Redirecting to step '{}'", target);
                        run.run_step(&target, "waitForSelector redirect").await
                    }
                    None => Ok(()),
                }
            }
        }
    }
}

struct SetValue;

#[async_trait]
impl ActionHandler for SetValue {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let selector = action.str_param("selector")?;
        let attribute = action.str_param("attribute")?;

        let value = match action.opt_str_param("variable") {
            Some(variable) => run.context().get_path(&variable).unwrap_or(Value::Null),
            None => action
                .param("value")
                .cloned()
                .ok_or_else(|| FlowEngineError::MissingParam {
                    action: action.kind.to_string(),
                    param: "value".to_string(),
                })?,
        };

        run.session().set_property(&selector, &attribute, &value).await
    }
}

struct GetValue;

#[async_trait]
impl ActionHandler for GetValue {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let selector = action.str_param("selector")?;
        let attribute = action.str_param("attribute")?;
        let variable = action.str_param("variable")?;

        let value = run.session().get_property(&selector, &attribute).await?;
        debug!("{} = {}", variable, value);
        run.context().set(variable, value);
        Ok(())
    }
}

struct GetTableValues;

#[async_trait]
impl ActionHandler for GetTableValues {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let selector = action.str_param("selector")?;
        let variable = action.str_param("variable")?;

        let markup = run.session().inner_html(&selector).await?;
        let rows = table::extract(&markup);
        info!("Extracted {} row(s) from {}", rows.len(), selector);
        run.context().set(variable, Value::Array(rows));
        Ok(())
    }
}

struct GetCaptcha;

#[async_trait]
impl ActionHandler for GetCaptcha {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let request = CaptchaRequest::from_action(action)?;
        let recognizer = run.recognizer()?;

        let outcome = captcha::solve(recognizer.as_ref(), run.context(), &request).await;
        if outcome.is_resolved(request.required_length) {
            return Ok(());
        }

        let unresolved = FlowEngineError::CaptchaUnresolved {
            attempts: outcome.attempts,
            got: outcome.text.chars().count(),
            required: request.required_length,
        };
        warn!("{}", unresolved);

        if let Some(selector) = request.refresh_selector {
            if let Err(e) = run.session().click(&selector).await {
                warn!("Captcha refresh click failed: {}", e);
            }
            if let Some(target) = request.refresh_transition {
                run.run_step(&target, "getCaptcha refresh").await?;
            }
        }
        Ok(())
    }
}

struct GetScreenShot;

#[async_trait]
impl ActionHandler for GetScreenShot {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let path = action.str_param("path")?;
        run.session().screenshot_to(Path::new(&path)).await
    }
}

struct Click;

#[async_trait]
impl ActionHandler for Click {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let clicked = async {
            let selector = action.str_param("selector")?;
            let timeout = timeout_param(action, run)?;
            run.cancellable(run.session().click_and_wait(&selector, timeout))
                .await
        }
        .await;

        match clicked {
            Err(FlowEngineError::Cancelled) => Err(FlowEngineError::Cancelled),
            Err(e) => {
                warn!("click failed: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

struct WaitForTimeout;

#[async_trait]
impl ActionHandler for WaitForTimeout {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let delay = match action.u64_param_or("value", 0) {
            Ok(ms) => Duration::from_millis(ms),
            Err(e) => {
                warn!("waitForTimeout failed: {}", e);
                return Ok(());
            }
        };
        run.sleep(delay).await
    }
}

/// What `waitWhile` polls
enum WatchSource {
    Variable(String),
    Property { selector: String, attribute: String },
}

struct WaitWhile;

#[async_trait]
impl ActionHandler for WaitWhile {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let source = match action.opt_str_param("variable") {
            Some(variable) => WatchSource::Variable(variable),
            None => WatchSource::Property {
                selector: action.str_param("selector")?,
                attribute: action.str_param("attribute")?,
            },
        };
        let expected = action.param("value").cloned().unwrap_or(Value::Null);
        let operator = Operator::from(
            action
                .opt_str_param("operator")
                .unwrap_or_else(|| "=".to_string()),
        );
        let deadline = Duration::from_millis(
            action.u64_param_or("timeout", run.config().wait_while_timeout_ms)?,
        );
        let interval = Duration::from_millis(
            action
                .u64_param_or("interval", run.config().poll_interval_ms)?
                .max(1),
        );

        let start = Instant::now();
        let mut polls: u64 = 0;
        loop {
            let current = match &source {
                WatchSource::Variable(variable) => {
                    run.context().get_path(variable).unwrap_or(Value::Null)
                }
                WatchSource::Property { selector, attribute } => {
                    run.session().get_property(selector, attribute).await?
                }
            };
            polls += 1;

            if transition::compare(&operator, &current, &expected) != Some(true) {
                debug!("waitWhile released after {} poll(s)", polls);
                return Ok(());
            }
            if start.elapsed() >= deadline {
                warn!(
                    "waitWhile gave up after {}ms ({} poll(s)); condition still holds",
                    deadline.as_millis(),
                    polls
                );
                return Ok(());
            }
            run.sleep(interval).await?;
        }
    }
}

struct AvoidAlert;

#[async_trait]
impl ActionHandler for AvoidAlert {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let method = action
            .opt_str_param("method")
            .unwrap_or_else(|| "accept".to_string());
        let accept = match method.as_str() {
            "accept" => true,
            "dismiss" => false,
            other => {
                return Err(FlowEngineError::InvalidParam {
                    action: action.kind.to_string(),
                    param: "method".to_string(),
                    reason: format!("expected 'accept' or 'dismiss', got '{}'", other),
                })
            }
        };
        run.session().handle_next_dialog(accept).await
    }
}

struct SaveContext;

#[async_trait]
impl ActionHandler for SaveContext {
    async fn execute(&self, action: &Action, run: &mut Run) -> FlowResult<()> {
        let path = action.str_param("name")?;
        let path = Path::new(&path);
        let json = serde_json::to_string_pretty(&run.context().snapshot())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        info!("Context saved to {:?}", path);
        Ok(())
    }
}

struct SolveReCaptcha;

#[async_trait]
impl ActionHandler for SolveReCaptcha {
    async fn execute(&self, _action: &Action, run: &mut Run) -> FlowResult<()> {
        run.session().solve_recaptcha().await
    }
}

/// `function` and `rest`: accepted and ignored
struct Reserved;

#[async_trait]
impl ActionHandler for Reserved {
    async fn execute(&self, action: &Action, _run: &mut Run) -> FlowResult<()> {
        debug!("Reserved action '{}' skipped", action.kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_vocabulary() {
        let registry = ActionRegistry::with_builtins();
        for kind in ActionKind::BUILTIN.iter() {
            assert!(registry.contains(kind), "missing handler for {}", kind);
        }
        assert!(!registry.contains(&ActionKind::from("dance")));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ActionRegistry::with_builtins();
        assert!(registry.register(ActionKind::Rest, Arc::new(Reserved)).is_some());
        assert!(registry.register("dance", Arc::new(Reserved)).is_none());
        assert!(registry.contains(&ActionKind::Unknown("dance".to_string())));
    }
}
