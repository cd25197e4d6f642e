//! Step Executor
//!
//! Interprets a flow: runs a step's actions in order, then follows every
//! transition that holds, recursing into the target step before looking at
//! the next transition.

use crate::config::{EngineConfig, TransitionMode, UnknownActionPolicy};
use crate::error::{FlowEngineError, FlowResult};
use crate::flow::actions::ActionRegistry;
use crate::flow::captcha::CaptchaRecognizer;
use crate::flow::context::Context;
use crate::flow::model::{Action, FlowDefinition, Step, Transition};
use crate::flow::session::BrowserSession;
use crate::flow::transition;
use async_recursion::async_recursion;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

/// State of one flow execution
pub struct Run {
    flow: Arc<FlowDefinition>,
    context: Context,
    session: BrowserSession,
    config: Arc<EngineConfig>,
    registry: Arc<ActionRegistry>,
    recognizer: Option<Arc<dyn CaptchaRecognizer>>,
    cancel: CancellationToken,
    depth: usize,
}

impl Run {
    pub fn new(
        flow: Arc<FlowDefinition>,
        context: Context,
        session: BrowserSession,
        config: Arc<EngineConfig>,
        registry: Arc<ActionRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            flow,
            context,
            session,
            config,
            registry,
            recognizer: None,
            cancel,
            depth: 0,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Option<Arc<dyn CaptchaRecognizer>>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut BrowserSession {
        &mut self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recognizer(&self) -> FlowResult<Arc<dyn CaptchaRecognizer>> {
        self.recognizer
            .clone()
            .ok_or_else(|| FlowEngineError::Captcha("No captcha recognizer configured".to_string()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Race `fut` against cancellation of the run
    pub async fn cancellable<T>(&self, fut: impl Future<Output = FlowResult<T>>) -> FlowResult<T> {
        tokio::select! {
            result = fut => result,
            _ = self.cancel.cancelled() => Err(FlowEngineError::Cancelled),
        }
    }

    /// Sleep unless the run is cancelled first
    pub async fn sleep(&self, duration: Duration) -> FlowResult<()> {
        self.cancellable(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    /// Execute step `id`; `origin` names the reference for error reporting
    #[async_recursion]
    pub async fn run_step(&mut self, id: &str, origin: &str) -> FlowResult<()> {
        if self.depth >= self.config.max_depth {
            return Err(FlowEngineError::RecursionLimit(self.config.max_depth));
        }

        let flow = self.flow.clone();
        let step = flow.step(id, origin)?;

        self.depth += 1;
        let span = tracing::info_span!("step", id = %id, depth = self.depth);
        let result = self.execute_step(id, step).instrument(span).await;
        self.depth -= 1;
        result
    }

    async fn execute_step(&mut self, id: &str, step: &Step) -> FlowResult<()> {
        info!("Entering step '{}' ({} actions)", step.name, step.actions.len());

        for (i, action) in step.actions.iter().enumerate() {
            if self.is_cancelled() {
                return Err(FlowEngineError::Cancelled);
            }
            debug!("Action {}/{}: {}", i + 1, step.actions.len(), action.kind);
            self.dispatch(action).await?;
        }

        for (i, transition) in step.transitions.iter().enumerate() {
            if let Transition::Function { name, .. } = transition {
                debug!("Function transition {:?} is reserved; skipped", name);
                continue;
            }
            if !transition::should_fire(transition, &self.context) {
                continue;
            }

            debug!("Transition {} -> {}", id, transition.target());
            let origin = format!("transition #{} of step '{}'", i + 1, id);
            self.run_step(transition.target(), &origin).await?;

            if self.config.transition_mode == TransitionMode::FirstMatch {
                break;
            }
        }

        Ok(())
    }

    /// Hand `action` to its registered handler
    pub async fn dispatch(&mut self, action: &Action) -> FlowResult<()> {
        match self.registry.get(&action.kind) {
            Some(handler) => handler.execute(action, self).await,
            None => match self.config.unknown_actions {
                UnknownActionPolicy::Ignore => {
                    debug!("Ignoring unsupported action '{}'", action.kind);
                    Ok(())
                }
                UnknownActionPolicy::Reject => {
                    Err(FlowEngineError::UnsupportedAction(action.kind.to_string()))
                }
            },
        }
    }

    /// Close the browser; the run's context stays readable
    pub async fn close(&mut self) -> FlowResult<()> {
        self.session.close().await
    }
}
