//! Flow Engine
//!
//! Entry point of a run: launch the browser, execute the `init` step, close
//! the browser on every exit path and report the final context.

use crate::config::EngineConfig;
use crate::error::FlowResult;
use crate::flow::actions::ActionRegistry;
use crate::flow::browser::{BrowserLauncher, ChromiumLauncher};
use crate::flow::captcha::{CaptchaRecognizer, RecaptchaSolver};
use crate::flow::context::Context;
use crate::flow::executor::Run;
use crate::flow::model::{FlowDefinition, FlowOutput};
use crate::flow::session::BrowserSession;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Status reported for a completed run
pub const STATUS_OK: u16 = 200;

/// Runs flows against browsers obtained from a launcher
pub struct FlowEngine {
    config: Arc<EngineConfig>,
    launcher: Arc<dyn BrowserLauncher>,
    registry: Arc<ActionRegistry>,
    recognizer: Option<Arc<dyn CaptchaRecognizer>>,
    recaptcha: Option<Arc<dyn RecaptchaSolver>>,
    cancel: CancellationToken,
}

impl FlowEngine {
    /// Engine using local Chromium and the built-in actions
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            launcher: Arc::new(ChromiumLauncher),
            registry: Arc::new(ActionRegistry::with_builtins()),
            recognizer: None,
            recaptcha: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn CaptchaRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_recaptcha_solver(mut self, solver: Arc<dyn RecaptchaSolver>) -> Self {
        self.recaptcha = Some(solver);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that aborts every run of this engine when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `flow` with a context seeded from `input`. The output reports
    /// `input` unchanged.
    pub async fn run(&self, flow: &FlowDefinition, input: Value) -> FlowResult<FlowOutput> {
        let context = Context::from_input(&input);
        self.start(flow, context, input).await
    }

    /// Run `flow` on a caller-provided context. The caller keeps its handle
    /// and may read or update variables while the run is in progress. The
    /// output reports the context as it was when the run started.
    pub async fn run_with_context(
        &self,
        flow: &FlowDefinition,
        context: Context,
    ) -> FlowResult<FlowOutput> {
        let input = context.snapshot();
        self.start(flow, context, input).await
    }

    async fn start(
        &self,
        flow: &FlowDefinition,
        context: Context,
        input: Value,
    ) -> FlowResult<FlowOutput> {
        flow.validate()?;

        let span = tracing::info_span!("run", id = %Uuid::new_v4(), init = %flow.init);
        self.execute(flow, context, input).instrument(span).await
    }

    async fn execute(
        &self,
        flow: &FlowDefinition,
        context: Context,
        input: Value,
    ) -> FlowResult<FlowOutput> {
        let started = Instant::now();

        let mut options = self.config.browser.clone();
        options.headless = self.config.headless.unwrap_or(flow.headless);
        let browser = self.launcher.launch(&options).await?;
        let session = BrowserSession::new(browser).with_recaptcha_solver(self.recaptcha.clone());

        let mut run = Run::new(
            Arc::new(flow.clone()),
            context,
            session,
            self.config.clone(),
            self.registry.clone(),
            self.cancel.child_token(),
        )
        .with_recognizer(self.recognizer.clone());

        info!("Starting run at step '{}'", flow.init);
        let result = run.run_step(&flow.init, "init").await;

        if let Err(e) = run.close().await {
            warn!("Failed to close browser: {}", e);
        }

        match result {
            Ok(()) => {
                info!("Run completed in {}ms", started.elapsed().as_millis());
                Ok(FlowOutput {
                    status: STATUS_OK,
                    input,
                    output: run.context().snapshot(),
                })
            }
            Err(e) => {
                warn!("Run failed after {}ms: {}", started.elapsed().as_millis(), e);
                Err(e)
            }
        }
    }
}
