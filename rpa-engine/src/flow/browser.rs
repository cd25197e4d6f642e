//! Browser processes
//!
//! Launch options, the driver traits the session talks to, and the
//! chromiumoxide-backed implementation.

use crate::error::{FlowEngineError, FlowResult};
use crate::flow::page::{ChromiumPage, PageDriver};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upstream proxy every page of the browser goes through
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// `http`, `https` or `socks5`
    #[serde(default = "default_proxy_scheme")]
    pub scheme: String,
}

fn default_proxy_scheme() -> String {
    "http".to_string()
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            scheme: default_proxy_scheme(),
        }
    }

    pub fn socks5(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "socks5".to_string(),
            ..Self::new(host, port)
        }
    }

    /// Value for Chrome's `--proxy-server`
    pub fn to_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// How the engine starts Chromium. `headless` is overwritten per run from
/// the flow (or the engine config override).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub proxy: Option<ProxyConfig>,
    /// Appended verbatim after the generated arguments
    pub extra_args: Vec<String>,
    /// Persistent profile; a throwaway one is created and removed when unset
    pub user_data_dir: Option<PathBuf>,
    pub ignore_ssl_errors: bool,
    pub window_size: Option<(u32, u32)>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            extra_args: Vec::new(),
            user_data_dir: None,
            ignore_ssl_errors: false,
            window_size: Some((1366, 768)),
        }
    }
}

/// Flags that keep sites from spotting the automation session
const STEALTH_ARGS: [&str; 4] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--no-first-run",
    "--no-default-browser-check",
];

impl BrowserOptions {
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Chrome command line for these options
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args: Vec<String> = STEALTH_ARGS.iter().map(|a| a.to_string()).collect();

        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={}", proxy.to_url()));
        }
        if self.ignore_ssl_errors {
            args.push("--ignore-certificate-errors".to_string());
        }
        if let Some((width, height)) = self.window_size {
            args.push(format!("--window-size={},{}", width, height));
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// A running browser process
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a new blank tab
    async fn new_page(&self) -> FlowResult<Box<dyn PageDriver>>;

    /// Terminate the browser; closing twice is a no-op
    async fn close(&mut self) -> FlowResult<()>;
}

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &BrowserOptions) -> FlowResult<Box<dyn BrowserDriver>>;
}

/// Chromium process plus the task pumping its CDP events
pub struct ChromiumBrowser {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    /// Profile directory to remove on close, if we created it
    temp_profile: Option<PathBuf>,
}

#[async_trait]
impl BrowserDriver for ChromiumBrowser {
    async fn new_page(&self) -> FlowResult<Box<dyn PageDriver>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| FlowEngineError::BrowserLaunch("Browser already closed".to_string()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FlowEngineError::BrowserLaunch(format!("Failed to create page: {}", e)))?;

        Ok(Box::new(ChromiumPage::new(page)))
    }

    async fn close(&mut self) -> FlowResult<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        if let Err(e) = browser.close().await {
            warn!("Chromium did not close cleanly: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Chromium exit status unavailable: {}", e);
        }
        self.handler.abort();
        info!("Chromium closed");

        if let Some(profile) = self.temp_profile.take().filter(|p| p.exists()) {
            debug!("Removing throwaway profile {:?}", profile);
            if let Err(e) = tokio::fs::remove_dir_all(&profile).await {
                warn!("Could not remove profile {:?}: {}", profile, e);
            }
        }
        Ok(())
    }
}

/// Launches local Chromium via chromiumoxide
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &BrowserOptions) -> FlowResult<Box<dyn BrowserDriver>> {
        let mut builder = BrowserConfig::builder();

        // Concurrent runs must not share a profile (SingletonLock)
        let (user_data_dir, temp_profile) = match options.user_data_dir {
            Some(ref dir) => (dir.clone(), None),
            None => {
                let dir = std::env::temp_dir().join(format!("rpa_browser_{}", Uuid::new_v4()));
                (dir.clone(), Some(dir))
            }
        };
        builder = builder.user_data_dir(&user_data_dir);

        if !options.headless {
            builder = builder.with_head();
        }

        for arg in options.chrome_args() {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(FlowEngineError::BrowserLaunch)?;

        let (browser, mut events) = Browser::launch(config).await.map_err(|e| {
            FlowEngineError::BrowserLaunch(format!("Chromium failed to start: {}", e))
        })?;

        // The browser stalls unless its event stream is drained
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!("CDP event error: {}", e);
                }
            }
        });

        info!(
            headless = options.headless,
            proxy = ?options.proxy.as_ref().map(ProxyConfig::to_url),
            "Chromium launched"
        );

        Ok(Box::new(ChromiumBrowser {
            browser: Some(browser),
            handler,
            temp_profile,
        }))
    }
}
