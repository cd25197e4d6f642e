//! Page Driver Module
//!
//! The per-tab automation surface the interpreter needs, and its Chromium
//! implementation.

use crate::error::{FlowEngineError, FlowResult};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between element lookups while waiting for a selector
const SELECTOR_POLL: Duration = Duration::from_millis(100);

/// One browser tab
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn set_user_agent(&self, user_agent: &str) -> FlowResult<()>;

    async fn goto(&self, url: &str) -> FlowResult<()>;

    /// Evaluate a script and return its JSON result (`null` for undefined)
    async fn evaluate(&self, script: &str) -> FlowResult<Value>;

    /// Resolve once `selector` matches, or fail with `SelectorTimeout`
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> FlowResult<()>;

    async fn click(&self, selector: &str) -> FlowResult<()>;

    /// Wait for a pending navigation to finish
    async fn wait_for_navigation(&self, timeout: Duration) -> FlowResult<()>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> FlowResult<Vec<u8>>;

    /// Accept or dismiss the next native dialog the page opens
    async fn handle_next_dialog(&self, accept: bool) -> FlowResult<()>;

    /// Read DOM property `property` of the first element matching `selector`
    async fn get_property(&self, selector: &str, property: &str) -> FlowResult<Value> {
        self.evaluate(&property_script(selector, property, None)).await
    }

    /// Assign DOM property `property` of the first element matching `selector`
    async fn set_property(&self, selector: &str, property: &str, value: &Value) -> FlowResult<()> {
        self.evaluate(&property_script(selector, property, Some(value)))
            .await
            .map(|_| ())
    }

    async fn inner_html(&self, selector: &str) -> FlowResult<String> {
        match self.get_property(selector, "innerHTML").await? {
            Value::String(html) => Ok(html),
            Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

/// Build the script for a property read or write. Selector, property and
/// value are embedded as JSON literals so quoting in flows cannot break out
/// of the string.
pub fn property_script(selector: &str, property: &str, value: Option<&Value>) -> String {
    let body = match value {
        Some(value) => format!("el[{}] = {}; return null;", json!(property), value),
        None => format!("return el[{}];", json!(property)),
    };
    format!(
        "(function() {{ const el = document.querySelector({sel}); \
         if (!el) throw new Error('Element not found: ' + {sel}); {body} }})()",
        sel = json!(selector),
        body = body
    )
}

/// Chromium tab driven over CDP
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Get the underlying page
    pub fn page(&self) -> &Page {
        &self.page
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn set_user_agent(&self, user_agent: &str) -> FlowResult<()> {
        debug!("Setting user agent: {}", user_agent);
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|e| FlowEngineError::Script(format!("Failed to set user agent: {}", e)))?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> FlowResult<()> {
        info!("Navigating to: {}", url);

        self.page
            .goto(url)
            .await
            .map_err(|e| FlowEngineError::Navigation(format!("Failed to navigate to {}: {}", url, e)))?;

        Ok(())
    }

    async fn evaluate(&self, script: &str) -> FlowResult<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| FlowEngineError::Script(e.to_string()))?;

        // Scripts returning undefined yield no value
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> FlowResult<()> {
        debug!("Waiting for selector: {} ({:?})", selector, timeout);

        let start = Instant::now();
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(FlowEngineError::SelectorTimeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn click(&self, selector: &str) -> FlowResult<()> {
        debug!("Clicking: {}", selector);

        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| FlowEngineError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        element
            .click()
            .await
            .map_err(|e| FlowEngineError::Script(format!("Click failed: {}", e)))?;

        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> FlowResult<()> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(FlowEngineError::NavigationFailure(e.to_string())),
            Err(_) => Err(FlowEngineError::NavigationFailure(format!(
                "no navigation within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn screenshot(&self) -> FlowResult<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::default())
            .await
            .map_err(|e| FlowEngineError::Script(format!("Screenshot failed: {}", e)))
    }

    async fn handle_next_dialog(&self, accept: bool) -> FlowResult<()> {
        let mut dialogs = self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| FlowEngineError::Script(format!("Failed to listen for dialogs: {}", e)))?;

        let page = self.page.clone();
        tokio::spawn(async move {
            if let Some(event) = dialogs.next().await {
                debug!("Dialog opened: {}", event.message);
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(accept)).await {
                    warn!("Failed to handle dialog: {}", e);
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_script_escapes_selector() {
        let script = property_script(r#"input[name="q"]"#, "value", None);
        assert!(script.contains(r#"document.querySelector("input[name=\"q\"]")"#));
        assert!(script.contains(r#"return el["value"];"#));
    }

    #[test]
    fn test_property_script_assignment() {
        let script = property_script("#user", "value", Some(&json!("o'brien")));
        assert!(script.contains(r#"el["value"] = "o'brien";"#));
    }
}
