//! Browser Session Manager
//!
//! Owns the browser for one run and an arena of named pages. Pages are
//! addressed by a stable [`PageId`]; exactly one of them is current and every
//! interaction primitive targets it.

use crate::error::{FlowEngineError, FlowResult};
use crate::flow::browser::BrowserDriver;
use crate::flow::captcha::RecaptchaSolver;
use crate::flow::page::PageDriver;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Index of a page in the session arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(usize);

struct PageEntry {
    name: String,
    driver: Box<dyn PageDriver>,
}

pub struct BrowserSession {
    browser: Option<Box<dyn BrowserDriver>>,
    pages: Vec<PageEntry>,
    current: Option<PageId>,
    recaptcha: Option<Arc<dyn RecaptchaSolver>>,
}

impl BrowserSession {
    pub fn new(browser: Box<dyn BrowserDriver>) -> Self {
        Self {
            browser: Some(browser),
            pages: Vec::new(),
            current: None,
            recaptcha: None,
        }
    }

    pub fn with_recaptcha_solver(mut self, solver: Option<Arc<dyn RecaptchaSolver>>) -> Self {
        self.recaptcha = solver;
        self
    }

    fn find(&self, name: &str) -> Option<PageId> {
        self.pages.iter().position(|p| p.name == name).map(PageId)
    }

    pub fn current_id(&self) -> Option<PageId> {
        self.current
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.map(|id| self.pages[id.0].name.as_str())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_closed(&self) -> bool {
        self.browser.is_none()
    }

    /// Make `name` the current page, creating it if no page has that name.
    /// Nothing happens when `name` is already current.
    pub async fn open_page(&mut self, name: &str) -> FlowResult<PageId> {
        if let Some(id) = self.current.filter(|id| self.pages[id.0].name == name) {
            return Ok(id);
        }

        if let Some(id) = self.find(name) {
            debug!("Switching to existing page '{}'", name);
            self.current = Some(id);
            return Ok(id);
        }

        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| FlowEngineError::BrowserLaunch("Browser already closed".to_string()))?;
        let driver = browser.new_page().await?;

        let id = PageId(self.pages.len());
        self.pages.push(PageEntry {
            name: name.to_string(),
            driver,
        });
        self.current = Some(id);
        info!("Opened page '{}'", name);
        Ok(id)
    }

    /// Switch to an already opened page
    pub fn use_page(&mut self, name: &str) -> FlowResult<PageId> {
        if let Some(id) = self.current.filter(|id| self.pages[id.0].name == name) {
            return Ok(id);
        }
        let id = self.find(name).ok_or_else(|| FlowEngineError::PageNotFound {
            name: name.to_string(),
        })?;
        self.current = Some(id);
        Ok(id)
    }

    /// Driver of the current page
    pub fn page(&self) -> FlowResult<&dyn PageDriver> {
        self.current
            .map(|id| self.pages[id.0].driver.as_ref())
            .ok_or(FlowEngineError::NoActivePage)
    }

    /// Navigate the current page, presenting `user_agent` when given
    pub async fn navigate(&self, url: &str, user_agent: Option<&str>) -> FlowResult<()> {
        let page = self.page()?;
        if let Some(ua) = user_agent {
            page.set_user_agent(ua).await?;
        }
        page.goto(url).await
    }

    pub async fn evaluate(&self, script: &str) -> FlowResult<Value> {
        self.page()?.evaluate(script).await
    }

    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> FlowResult<()> {
        self.page()?.wait_for_selector(selector, timeout).await
    }

    pub async fn click(&self, selector: &str) -> FlowResult<()> {
        self.page()?.click(selector).await
    }

    /// Click and wait for the resulting navigation to settle
    pub async fn click_and_wait(&self, selector: &str, timeout: Duration) -> FlowResult<()> {
        let page = self.page()?;
        page.click(selector).await?;
        page.wait_for_navigation(timeout).await
    }

    pub async fn get_property(&self, selector: &str, property: &str) -> FlowResult<Value> {
        self.page()?.get_property(selector, property).await
    }

    pub async fn set_property(&self, selector: &str, property: &str, value: &Value) -> FlowResult<()> {
        self.page()?.set_property(selector, property, value).await
    }

    pub async fn inner_html(&self, selector: &str) -> FlowResult<String> {
        self.page()?.inner_html(selector).await
    }

    /// Capture the current page into a PNG file
    pub async fn screenshot_to(&self, path: &Path) -> FlowResult<()> {
        let data = self.page()?.screenshot().await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &data).await?;
        debug!("Screenshot saved: {:?} ({} bytes)", path, data.len());
        Ok(())
    }

    pub async fn handle_next_dialog(&self, accept: bool) -> FlowResult<()> {
        self.page()?.handle_next_dialog(accept).await
    }

    pub async fn solve_recaptcha(&self) -> FlowResult<()> {
        let solver = self
            .recaptcha
            .as_ref()
            .ok_or(FlowEngineError::RecaptchaUnavailable)?;
        solver.solve(self.page()?).await
    }

    /// Drop every page and close the browser. Safe to call more than once.
    pub async fn close(&mut self) -> FlowResult<()> {
        self.current = None;
        self.pages.clear();
        match self.browser.take() {
            Some(mut browser) => browser.close().await,
            None => Ok(()),
        }
    }
}
