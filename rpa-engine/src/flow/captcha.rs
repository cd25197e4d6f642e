//! Captcha Solver Adapter
//!
//! Bounded OCR retry loop over a pluggable recognizer, plus the reCAPTCHA
//! capability hook.

use crate::error::{FlowEngineError, FlowResult};
use crate::flow::context::Context;
use crate::flow::model::Action;
use crate::flow::page::PageDriver;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Turns a captcha image into text
#[async_trait]
pub trait CaptchaRecognizer: Send + Sync {
    /// `image` is whatever the flow stored in the source variable, usually a
    /// data URL or bare base64 payload.
    async fn recognize(&self, image: &str) -> FlowResult<String>;
}

/// Solves reCAPTCHA widgets on a page
#[async_trait]
pub trait RecaptchaSolver: Send + Sync {
    async fn solve(&self, page: &dyn PageDriver) -> FlowResult<()>;
}

/// Parameters of one `getCaptcha` action
#[derive(Debug, Clone, PartialEq)]
pub struct CaptchaRequest {
    pub source: String,
    pub destination: String,
    pub retry: u32,
    pub required_length: usize,
    pub refresh_selector: Option<String>,
    pub refresh_transition: Option<String>,
}

impl CaptchaRequest {
    pub fn from_action(action: &Action) -> FlowResult<Self> {
        let source = action.str_param("variable")?;
        let destination = action
            .opt_str_param("destination")
            .unwrap_or_else(|| source.clone());

        Ok(Self {
            source,
            destination,
            retry: u32::try_from(action.u64_param_or("retry", 1)?)
                .unwrap_or(u32::MAX)
                .max(1),
            required_length: action.u64_param_or("length", 0)? as usize,
            refresh_selector: action.opt_str_param("refreshSelector"),
            refresh_transition: action.opt_str_param("transition"),
        })
    }
}

/// What the retry loop ended with
#[derive(Debug, Clone, PartialEq)]
pub struct CaptchaOutcome {
    pub text: String,
    pub attempts: u32,
}

impl CaptchaOutcome {
    pub fn is_resolved(&self, required_length: usize) -> bool {
        self.text.chars().count() >= required_length
    }
}

/// Run the recognizer until the text is long enough or the attempts are
/// used up, then store the best text in the destination variable.
pub async fn solve(
    recognizer: &dyn CaptchaRecognizer,
    context: &Context,
    request: &CaptchaRequest,
) -> CaptchaOutcome {
    let image = match context.get_path(&request.source) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let mut best = String::new();
    let mut attempts = 0;

    while attempts < request.retry {
        attempts += 1;
        match recognizer.recognize(&image).await {
            Ok(text) => {
                debug!("Captcha attempt {}/{}: '{}'", attempts, request.retry, text);
                if text.chars().count() >= best.chars().count() {
                    best = text;
                }
            }
            Err(e) => warn!("Captcha attempt {}/{} failed: {}", attempts, request.retry, e),
        }
        if best.chars().count() >= request.required_length {
            break;
        }
    }

    context.set(request.destination.clone(), best.clone());
    CaptchaOutcome {
        text: best,
        attempts,
    }
}

/// Recognizer backed by the `tesseract` command-line tool
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    args: Vec<String>,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            // Treat the image as a single line of text
            args: vec!["--psm".to_string(), "7".to_string()],
        }
    }
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Decode a data URL (`data:image/png;base64,...`) or bare base64 payload
pub fn decode_image(image: &str) -> FlowResult<Vec<u8>> {
    let payload = match image.split_once(";base64,") {
        Some((_, data)) => data,
        None => image,
    };
    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| FlowEngineError::Captcha(format!("Invalid captcha image: {}", e)))
}

#[async_trait]
impl CaptchaRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &str) -> FlowResult<String> {
        let bytes = decode_image(image)?;
        let path = std::env::temp_dir().join(format!("rpa_captcha_{}.png", Uuid::new_v4()));
        tokio::fs::write(&path, &bytes).await?;

        let output = Command::new(&self.binary)
            .arg(&path)
            .arg("stdout")
            .args(&self.args)
            .output()
            .await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove captcha image {:?}: {}", path, e);
        }

        let output = output
            .map_err(|e| FlowEngineError::Captcha(format!("Failed to run {:?}: {}", self.binary, e)))?;
        if !output.status.success() {
            return Err(FlowEngineError::Captcha(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns one more character on every call
    struct Growing {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CaptchaRecognizer for Growing {
        async fn recognize(&self, _image: &str) -> FlowResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok("x".repeat(n as usize))
        }
    }

    fn request(retry: u32, required_length: usize) -> CaptchaRequest {
        CaptchaRequest {
            source: "img".to_string(),
            destination: "code".to_string(),
            retry,
            required_length,
            refresh_selector: None,
            refresh_transition: None,
        }
    }

    #[tokio::test]
    async fn test_stops_when_length_reached() {
        let ocr = Growing { calls: AtomicU32::new(0) };
        let ctx = Context::new();
        let outcome = solve(&ocr, &ctx, &request(3, 2)).await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.get("code"), Some(json!("xx")));
    }

    #[tokio::test]
    async fn test_stops_after_retry_attempts() {
        let ocr = Growing { calls: AtomicU32::new(0) };
        let ctx = Context::new();
        let outcome = solve(&ocr, &ctx, &request(3, 6)).await;
        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.is_resolved(6));
        // Short result is still stored
        assert_eq!(ctx.get("code"), Some(json!("xxx")));
    }

    struct Broken;

    #[async_trait]
    impl CaptchaRecognizer for Broken {
        async fn recognize(&self, _image: &str) -> FlowResult<String> {
            Err(FlowEngineError::Captcha("ocr offline".to_string()))
        }
    }

    #[test]
    fn test_recognizer_errors_use_up_attempts() {
        let ctx = Context::new();
        let outcome = tokio_test::block_on(solve(&Broken, &ctx, &request(2, 4)));
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.text, "");
        assert_eq!(ctx.get("code"), Some(json!("")));
    }

    #[test]
    fn test_decode_image() {
        assert_eq!(decode_image("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_image("aGk=").unwrap(), b"hi");
        assert!(decode_image("data:image/png;base64,***").is_err());
    }

    #[test]
    fn test_request_defaults() {
        let action = Action::new("getCaptcha").with_param("variable", "img");
        let req = CaptchaRequest::from_action(&action).unwrap();
        assert_eq!(req.destination, "img");
        assert_eq!(req.retry, 1);
        assert_eq!(req.required_length, 0);
    }

    #[test]
    fn test_oversized_retry_saturates() {
        let action = Action::new("getCaptcha")
            .with_param("variable", "img")
            .with_param("retry", 4_294_967_296u64);
        assert_eq!(CaptchaRequest::from_action(&action).unwrap().retry, u32::MAX);

        let action = Action::new("getCaptcha")
            .with_param("variable", "img")
            .with_param("retry", 0);
        assert_eq!(CaptchaRequest::from_action(&action).unwrap().retry, 1);
    }
}
