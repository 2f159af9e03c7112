//! Best-effort generative text for the board.
//!
//! Status labels can be restyled to look like an airport display, and trip
//! notes can be drafted from a one-line description. Both are decoration:
//! any failure falls back to the uppercased input and is only logged.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::{Error, Result};

/// Something that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

mod dto {
    use super::{Deserialize, Serialize};

    #[derive(Debug, Serialize)]
    pub struct GenerateRequest<'a> {
        pub contents: Vec<Content<'a>>,
    }

    #[derive(Debug, Serialize)]
    pub struct Content<'a> {
        pub parts: Vec<Part<'a>>,
    }

    #[derive(Debug, Serialize)]
    pub struct Part<'a> {
        pub text: &'a str,
    }

    #[derive(Debug, Deserialize)]
    pub struct GenerateResponse {
        #[serde(default)]
        pub candidates: Vec<Candidate>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Candidate {
        pub content: Option<CandidateContent>,
    }

    #[derive(Debug, Deserialize)]
    pub struct CandidateContent {
        #[serde(default)]
        pub parts: Vec<CandidatePart>,
    }

    #[derive(Debug, Deserialize)]
    pub struct CandidatePart {
        pub text: Option<String>,
    }

    impl GenerateResponse {
        /// Text of the first candidate, parts joined.
        pub fn text(&self) -> Option<String> {
            let content = self.candidates.first()?.content.as_ref()?;
            let text: String = content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect();
            (!text.trim().is_empty()).then_some(text)
        }
    }
}

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiGenerator {
    /// Build a client from the `ai` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::ai_service(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = dto::GenerateRequest {
            contents: vec![dto::Content {
                parts: vec![dto::Part { text: prompt }],
            }],
        };

        let mut request = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-goog-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::ai_service(format!("API error {status}: {text}")));
        }

        let parsed: dto::GenerateResponse = response.json().await?;
        parsed
            .text()
            .ok_or_else(|| Error::ai_service("response had no text"))
    }
}

fn stylize_prompt(status: &str) -> String {
    format!(
        "You are an AI assistant specialized in generating stylized status messages that \
         resemble airport display boards. Given the input status message, transform it to \
         match the aesthetic of an airport display, using elements like bold text, specific \
         colors (Electric Blue #7DF9FF), and other formatting to enhance the visual \
         representation. Reply with the stylized message only.\n\n\
         Input Status Message: {status}\n\nOutput Stylized Message:"
    )
}

fn notes_prompt(trip: &str) -> String {
    format!(
        "Write short, practical notes for the driver and staff of this school shuttle trip. \
         Reply with the notes only.\n\nTrip: {trip}"
    )
}

/// Front for the text generator that never fails.
#[derive(Debug, Clone, Default)]
pub struct Stylist {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Stylist {
    /// A stylist that always returns the fallback.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A stylist backed by `generator`.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Build from config: a Gemini-backed stylist when `ai.enabled`,
    /// otherwise a disabled one.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        Ok(Self::new(Arc::new(GeminiGenerator::from_config(config)?)))
    }

    /// Whether a generator is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Restyle a status label, e.g. `LLEGANDO`, for the board.
    pub async fn stylize(&self, status: &str) -> String {
        self.generate_or_fallback(&stylize_prompt(status), status)
            .await
            .replace('\\', "")
    }

    /// Draft notes for a trip described by `prompt`.
    pub async fn draft_notes(&self, prompt: &str) -> String {
        self.generate_or_fallback(&notes_prompt(prompt), prompt)
            .await
            .trim()
            .to_string()
    }

    async fn generate_or_fallback(&self, prompt: &str, input: &str) -> String {
        let fallback = || input.to_uppercase();
        let Some(generator) = &self.generator else {
            return fallback();
        };
        match generator.generate(prompt).await {
            Ok(text) => {
                debug!("Generated {} characters", text.len());
                text
            }
            Err(e) => {
                warn!("Text generation failed, using plain text: {}", e);
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug)]
    struct FixedGenerator {
        reply: Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedGenerator {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(Error::ai_service("quota exceeded")),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::ai_service(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_disabled_falls_back_to_uppercase() {
        let stylist = Stylist::disabled();
        assert!(!stylist.is_enabled());
        assert_eq!(stylist.stylize("Llegando").await, "LLEGANDO");
        assert_eq!(stylist.draft_notes("a shuttle").await, "A SHUTTLE");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_uppercase() {
        let generator = FixedGenerator::failing();
        let stylist = Stylist::new(generator.clone());
        assert_eq!(stylist.stylize("Saliendo").await, "SALIENDO");
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stylize_strips_backslashes() {
        let generator = FixedGenerator::ok(r"<b>\*\*LLEGANDO\*\*</b>");
        let stylist = Stylist::new(generator.clone());
        assert_eq!(stylist.stylize("Llegando").await, "<b>**LLEGANDO**</b>");

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Input Status Message: Llegando"));
        assert!(prompts[0].contains("#7DF9FF"));
    }

    #[tokio::test]
    async fn test_draft_notes_uses_generator() {
        let generator = FixedGenerator::ok("  Bring the roster.\n");
        let stylist = Stylist::new(generator.clone());
        let notes = stylist.draft_notes("A shuttle from Escuela to Campo").await;
        assert_eq!(notes, "Bring the roster.");
        assert!(generator.prompts.lock().unwrap()[0].contains("Escuela to Campo"));
    }

    #[test]
    fn test_from_config_disabled() {
        let stylist = Stylist::from_config(&AiConfig::default()).unwrap();
        assert!(!stylist.is_enabled());
    }

    #[test]
    fn test_request_body_shape() {
        let body = dto::GenerateRequest {
            contents: vec![dto::Content {
                parts: vec![dto::Part { text: "hi" }],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"contents": [{"parts": [{"text": "hi"}]}]}));
    }

    #[test]
    fn test_response_text() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "**ON "}, {"text": "TIME**"}], "role": "model"},
                "finishReason": "STOP"
            }]
        }"#;
        let parsed: dto::GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("**ON TIME**"));
    }

    #[test]
    fn test_response_without_candidates() {
        let parsed: dto::GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(parsed.text().is_none());
    }

    #[test]
    fn test_gemini_url() {
        let config = AiConfig {
            endpoint: "https://example.test/v1beta/".to_string(),
            model: "m".to_string(),
            ..AiConfig::default()
        };
        let generator = GeminiGenerator::from_config(&config).unwrap();
        assert_eq!(
            generator.url(),
            "https://example.test/v1beta/models/m:generateContent"
        );
    }
}
