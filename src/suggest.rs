//! Copywriting assistant for text and button areas.
//!
//! Uses the same [`LanguageModel`] port as analysis, with text-only
//! requests. Unlike block classification, failures here are not swallowed:
//! the caller asked for a suggestion and gets either one or an error.

use crate::error::Img2EmailError;
use crate::model::{LanguageModel, ModelError, ModelRequest};
use crate::prompts::{improve_prompt, suggest_prompt, IMPROVE_SYSTEM, SUGGEST_SYSTEM};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

const TEXT_TEMPERATURE: f32 = 0.7;
const TEXT_MAX_TOKENS: usize = 500;

/// What kind of copy to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    #[default]
    Text,
    Button,
}

impl FromStr for SuggestionKind {
    type Err = Img2EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(SuggestionKind::Text),
            "button" => Ok(SuggestionKind::Button),
            other => Err(Img2EmailError::InvalidConfig(format!(
                "unknown suggestion kind '{}' (expected text or button)",
                other
            ))),
        }
    }
}

/// Availability report for the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantStatus {
    pub available: bool,
    pub provider: String,
    pub message: String,
}

/// Suggests and rewrites marketing copy through a [`LanguageModel`].
#[derive(Clone)]
pub struct TextAssistant {
    model: Arc<dyn LanguageModel>,
}

impl fmt::Debug for TextAssistant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextAssistant")
            .field("model", &self.model.name())
            .finish()
    }
}

impl TextAssistant {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn status(&self) -> AssistantStatus {
        let available = self.model.is_available();
        AssistantStatus {
            available,
            provider: self.model.name().to_string(),
            message: if available {
                "AI is ready".to_string()
            } else {
                self.model.setup_hint()
            },
        }
    }

    /// Write new copy for a text paragraph or a button label.
    pub async fn suggest_text(
        &self,
        kind: SuggestionKind,
        current_text: Option<&str>,
        context: Option<&str>,
    ) -> Result<String, Img2EmailError> {
        let prompt = suggest_prompt(kind == SuggestionKind::Button, current_text, context);
        self.ask(SUGGEST_SYSTEM, prompt).await
    }

    /// Rewrite `text`, optionally following `instruction`.
    pub async fn improve_text(
        &self,
        text: &str,
        instruction: Option<&str>,
    ) -> Result<String, Img2EmailError> {
        if text.trim().is_empty() {
            return Err(Img2EmailError::InvalidConfig(
                "text to improve must not be empty".to_string(),
            ));
        }
        self.ask(IMPROVE_SYSTEM, improve_prompt(text, instruction)).await
    }

    async fn ask(&self, system: &str, prompt: String) -> Result<String, Img2EmailError> {
        if !self.model.is_available() {
            return Err(Img2EmailError::ModelNotConfigured {
                provider: self.model.name().to_string(),
                hint: self.model.setup_hint(),
            });
        }

        let request = ModelRequest::text(system, prompt)
            .with_temperature(TEXT_TEMPERATURE)
            .with_max_tokens(TEXT_MAX_TOKENS);

        match self.model.complete(&request).await {
            Ok(raw) => {
                debug!("Assistant answered {} chars", raw.len());
                Ok(clean_reply(&raw))
            }
            Err(ModelError::NotConfigured { hint }) => Err(Img2EmailError::ModelNotConfigured {
                provider: self.model.name().to_string(),
                hint,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Trim whitespace and one pair of wrapping quotes.
fn clean_reply(raw: &str) -> String {
    let trimmed = raw.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = trimmed
            .strip_prefix(open)
            .and_then(|s| s.strip_suffix(close))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        available: bool,
        reply: Result<String, ModelError>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl Echo {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                available: true,
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn setup_hint(&self) -> String {
            "turn it on".to_string()
        }

        async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn suggest_button_uses_text_request() {
        let model = Echo::replying("  \"Shop now\"  ");
        let assistant = TextAssistant::new(model.clone());
        let out = assistant
            .suggest_text(SuggestionKind::Button, None, Some("summer sale"))
            .await
            .unwrap();
        assert_eq!(out, "Shop now");

        let seen = model.seen.lock().unwrap();
        assert!(!seen[0].has_image());
        assert_eq!(seen[0].temperature, Some(0.7));
        assert_eq!(seen[0].max_tokens, Some(500));
        assert!(seen[0].user.contains("call-to-action"));
    }

    #[tokio::test]
    async fn improve_sends_instruction() {
        let model = Echo::replying("Better copy.");
        let assistant = TextAssistant::new(model.clone());
        let out = assistant
            .improve_text("ok copy", Some("Make it shorter"))
            .await
            .unwrap();
        assert_eq!(out, "Better copy.");
        assert!(model.seen.lock().unwrap()[0]
            .user
            .ends_with("Instruction: Make it shorter"));
    }

    #[tokio::test]
    async fn improve_rejects_empty_text() {
        let assistant = TextAssistant::new(Echo::replying("x"));
        assert!(assistant.improve_text("   ", None).await.is_err());
    }

    #[tokio::test]
    async fn unavailable_model_reports_configuration_error() {
        let model = Arc::new(Echo {
            available: false,
            reply: Ok(String::new()),
            seen: Mutex::new(Vec::new()),
        });
        let assistant = TextAssistant::new(model.clone());

        let status = assistant.status();
        assert!(!status.available);
        assert_eq!(status.message, "turn it on");

        let err = assistant
            .suggest_text(SuggestionKind::Text, None, None)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let model = Arc::new(Echo {
            available: true,
            reply: Err(ModelError::Http {
                provider: "echo".into(),
                status: 500,
                body: "boom".into(),
            }),
            seen: Mutex::new(Vec::new()),
        });
        let err = TextAssistant::new(model)
            .improve_text("hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Img2EmailError::Model(ModelError::Http { status: 500, .. })));
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Button".parse::<SuggestionKind>().unwrap(), SuggestionKind::Button);
        assert!("link".parse::<SuggestionKind>().is_err());
    }

    #[test]
    fn clean_reply_strips_one_quote_pair() {
        assert_eq!(clean_reply("'Hi'"), "Hi");
        assert_eq!(clean_reply("“Hi there”"), "Hi there");
        assert_eq!(clean_reply("Say \"hi\""), "Say \"hi\"");
    }
}
