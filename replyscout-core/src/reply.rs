use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CompletionSection;
use crate::http::{HttpResult, RequestSpec, ResilientClient};

const TEXT_PLACEHOLDER: &str = "{text}";

/// Produces a reply draft for a post. Never fails: an unusable completion
/// comes back as an empty string.
#[async_trait]
pub trait ReplyDrafter: Send + Sync {
    async fn draft(&self, source_text: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct ReplyComposer {
    client: ResilientClient,
    base_url: String,
    api_key: Option<String>,
    model: String,
    prompt_template: String,
}

impl ReplyComposer {
    pub fn new(client: ResilientClient, config: &CompletionSection) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            prompt_template: config.prompt_template.clone(),
        }
    }

    pub fn into_shared(self) -> Arc<dyn ReplyDrafter> {
        Arc::new(self)
    }

    pub async fn compose_reply(&self, source_text: &str, model: &str, prompt_template: &str) -> String {
        let prompt = render_prompt(prompt_template, source_text);
        match self.request_completion(model, &prompt).await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                warn!(model, "completion response carried no content");
                String::new()
            }
            Err(err) => {
                warn!(model, error = %err, "reply completion failed");
                String::new()
            }
        }
    }

    async fn request_completion(&self, model: &str, prompt: &str) -> HttpResult<Option<String>> {
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let mut spec = RequestSpec::post_json(format!("{}/chat/completions", self.base_url), body);
        match self.api_key.as_deref() {
            Some(key) => spec = spec.bearer(key),
            None => debug!("no completion api key configured"),
        }
        let response = self.client.send(&spec).await?;
        Ok(extract_content(&response.json()?))
    }
}

#[async_trait]
impl ReplyDrafter for ReplyComposer {
    async fn draft(&self, source_text: &str) -> String {
        self.compose_reply(source_text, &self.model, &self.prompt_template)
            .await
    }
}

/// Substitutes every `{text}` placeholder. Templates without one get the
/// post appended after a blank line.
pub fn render_prompt(template: &str, source_text: &str) -> String {
    if template.contains(TEXT_PLACEHOLDER) {
        template.replace(TEXT_PLACEHOLDER, source_text)
    } else if template.trim().is_empty() {
        source_text.to_string()
    } else {
        format!("{}\n\n{source_text}", template.trim_end())
    }
}

fn extract_content(payload: &Value) -> Option<String> {
    let content = payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}
