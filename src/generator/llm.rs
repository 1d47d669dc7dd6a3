//! Preset generation through an OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::PresetGenerator;
use crate::pipeline::preset::{Preset, PresetError};
use crate::shared::{MAX_BPM, MIN_BPM, STEPS_PER_PATTERN};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint answered with status {0}")]
    Status(u16),
    #[error("response has no message content")]
    NoContent,
    #[error("no JSON object in the model's reply")]
    NoJson,
    #[error(transparent)]
    Preset(#[from] PresetError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String, // name of the variable holding the key, never the key
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn system_prompt() -> String {
    format!(
        "You write backing tracks for a {STEPS_PER_PATTERN}-step sequencer. \
         Reply with one JSON object and nothing else, shaped as \
         {{\"name\": string, \"description\": string, \
         \"bpm\": integer between {MIN_BPM} and {MAX_BPM}, \
         \"tracks\": {{\"<id>\": {{\"steps\": [{{\"active\": bool, \"note\": string}}, \
         ...exactly {STEPS_PER_PATTERN} entries], \"volume\": number 0..1, \"muted\": bool}}}}}}. \
         Track ids: kick, snare, hihat, bass, piano, pad, lead. \
         Drum and bass notes are pitch names like C1 or F#2, lead notes span C4..C6, \
         piano and pad notes are chords from C, Dm, Em, F, G, Am, Bdim, C5."
    )
}

pub struct LlmGenerator {
    client: reqwest::blocking::Client,
    config: LlmConfig,
    api_key: String,
}

impl LlmGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, GenerateError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| GenerateError::MissingApiKey(config.api_key_env.clone()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, config: config.clone(), api_key })
    }

    fn request(&self, description: &str) -> Result<Preset, GenerateError> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0.7,
            "messages": [
                { "role": "system", "content": system_prompt() },
                { "role": "user", "content": description },
            ],
        });
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerateError::Status(status.as_u16()));
        }
        let text = response.text()?;
        parse_response(&text)
    }
}

impl PresetGenerator for LlmGenerator {
    fn generate(&self, description: &str) -> anyhow::Result<Preset> {
        Ok(self.request(description)?)
    }
}

/// Chat-completions body -> validated preset.
pub fn parse_response(body: &str) -> Result<Preset, GenerateError> {
    let chat: ChatResponse = serde_json::from_str(body).map_err(PresetError::from)?;
    let content = chat
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(GenerateError::NoContent)?;
    let json = extract_json(&content).ok_or(GenerateError::NoJson)?;
    Ok(Preset::from_json(json)?)
}

/// Models like to wrap JSON in prose or code fences; take the outermost object.
pub fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::classify::{pattern_preset, Style};

    fn chat_body(content: &str) -> String {
        serde_json::to_string(&json!({
            "id": "x",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        }))
        .unwrap()
    }

    #[test]
    fn extracts_fenced_json() {
        assert_eq!(extract_json("```json\n{\"a\": {\"b\": 1}}\n```"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn parses_a_good_reply() {
        let preset = pattern_preset(Style::Jazz);
        let content = format!("Here you go:\n{}", preset.to_json().unwrap());
        let parsed = parse_response(&chat_body(&content)).unwrap();
        assert_eq!(parsed, preset);
    }

    #[test]
    fn rejects_short_patterns() {
        let content = r#"{"name":"x","description":"y","bpm":100,
            "tracks":{"kick":{"steps":[{"active":true,"note":"C1"}],"volume":0.5,"muted":false}}}"#;
        assert!(matches!(
            parse_response(&chat_body(content)),
            Err(GenerateError::Preset(PresetError::StepCount { .. }))
        ));
    }

    #[test]
    fn rejects_empty_choices_and_garbage() {
        assert!(matches!(parse_response(r#"{"choices":[]}"#), Err(GenerateError::NoContent)));
        assert!(matches!(parse_response(&chat_body("sorry, I can't")), Err(GenerateError::NoJson)));
        assert!(parse_response("<html>").is_err());
    }

    #[test]
    fn missing_key_is_reported() {
        let config = LlmConfig {
            api_key_env: "BACKTRACK_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(LlmGenerator::new(&config), Err(GenerateError::MissingApiKey(_))));
    }
}
