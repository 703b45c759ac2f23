//! Name and address tidy-up for letter headings.
//!
//! A [`TextCleaner`] may call out to a language model. Its failures never
//! reach the caller of [`display_name`] or [`display_address`]; those fall
//! back to deterministic heuristics instead.

use crate::config::CleanupConfig;
use crate::error::{NoticeError, Result};
use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_NAME: &str = "Resident";
pub const NO_ADDRESS: &str = "Address not available";

pub trait TextCleaner {
    /// The person's name with title, from free-form contact text.
    fn clean_name(&self, raw: &str) -> Result<String>;

    /// The address laid out one line per component.
    fn format_address(&self, raw: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Display helpers (never fail)
// ---------------------------------------------------------------------------

pub fn display_name(cleaner: &dyn TextCleaner, raw: &str) -> String {
    if raw.trim().is_empty() {
        return DEFAULT_NAME.to_string();
    }
    match cleaner.clean_name(raw) {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        Ok(_) => fallback_name(raw),
        Err(e) => {
            tracing::warn!(error = %e, "name cleanup failed, using fallback");
            fallback_name(raw)
        }
    }
}

pub fn display_address(cleaner: &dyn TextCleaner, raw: &str) -> String {
    if raw.trim().is_empty() {
        return NO_ADDRESS.to_string();
    }
    match cleaner.format_address(raw) {
        Ok(address) if !address.trim().is_empty() => address.trim().to_string(),
        Ok(_) => fallback_address(raw),
        Err(e) => {
            tracing::warn!(error = %e, "address cleanup failed, using fallback");
            fallback_address(raw)
        }
    }
}

// ---------------------------------------------------------------------------
// Heuristics
// ---------------------------------------------------------------------------

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static NOISE_RE: OnceLock<Regex> = OnceLock::new();

fn email_re() -> &'static Regex {
    EMAIL_RE.get_or_init(|| Regex::new(r"\S+@\S+").expect("static regex"))
}

/// Phone labels and the punctuation phone numbers leave behind.
fn noise_re() -> &'static Regex {
    NOISE_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(tel|telephone|phone|mob|mobile|email|e-mail|contact)\b\.?:?|[0-9+#*()\[\]:]")
            .expect("static regex")
    })
}

/// First segment of `raw` that still reads like a name once e-mail
/// addresses, digits and phone labels are removed; `Resident` otherwise.
pub fn fallback_name(raw: &str) -> String {
    let without_email = email_re().replace_all(raw, " ");
    without_email
        .split([',', ';', '/', '|', '\n'])
        .map(|seg| {
            let cleaned = noise_re().replace_all(seg, " ");
            cleaned
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace())
                .to_string()
        })
        .find(|seg| seg.chars().any(char::is_alphabetic))
        .unwrap_or_else(|| DEFAULT_NAME.to_string())
}

/// Comma- or newline-separated parts, one per line.
pub fn fallback_address(raw: &str) -> String {
    let lines: Vec<&str> = raw
        .split([',', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        NO_ADDRESS.to_string()
    } else {
        lines.join("\n")
    }
}

/// Cleaner that only applies the local heuristics.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicCleaner;

impl TextCleaner for HeuristicCleaner {
    fn clean_name(&self, raw: &str) -> Result<String> {
        Ok(fallback_name(raw))
    }

    fn format_address(&self, raw: &str) -> Result<String> {
        Ok(fallback_address(raw))
    }
}

// ---------------------------------------------------------------------------
// ChatCleaner
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Cleaner backed by an OpenAI-compatible chat-completions endpoint.
pub struct ChatCleaner {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatCleaner {
    pub fn new(cfg: &CleanupConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: api_key.into(),
        })
    }

    fn ask(&self, prompt: String, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": max_tokens,
        });
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NoticeError::Cleanup(format!("endpoint returned {status}")));
        }
        let parsed: ChatResponse = resp.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| NoticeError::Cleanup("response had no content".into()))
    }
}

impl TextCleaner for ChatCleaner {
    fn clean_name(&self, raw: &str) -> Result<String> {
        self.ask(
            format!(
                "Extract the name including the person's title from the following text. \
                 Only provide the name, no additional text. If there is no obvious name, \
                 return '{DEFAULT_NAME}': '{raw}'"
            ),
            50,
        )
    }

    fn format_address(&self, raw: &str) -> Result<String> {
        self.ask(
            format!(
                "Format the following address for a letter with proper line breaks. \
                 Only provide the formatted address, no additional text: '{raw}'"
            ),
            150,
        )
    }
}

/// The configured cleaner; the heuristics when cleanup is off or has no API key.
pub fn cleaner_from_config(cfg: Option<&CleanupConfig>) -> Result<Box<dyn TextCleaner>> {
    let Some(cfg) = cfg else {
        return Ok(Box::new(HeuristicCleaner));
    };
    match std::env::var(&cfg.api_key_env) {
        Ok(key) if !key.is_empty() => Ok(Box::new(ChatCleaner::new(cfg, key)?)),
        _ => {
            tracing::warn!(
                env = %cfg.api_key_env,
                "cleanup API key not set, using heuristic name and address cleanup"
            );
            Ok(Box::new(HeuristicCleaner))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    struct Failing;

    impl TextCleaner for Failing {
        fn clean_name(&self, _: &str) -> Result<String> {
            Err(NoticeError::Cleanup("offline".into()))
        }

        fn format_address(&self, _: &str) -> Result<String> {
            Err(NoticeError::Cleanup("offline".into()))
        }
    }

    fn chat_config(url: &str) -> CleanupConfig {
        CleanupConfig {
            endpoint: format!("{url}/v1/chat/completions"),
            model: "gpt-4o".into(),
            api_key_env: "NOTICES_TEST_KEY".into(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn fallback_name_strips_noise() {
        assert_eq!(
            fallback_name("Mr J Smith 07700 900123 j.smith@example.com"),
            "Mr J Smith"
        );
        assert_eq!(fallback_name("07700900123 / Mrs Jones"), "Mrs Jones");
        assert_eq!(fallback_name("Tel: 0113 496 0000"), DEFAULT_NAME);
        assert_eq!(fallback_name("someone@example.com"), DEFAULT_NAME);
    }

    #[test]
    fn fallback_address_splits_lines() {
        assert_eq!(
            fallback_address("12 Oak St, Leeds,  LS1 1AA "),
            "12 Oak St\nLeeds\nLS1 1AA"
        );
        assert_eq!(fallback_address(" , "), NO_ADDRESS);
    }

    #[test]
    fn blank_inputs_use_sentinels() {
        assert_eq!(display_name(&HeuristicCleaner, "  "), DEFAULT_NAME);
        assert_eq!(display_address(&HeuristicCleaner, ""), NO_ADDRESS);
    }

    #[test]
    fn collaborator_failure_degrades() {
        assert_eq!(display_name(&Failing, "Ms A Brown, 0770"), "Ms A Brown");
        assert_eq!(display_address(&Failing, "1 Oak St, Leeds"), "1 Oak St\nLeeds");
    }

    #[test]
    fn chat_cleaner_reads_first_choice() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer k")
            .match_body(Matcher::Regex("Extract the name".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":" Mr John Smith \n"}}]}"#)
            .create();
        let cleaner = ChatCleaner::new(&chat_config(&server.url()), "k").unwrap();
        assert_eq!(
            display_name(&cleaner, "john smith mr 0770 j@x.com"),
            "Mr John Smith"
        );
        mock.assert();
    }

    #[test]
    fn chat_cleaner_error_status_falls_back() {
        let mut server = Server::new();
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .create();
        let cleaner = ChatCleaner::new(&chat_config(&server.url()), "k").unwrap();
        assert!(matches!(
            cleaner.format_address("1 Oak St"),
            Err(NoticeError::Cleanup(_))
        ));
        assert_eq!(display_address(&cleaner, "1 Oak St, Leeds"), "1 Oak St\nLeeds");
    }
}
