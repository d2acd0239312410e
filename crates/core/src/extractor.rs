use crate::profile::{Profile, ProfileRole};
use crate::synonyms::SynonymTable;
use crate::CapabilityError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::warn;

const CANDIDATE_TEXT_LIMIT: usize = 4_000;
const REQUIREMENT_TEXT_LIMIT: usize = 3_000;

/// Turns free text into a [`Profile`]. Never fails: on any error an empty profile is returned.
#[async_trait]
pub trait ProfileExtractor: Send + Sync {
    async fn extract(&self, text: &str, role: ProfileRole) -> Profile;
}

#[async_trait]
impl<T: ProfileExtractor + ?Sized> ProfileExtractor for Box<T> {
    async fn extract(&self, text: &str, role: ProfileRole) -> Profile {
        (**self).extract(text, role).await
    }
}

#[derive(Debug, Clone)]
pub struct LlmEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Profile extraction through an OpenAI-compatible chat completions endpoint.
pub struct LlmProfileExtractor {
    config: LlmEndpointConfig,
    client: Client,
}

impl LlmProfileExtractor {
    pub fn new(config: LlmEndpointConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn request(&self, text: &str, role: ProfileRole) -> Result<Profile, CapabilityError> {
        let payload = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt(text, role),
            }],
            temperature: 0.1,
            max_tokens: 1_000,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );
        let mut request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(CapabilityError::Unavailable {
                service: "profile extraction".to_string(),
                details: format!("{url} returned {}", response.status()),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CapabilityError::BackendResponse {
                backend: "profile extraction".to_string(),
                details: "response has no choices".to_string(),
            })?;

        let value: Value = serde_json::from_str(&strip_code_fences(&content))?;
        Ok(Profile::from_json(role, &value))
    }
}

#[async_trait]
impl ProfileExtractor for LlmProfileExtractor {
    async fn extract(&self, text: &str, role: ProfileRole) -> Profile {
        match self.request(text, role).await {
            Ok(profile) => profile,
            Err(error) => {
                warn!(?role, %error, "profile extraction failed, using empty profile");
                Profile::default()
            }
        }
    }
}

fn prompt(text: &str, role: ProfileRole) -> String {
    match role {
        ProfileRole::Candidate => format!(
            "Extract a profile of this CV as a JSON object with the keys \
             \"skills\", \"domain\", \"experience_keywords\", \"project_keywords\", \
             \"certifications\" and \"implied_capabilities\". Every key except \"domain\" \
             holds a list of strings. Reply with the JSON object only.\n\nCV text:\n{}",
            truncate_chars(text, CANDIDATE_TEXT_LIMIT)
        ),
        ProfileRole::Requirement => format!(
            "Extract a profile of these requirements as a JSON object with the keys \
             \"required_skills\", \"domain\", \"keywords\", \"certifications\" and \
             \"implied_skills\". Every key except \"domain\" holds a list of strings. \
             Reply with the JSON object only.\n\nRequirements text:\n{}",
            truncate_chars(text, REQUIREMENT_TEXT_LIMIT)
        ),
    }
}

pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub fn strip_code_fences(raw: &str) -> String {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    match FENCE.get_or_init(|| Regex::new(r"```(?:json)?").ok()) {
        Some(fence) => fence.replace_all(raw, "").trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Offline extractor: every synonym-table term found as a whole phrase in the text
/// becomes a skill, and table concepts linked to two or more found terms become implied.
pub struct VocabularyExtractor {
    table: Arc<SynonymTable>,
    patterns: Vec<(String, Regex)>,
}

impl VocabularyExtractor {
    pub fn new(table: Arc<SynonymTable>) -> Self {
        let mut terms = table.vocabulary().map(str::to_string).collect::<Vec<_>>();
        terms.sort_unstable();
        terms.dedup();

        let patterns = terms
            .into_iter()
            .filter_map(|term| {
                let pattern = format!(r"(?i)(?:^|[^\w]){}(?:$|[^\w])", regex::escape(&term));
                Regex::new(&pattern).ok().map(|regex| (term, regex))
            })
            .collect();

        Self { table, patterns }
    }

    fn found_terms(&self, text: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(term, _)| term.clone())
            .collect()
    }
}

#[async_trait]
impl ProfileExtractor for VocabularyExtractor {
    async fn extract(&self, text: &str, _role: ProfileRole) -> Profile {
        let skills = self.found_terms(text);
        let mut implied = self
            .table
            .vocabulary()
            .filter(|concept| !skills.iter().any(|skill| skill.as_str() == *concept))
            .filter(|concept| {
                self.table
                    .related(concept)
                    .iter()
                    .filter(|term| skills.contains(term))
                    .count()
                    >= 2
            })
            .map(str::to_string)
            .collect::<Vec<_>>();
        implied.sort_unstable();
        implied.dedup();

        Profile {
            skills,
            implied,
            ..Profile::default()
        }
    }
}
