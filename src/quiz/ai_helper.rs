use chatgpt::prelude::*;
use chatgpt::types::CompletionResponse;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::quiz::Country;

const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_CACHED: usize = 256;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Destination {
    pub country: String,
    #[serde(rename = "countryKo")]
    pub country_ko: String,
    pub reason: String,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Recommendation {
    #[serde(rename = "recommendations")]
    pub top3: Vec<Destination>,
    pub summary: String,
    #[serde(default)]
    pub used_ai: bool,
}

impl Recommendation {
    /// Served when no model is configured or the model misbehaves.
    pub fn fallback() -> Self {
        let destination = |country: &str, country_ko: &str, reason: &str, score| Destination {
            country: country.to_string(),
            country_ko: country_ko.to_string(),
            reason: reason.to_string(),
            score,
        };

        Self {
            top3: vec![
                destination(
                    "Japan",
                    "일본",
                    "Varied culture, great food and easy public transport make it an easy first trip.",
                    90,
                ),
                destination(
                    "Italy",
                    "이탈리아",
                    "Deep history, world-class art and one of the best food cultures anywhere.",
                    85,
                ),
                destination(
                    "Thailand",
                    "태국",
                    "Affordable, friendly and full of beautiful nature.",
                    80,
                ),
            ],
            summary: "A balanced mix of culture, food and nature.".to_string(),
            used_ai: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum QuizHelperError {
    #[error("chatgpt request failed: {0}")]
    ChatGPTError(#[from] chatgpt::err::Error),
    #[error("chatgpt reply is not a recommendation: {0}")]
    MalformedReply(#[from] serde_json::Error),
    #[error("chatgpt reply has no JSON object")]
    NoJsonInReply,
}

/// Suggests travel destinations once a run is over, using the countries
/// the player got right.
pub struct QuizHelper {
    chat_gpt: Option<ChatGPT>,
    cache: Mutex<HashMap<String, (Instant, Recommendation)>>,
}

impl QuizHelper {
    pub fn new(chat_gpt: Option<ChatGPT>) -> Self {
        Self {
            chat_gpt,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn offline() -> Self {
        Self::new(None)
    }

    pub async fn recommend_destinations(&self, known: &[&Country]) -> Recommendation {
        let Some(chat_gpt) = &self.chat_gpt else {
            return Recommendation::fallback();
        };

        let key = cache_key(known);
        if let Some(cached) = self.cached(&key, Instant::now()) {
            debug!("Serving cached recommendation for [{}]", key);
            return cached;
        }

        match self.ask(chat_gpt, known).await {
            Ok(recommendation) => {
                self.remember(key, recommendation.clone(), Instant::now());
                recommendation
            }
            Err(err) => {
                // Sometimes it times out, a canned answer is better than none
                warn!("Falling back to the static recommendation: {}", err);
                Recommendation::fallback()
            }
        }
    }

    fn cached(&self, key: &str, now: Instant) -> Option<Recommendation> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|(at, _)| is_fresh(*at, now))
            .map(|(_, recommendation)| recommendation.clone())
    }

    /// Stores a reply, dropping expired ones first. When the cache is still
    /// full the oldest entry makes room.
    fn remember(&self, key: String, recommendation: Recommendation, now: Instant) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, (at, _)| is_fresh(*at, now));

        if cache.len() >= MAX_CACHED && !cache.contains_key(&key) {
            let oldest = cache
                .iter()
                .min_by_key(|(_, (at, _))| *at)
                .map(|(stale, _)| stale.clone());
            if let Some(oldest) = oldest {
                cache.remove(&oldest);
            }
        }
        cache.insert(key, (now, recommendation));
    }

    async fn ask(
        &self,
        chat_gpt: &ChatGPT,
        known: &[&Country],
    ) -> std::result::Result<Recommendation, QuizHelperError> {
        let prompt = build_prompt(known);
        debug!("Asking for a recommendation: {:?}", prompt);

        let response: CompletionResponse = chat_gpt.send_message(&prompt).await?;
        let content = response.message().clone().content;
        debug!("Completion: {:?}", content);

        parse_reply(&content)
    }
}

fn is_fresh(at: Instant, now: Instant) -> bool {
    now.saturating_duration_since(at) < CACHE_TTL
}

fn cache_key(known: &[&Country]) -> String {
    let mut codes: Vec<&str> = known.iter().map(|c| c.iso3.as_str()).collect();
    codes.sort_unstable();
    codes.join(",")
}

fn build_prompt(known: &[&Country]) -> String {
    let visited = if known.is_empty() {
        "none yet".to_string()
    } else {
        known
            .iter()
            .map(|c| c.name_en.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "You are a travel expert. A player just finished a geography quiz and correctly placed these countries: {}.
        Recommend the three countries they would most enjoy travelling to next, and explain each choice in 2-3 sentences.
        Reply with JSON only, in this shape:
        {{\"recommendations\": [{{\"country\": \"English name\", \"countryKo\": \"Korean name\", \"reason\": \"...\", \"score\": 95}}], \"summary\": \"2-3 sentences\"}}",
        visited
    )
}

fn parse_reply(content: &str) -> std::result::Result<Recommendation, QuizHelperError> {
    // Models like to wrap JSON in code fences
    let start = content.find('{').ok_or(QuizHelperError::NoJsonInReply)?;
    let end = content.rfind('}').ok_or(QuizHelperError::NoJsonInReply)?;
    if end < start {
        return Err(QuizHelperError::NoJsonInReply);
    }

    let mut recommendation: Recommendation = serde_json::from_str(&content[start..=end])?;
    recommendation.top3.truncate(3);
    recommendation.used_ai = true;
    Ok(recommendation)
}
