//! Keyword classification of requests.
//!
//! The detected use case is informational: it is attached to the response
//! and the metrics record, and never affects which agents run.

use std::fmt;
use std::str::FromStr;

use dispatch_models::Request;
use serde::{Deserialize, Serialize};

/// Metadata key that pins the use case explicitly.
pub const USE_CASE_KEY: &str = "use_case";

/// Broad category of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    SolidityCoding,
    Coding,
    Translation,
    Summarization,
    DataAnalysis,
    WebAnalysis,
    ContentGeneration,
    ImageGeneration,
    Chat,
}

/// Checked in this order; the first hit wins.
const RULES: &[(UseCase, &[&str])] = &[
    (
        UseCase::SolidityCoding,
        &["solidity", "smart contract", "erc20", "erc-20", "erc721", "evm"],
    ),
    (
        UseCase::Coding,
        &[
            "code", "function", "debug", "compile", "python", "rust", "javascript",
            "typescript", "program", "refactor", "algorithm",
        ],
    ),
    (UseCase::Translation, &["translate", "translation", "in french", "in spanish", "in german"]),
    (UseCase::Summarization, &["summarize", "summarise", "summary", "tl;dr", "tldr"]),
    (
        UseCase::DataAnalysis,
        &["analyze data", "analyse data", "dataset", "statistics", "csv", "chart"],
    ),
    (UseCase::WebAnalysis, &["website", "web page", "webpage", "url", "http://", "https://"]),
    (UseCase::ContentGeneration, &["write a", "blog post", "article", "essay", "story", "poem"]),
    (UseCase::ImageGeneration, &["image", "picture", "draw", "illustration", "logo"]),
];

impl UseCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SolidityCoding => "solidity_coding",
            Self::Coding => "coding",
            Self::Translation => "translation",
            Self::Summarization => "summarization",
            Self::DataAnalysis => "data_analysis",
            Self::WebAnalysis => "web_analysis",
            Self::ContentGeneration => "content_generation",
            Self::ImageGeneration => "image_generation",
            Self::Chat => "chat",
        }
    }

    /// Classify a prompt by keywords.
    pub fn classify(prompt: &str) -> Self {
        let prompt = prompt.to_lowercase();
        RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| contains_keyword(&prompt, k)))
            .map(|(use_case, _)| *use_case)
            .unwrap_or(Self::Chat)
    }

    /// Explicit `use_case` metadata if it parses, otherwise [`classify`](Self::classify).
    pub fn detect(request: &Request) -> Self {
        request
            .metadata
            .get(USE_CASE_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| Self::classify(&request.prompt))
    }
}

/// Single words must match whole words; phrases match as substrings.
fn contains_keyword(prompt: &str, keyword: &str) -> bool {
    if keyword.contains(|c: char| !c.is_alphanumeric()) {
        return prompt.contains(keyword);
    }
    prompt
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword)
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UseCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            Self::SolidityCoding,
            Self::Coding,
            Self::Translation,
            Self::Summarization,
            Self::DataAnalysis,
            Self::WebAnalysis,
            Self::ContentGeneration,
            Self::ImageGeneration,
            Self::Chat,
        ];
        let wanted = s.trim().to_lowercase();
        all.into_iter()
            .find(|u| u.as_str() == wanted)
            .ok_or_else(|| format!("unknown use case: {}", s))
    }
}
