// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Three-role review with consensus scoring.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::prompts::{review_prompt, REVIEW_SYSTEM};
use super::protocol::{strip_code_fence, TrinityProtocol};
use super::types::Role;

/// Consensus score at or above which a review approves.
pub const APPROVAL_THRESHOLD: f64 = 0.7;

/// Rating used when a response gives no signal.
pub const NEUTRAL_RATING: f64 = 0.7;

/// Cap on heuristically extracted issues or suggestions.
const MAX_ITEMS: usize = 10;

const POSITIVE_WORDS: [&str; 6] = ["good", "excellent", "well", "correct", "clean", "proper"];
const NEGATIVE_WORDS: [&str; 7] = ["bad", "issue", "problem", "bug", "error", "missing", "wrong"];

static ISSUES_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)issue|problem|concern").unwrap());
static SUGGESTIONS_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)suggest|recommend").unwrap());

/// One role's review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPerspective {
    pub role: Role,
    pub provider: String,
    pub model: String,
    pub category: String,
    pub rating: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub raw_content: String,
    pub tokens_used: u32,
    pub latency_ms: f64,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Aggregated review result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub perspectives: Vec<ReviewPerspective>,
    pub consensus_score: f64,
    pub approved: bool,
    pub approval_threshold: f64,
    pub total_tokens: u32,
    pub total_latency_ms: f64,
}

impl ReviewOutcome {
    pub fn from_perspectives(perspectives: Vec<ReviewPerspective>) -> Self {
        let consensus_score = compute_consensus(&perspectives);
        Self {
            total_tokens: perspectives.iter().map(|p| p.tokens_used).sum(),
            total_latency_ms: perspectives.iter().map(|p| p.latency_ms).sum(),
            approved: consensus_score >= APPROVAL_THRESHOLD,
            approval_threshold: APPROVAL_THRESHOLD,
            consensus_score,
            perspectives,
        }
    }
}

#[derive(Deserialize)]
struct JsonReview {
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    issues: Vec<serde_json::Value>,
    #[serde(default)]
    suggestions: Vec<serde_json::Value>,
}

fn value_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Extract `(rating, issues, suggestions)` from a review reply.
///
/// JSON replies are read directly with the rating clamped to `0..=1`.
/// Anything else falls back to scanning for issue and suggestion sections
/// and scoring keyword sentiment.
pub fn parse_review_response(content: &str) -> (f64, Vec<String>, Vec<String>) {
    if let Ok(review) = serde_json::from_str::<JsonReview>(strip_code_fence(content)) {
        let rating = review.rating.unwrap_or(NEUTRAL_RATING).clamp(0.0, 1.0);
        return (
            rating,
            review.issues.into_iter().map(value_text).collect(),
            review.suggestions.into_iter().map(value_text).collect(),
        );
    }

    #[derive(PartialEq)]
    enum Section {
        Issues,
        Suggestions,
    }

    let mut issues = Vec::new();
    let mut suggestions = Vec::new();
    let mut section: Option<Section> = None;

    for line in content.lines() {
        if ISSUES_HEADING.is_match(line) {
            section = Some(Section::Issues);
        } else if SUGGESTIONS_HEADING.is_match(line) {
            section = Some(Section::Suggestions);
        } else if let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            match section {
                Some(Section::Issues) => issues.push(item.trim().to_string()),
                Some(Section::Suggestions) => suggestions.push(item.trim().to_string()),
                None => {}
            }
        }
    }

    let lower = content.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let rating = if positive + negative > 0 {
        (positive + 1) as f64 / (positive + negative + 2) as f64
    } else {
        NEUTRAL_RATING
    };

    issues.truncate(MAX_ITEMS);
    suggestions.truncate(MAX_ITEMS);
    (rating, issues, suggestions)
}

/// Mean rating of successful reviews, or 0.0 when none succeeded.
pub fn compute_consensus(perspectives: &[ReviewPerspective]) -> f64 {
    let ratings: Vec<f64> = perspectives
        .iter()
        .filter(|p| p.success)
        .map(|p| p.rating)
        .collect();
    if ratings.is_empty() {
        return 0.0;
    }
    ratings.iter().sum::<f64>() / ratings.len() as f64
}

impl TrinityProtocol {
    /// Ask all three roles to review `context` and score the result.
    pub async fn review(&self, context: &str) -> ReviewOutcome {
        let (architect, critic, advocate) = tokio::join!(
            self.review_role(Role::Architect, context),
            self.review_role(Role::Critic, context),
            self.review_role(Role::Advocate, context),
        );

        let outcome = ReviewOutcome::from_perspectives(vec![architect, critic, advocate]);
        info!(
            consensus = outcome.consensus_score,
            approved = outcome.approved,
            "Review complete"
        );
        outcome
    }

    async fn review_role(&self, role: Role, context: &str) -> ReviewPerspective {
        let client = self.clients().get(role);
        let prompt = review_prompt(role, context);

        match client
            .complete(&prompt, Some(REVIEW_SYSTEM), self.max_tokens(), self.timeout())
            .await
        {
            Ok(response) => {
                let (rating, issues, suggestions) = parse_review_response(&response.content);
                ReviewPerspective {
                    role,
                    provider: response.provider,
                    model: response.model,
                    category: role.review_category().to_string(),
                    rating,
                    issues,
                    suggestions,
                    raw_content: response.content,
                    tokens_used: response.tokens_used,
                    latency_ms: response.latency_ms,
                    success: true,
                    error_message: None,
                }
            }
            Err(e) => {
                warn!(role = %role, "Review failed: {}", e);
                ReviewPerspective {
                    role,
                    provider: client.provider().to_string(),
                    model: client.model(),
                    category: role.review_category().to_string(),
                    rating: 0.0,
                    issues: Vec::new(),
                    suggestions: Vec::new(),
                    raw_content: String::new(),
                    tokens_used: 0,
                    latency_ms: 0.0,
                    success: false,
                    error_message: Some(e.to_string()),
                }
            }
        }
    }
}
