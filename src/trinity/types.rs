// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trinity data types: roles, perspectives, and the converged plan.

use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ProviderError, TrinityError};
use crate::types::{LlmResponse, ProviderClient};

/// Placeholder used in place of a failed perspective's text.
pub const NOT_AVAILABLE: &str = "Not available";

// ============================================================================
// Roles
// ============================================================================

/// One of the three Trinity roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System design; also the convergence synthesizer.
    Architect,
    /// Security and edge cases.
    Critic,
    /// UX and documentation.
    Advocate,
}

impl Role {
    /// All roles in divergence order.
    pub const ALL: [Role; 3] = [Role::Architect, Role::Critic, Role::Advocate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Critic => "critic",
            Self::Advocate => "advocate",
        }
    }

    /// Heading used for this role in rendered plans.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Architect => "The Architect (System Design)",
            Self::Critic => "The Critic (Security & Edge Cases)",
            Self::Advocate => "The Advocate (UX & Documentation)",
        }
    }

    /// Category this role covers during review.
    pub fn review_category(&self) -> &'static str {
        match self {
            Self::Architect => "correctness",
            Self::Critic => "security",
            Self::Advocate => "ux",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Issues and perspectives
// ============================================================================

/// The issue a plan is produced for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
}

impl Issue {
    pub fn new(number: u64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// One role's answer during divergence. A failed call is a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrinityPerspective {
    pub role: Role,
    pub provider: String,
    pub model: String,
    pub content: String,
    pub tokens_used: u32,
    pub latency_ms: f64,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TrinityPerspective {
    /// Perspective built from a successful completion.
    pub fn from_response(role: Role, response: LlmResponse) -> Self {
        Self {
            role,
            provider: response.provider,
            model: response.model,
            content: response.content,
            tokens_used: response.tokens_used,
            latency_ms: response.latency_ms,
            success: true,
            error_message: None,
        }
    }

    /// Perspective recording a failed call.
    pub fn failed(role: Role, client: &dyn ProviderClient, error: &ProviderError) -> Self {
        Self {
            role,
            provider: client.provider().to_string(),
            model: client.model(),
            content: String::new(),
            tokens_used: 0,
            latency_ms: 0.0,
            success: false,
            error_message: Some(error.to_string()),
        }
    }

    /// Text to feed into convergence.
    pub fn text(&self) -> &str {
        if self.success {
            &self.content
        } else {
            NOT_AVAILABLE
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Estimated implementation effort.
///
/// Synthesizers sometimes answer outside low/medium/high; that text is kept
/// as [`Complexity::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
    Other(String),
}

impl Complexity {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Other(text) => text,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_lowercase().as_str() {
            "low" => Self::Low,
            "" | "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Other(trimmed.to_string()),
        })
    }
}

impl Serialize for Complexity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Complexity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fields read from the synthesizer's reply. Missing keys take defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlanDraft {
    pub summary: String,
    pub approach: String,
    pub files_to_modify: Vec<String>,
    pub files_to_create: Vec<String>,
    pub test_strategy: String,
    pub risks: Vec<String>,
    pub estimated_complexity: Complexity,
}

/// The converged plan handed from the plan phase to every later phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrinityPlan {
    pub adw_id: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub issue_body: String,

    /// Divergence results in role order.
    pub perspectives: Vec<TrinityPerspective>,

    pub summary: String,
    pub approach: String,
    pub files_to_modify: Vec<String>,
    pub files_to_create: Vec<String>,
    pub test_strategy: String,
    pub risks: Vec<String>,
    pub estimated_complexity: Complexity,

    pub created_at: DateTime<Utc>,
    pub total_tokens: u32,
    pub total_latency_ms: f64,
}

impl TrinityPlan {
    /// Assemble a plan from divergence output and the synthesized draft.
    pub fn assemble(
        adw_id: impl Into<String>,
        issue: &Issue,
        perspectives: Vec<TrinityPerspective>,
        draft: PlanDraft,
        synthesis: &LlmResponse,
    ) -> Self {
        let total_tokens = perspectives.iter().map(|p| p.tokens_used).sum::<u32>() + synthesis.tokens_used;
        let total_latency_ms =
            perspectives.iter().map(|p| p.latency_ms).sum::<f64>() + synthesis.latency_ms;

        Self {
            adw_id: adw_id.into(),
            issue_number: issue.number,
            issue_title: issue.title.clone(),
            issue_body: issue.body.clone(),
            perspectives,
            summary: draft.summary,
            approach: draft.approach,
            files_to_modify: draft.files_to_modify,
            files_to_create: draft.files_to_create,
            test_strategy: draft.test_strategy,
            risks: draft.risks,
            estimated_complexity: draft.estimated_complexity,
            created_at: Utc::now(),
            total_tokens,
            total_latency_ms,
        }
    }

    /// Read a plan previously written by `save_plan`.
    pub fn load(path: &Path) -> Result<Self, TrinityError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The perspective for `role`, if divergence produced one.
    pub fn perspective(&self, role: Role) -> Option<&TrinityPerspective> {
        self.perspectives.iter().find(|p| p.role == role)
    }

    /// Text for `role`, or the placeholder.
    pub fn perspective_text(&self, role: Role) -> &str {
        self.perspective(role).map_or(NOT_AVAILABLE, |p| p.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Critic).unwrap(), "\"critic\"");
        let role: Role = serde_json::from_str("\"advocate\"").unwrap();
        assert_eq!(role, Role::Advocate);
        assert_eq!(Role::Architect.review_category(), "correctness");
    }

    #[test]
    fn test_complexity_is_lenient_on_case() {
        let c: Complexity = serde_json::from_str("\" High \"").unwrap();
        assert_eq!(c, Complexity::High);
        assert_eq!(serde_json::to_string(&Complexity::Medium).unwrap(), "\"medium\"");
    }

    #[test]
    fn test_unknown_complexity_text_is_kept() {
        let c: Complexity = serde_json::from_str("\" moderate \"").unwrap();
        assert_eq!(c, Complexity::Other("moderate".to_string()));
        assert_eq!(c.to_string(), "moderate");
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"moderate\"");
        assert_eq!(Complexity::default(), Complexity::Medium);
    }

    #[test]
    fn test_failed_perspective_text_is_placeholder() {
        let p = TrinityPerspective {
            role: Role::Critic,
            provider: "openai".into(),
            model: "gpt-4o".into(),
            content: String::new(),
            tokens_used: 0,
            latency_ms: 0.0,
            success: false,
            error_message: Some("boom".into()),
        };
        assert_eq!(p.text(), NOT_AVAILABLE);
    }

    #[test]
    fn test_assemble_sums_metrics() {
        let issue = Issue::new(42, "Add export", "Users want CSV");
        let perspectives = vec![
            TrinityPerspective::from_response(
                Role::Architect,
                LlmResponse::new("design", "claude", "anthropic").with_usage(100, 10.0),
            ),
            TrinityPerspective::from_response(
                Role::Critic,
                LlmResponse::new("risks", "gpt-4o", "openai").with_usage(50, 5.0),
            ),
        ];
        let draft = PlanDraft {
            summary: "s".into(),
            approach: "a".into(),
            files_to_modify: vec![],
            files_to_create: vec![],
            test_strategy: "t".into(),
            risks: vec![],
            estimated_complexity: Complexity::Low,
        };
        let synthesis = LlmResponse::new("{}", "claude", "anthropic").with_usage(25, 2.5);

        let plan = TrinityPlan::assemble("a1b2c3d4", &issue, perspectives, draft, &synthesis);
        assert_eq!(plan.total_tokens, 175);
        assert_eq!(plan.total_latency_ms, 17.5);
        assert_eq!(plan.perspective_text(Role::Critic), "risks");
        assert_eq!(plan.perspective_text(Role::Advocate), NOT_AVAILABLE);
    }
}
