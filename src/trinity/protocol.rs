// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Divergence and convergence.

use std::time::Duration;

use tracing::{info, instrument, warn};

#[cfg(feature = "telemetry")]
use std::time::Instant;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::config::{DEFAULT_TRINITY_MAX_TOKENS, DEFAULT_TRINITY_TIMEOUT_SECS};
use crate::error::TrinityError;
use crate::providers::TrinityClients;

use super::prompts::{convergence_prompt, divergence_prompt, role_system, CONVERGENCE_SYSTEM};
use super::types::{Issue, PlanDraft, Role, TrinityPerspective, TrinityPlan};

/// Characters of a bad response kept in [`TrinityError::InvalidJson`].
const EXCERPT_CHARS: usize = 500;

/// Runs the Trinity protocol over three role-bound clients.
///
/// One pass per call: no retries happen here. Wrap the clients in
/// [`crate::providers::ResilientClient`] for that.
pub struct TrinityProtocol {
    clients: TrinityClients,
    max_tokens: u32,
    timeout: Duration,
}

impl TrinityProtocol {
    pub fn new(clients: TrinityClients) -> Self {
        Self {
            clients,
            max_tokens: DEFAULT_TRINITY_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TRINITY_TIMEOUT_SECS),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn clients(&self) -> &TrinityClients {
        &self.clients
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Model id each role will use, in role order.
    pub fn models(&self) -> [String; 3] {
        Role::ALL.map(|role| self.clients.get(role).model())
    }

    /// Diverge then converge.
    #[instrument(skip(self, issue, repo_context), fields(issue = issue.number))]
    pub async fn execute(
        &self,
        adw_id: &str,
        issue: &Issue,
        repo_context: Option<&str>,
    ) -> Result<TrinityPlan, TrinityError> {
        let perspectives = self.diverge(issue, repo_context).await;
        self.converge(adw_id, issue, perspectives).await
    }

    /// Ask all three roles concurrently.
    ///
    /// Always returns three perspectives in role order; a failed call becomes
    /// a perspective with `success == false`.
    pub async fn diverge(&self, issue: &Issue, repo_context: Option<&str>) -> Vec<TrinityPerspective> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let (architect, critic, advocate) = tokio::join!(
            self.call_role(Role::Architect, issue, repo_context),
            self.call_role(Role::Critic, issue, repo_context),
            self.call_role(Role::Advocate, issue, repo_context),
        );

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("trinity.diverge", start.elapsed());

        let perspectives = vec![architect, critic, advocate];
        let succeeded = perspectives.iter().filter(|p| p.success).count();
        info!(succeeded, total = perspectives.len(), "Divergence complete");
        perspectives
    }

    async fn call_role(&self, role: Role, issue: &Issue, repo_context: Option<&str>) -> TrinityPerspective {
        let client = self.clients.get(role);
        let prompt = divergence_prompt(role, issue, repo_context);

        match client
            .complete(&prompt, Some(role_system(role)), self.max_tokens, self.timeout)
            .await
        {
            Ok(response) => TrinityPerspective::from_response(role, response),
            Err(e) => {
                warn!(role = %role, provider = client.provider(), "Perspective failed: {}", e);
                TrinityPerspective::failed(role, client.as_ref(), &e)
            }
        }
    }

    /// Synthesize a plan with the Architect's client.
    ///
    /// Runs even if the Architect failed during divergence. Provider errors
    /// and unparseable output propagate.
    pub async fn converge(
        &self,
        adw_id: &str,
        issue: &Issue,
        perspectives: Vec<TrinityPerspective>,
    ) -> Result<TrinityPlan, TrinityError> {
        let text = |role: Role| {
            perspectives
                .iter()
                .find(|p| p.role == role)
                .map_or(super::types::NOT_AVAILABLE, |p| p.text())
        };
        let prompt = convergence_prompt(
            issue,
            text(Role::Architect),
            text(Role::Critic),
            text(Role::Advocate),
        );

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let response = self
            .clients
            .architect
            .complete(&prompt, Some(CONVERGENCE_SYSTEM), self.max_tokens, self.timeout)
            .await
            .map_err(TrinityError::Convergence)?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("trinity.converge", start.elapsed());

        let draft = parse_plan_response(&response.content)?;
        let plan = TrinityPlan::assemble(adw_id, issue, perspectives, draft, &response);

        info!(
            adw_id,
            complexity = %plan.estimated_complexity,
            total_tokens = plan.total_tokens,
            "Convergence complete"
        );
        Ok(plan)
    }
}

/// Strip one leading ```` ```json ```` or ```` ``` ```` fence and one trailing fence.
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let mut text = content.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse the synthesizer's reply into a [`PlanDraft`].
///
/// Text that is not JSON is [`TrinityError::InvalidJson`]. Missing keys
/// take defaults; a non-object or a field of the wrong type is
/// [`TrinityError::InvalidPlan`].
pub fn parse_plan_response(content: &str) -> Result<PlanDraft, TrinityError> {
    let text = strip_code_fence(content);

    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| TrinityError::InvalidJson {
        message: e.to_string(),
        excerpt: text.chars().take(EXCERPT_CHARS).collect(),
    })?;

    if !value.is_object() {
        return Err(TrinityError::InvalidPlan("expected a JSON object".to_string()));
    }

    serde_json::from_value(value).map_err(|e| TrinityError::InvalidPlan(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trinity::types::Complexity;

    const PLAN_JSON: &str = r#"{
        "summary": "Add export",
        "approach": "Stream rows",
        "files_to_modify": ["src/api.rs"],
        "files_to_create": ["src/export.rs"],
        "test_strategy": "Integration tests",
        "risks": ["Large files"],
        "estimated_complexity": "Medium"
    }"#;

    #[test]
    fn test_parse_plain_json() {
        let draft = parse_plan_response(PLAN_JSON).unwrap();
        assert_eq!(draft.summary, "Add export");
        assert_eq!(draft.files_to_create, vec!["src/export.rs"]);
        assert_eq!(draft.estimated_complexity, Complexity::Medium);
    }

    #[test]
    fn test_parse_fenced_json() {
        let fenced = format!("```json\n{PLAN_JSON}\n```");
        assert_eq!(parse_plan_response(&fenced).unwrap().approach, "Stream rows");

        let bare_fence = format!("  ```\n{PLAN_JSON}```  ");
        assert!(parse_plan_response(&bare_fence).is_ok());
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_plan_response("Here is the plan: do the thing").unwrap_err();
        match err {
            TrinityError::InvalidJson { excerpt, .. } => {
                assert_eq!(excerpt, "Here is the plan: do the thing");
            }
            other => panic!("expected InvalidJson, got {other:?}"),
        }
    }

    #[test]
    fn test_excerpt_is_truncated() {
        let long = "x".repeat(2_000);
        match parse_plan_response(&long).unwrap_err() {
            TrinityError::InvalidJson { excerpt, .. } => assert_eq!(excerpt.len(), 500),
            other => panic!("expected InvalidJson, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fills_missing_fields() {
        let draft = parse_plan_response(r#"{"summary": "only this"}"#).unwrap();
        assert_eq!(draft.summary, "only this");
        assert_eq!(draft.approach, "");
        assert_eq!(draft.test_strategy, "");
        assert!(draft.files_to_create.is_empty());
        assert!(draft.risks.is_empty());
        assert_eq!(draft.estimated_complexity, Complexity::Medium);
    }

    #[test]
    fn test_parse_keeps_unknown_complexity() {
        let draft = parse_plan_response(
            r#"{"summary": "s", "approach": "a", "estimated_complexity": "moderate"}"#,
        )
        .unwrap();
        assert_eq!(draft.estimated_complexity, Complexity::Other("moderate".to_string()));
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        let err = parse_plan_response("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, TrinityError::InvalidPlan(_)));

        let err = parse_plan_response(r#"{"summary": 42}"#).unwrap_err();
        assert!(matches!(err, TrinityError::InvalidPlan(_)));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("{}"), "{}");
    }
}
