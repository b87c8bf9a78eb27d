// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Prompt templates for divergence, convergence, and review.

use super::types::{Issue, Role};

/// System prompt for the convergence call.
pub const CONVERGENCE_SYSTEM: &str = "You are a synthesis engine. Respond only with valid JSON.";

/// System prompt shared by the three review calls.
pub const REVIEW_SYSTEM: &str = "You are a code reviewer. Respond with structured JSON feedback.";

/// Role persona used as the divergence system prompt.
pub fn role_system(role: Role) -> &'static str {
    match role {
        Role::Architect => "You are The Architect, a senior systems designer.",
        Role::Critic => "You are The Critic, a security-focused code reviewer.",
        Role::Advocate => "You are The Advocate, a UX and documentation specialist.",
    }
}

fn issue_block(issue: &Issue) -> String {
    format!("Issue: {}\nDescription: {}", issue.title, issue.body)
}

/// Divergence prompt for `role`. Only the Architect sees repository context.
pub fn divergence_prompt(role: Role, issue: &Issue, repo_context: Option<&str>) -> String {
    match role {
        Role::Architect => {
            let context = match repo_context {
                Some(ctx) if !ctx.trim().is_empty() => format!("Repository Context:\n{ctx}"),
                _ => "Repository Context: Not provided".to_string(),
            };
            format!(
                "Analyze this GitHub issue.\n\n{}\n\n{context}\n\n\
                 Provide your analysis covering:\n\
                 1. System design approach\n\
                 2. Component architecture\n\
                 3. Integration points\n\
                 4. Implementation sequence\n\
                 5. Technical debt considerations\n\n\
                 Focus on HOW to build this correctly.",
                issue_block(issue)
            )
        }
        Role::Critic => format!(
            "Analyze this GitHub issue.\n\n{}\n\n\
             Provide your analysis covering:\n\
             1. Security implications\n\
             2. Edge cases and error scenarios\n\
             3. Performance concerns\n\
             4. Testing requirements\n\
             5. Potential vulnerabilities\n\n\
             Focus on WHAT could go wrong.",
            issue_block(issue)
        ),
        Role::Advocate => format!(
            "Analyze this GitHub issue.\n\n{}\n\n\
             Provide your analysis covering:\n\
             1. User experience impact\n\
             2. Documentation requirements\n\
             3. API ergonomics\n\
             4. Error message clarity\n\
             5. Developer experience\n\n\
             Focus on WHO will use this and how.",
            issue_block(issue)
        ),
    }
}

/// Convergence prompt embedding the three perspective texts in role order.
pub fn convergence_prompt(issue: &Issue, architect: &str, critic: &str, advocate: &str) -> String {
    format!(
        r#"You are synthesizing perspectives from three experts into a unified implementation plan.

## Issue
Title: {title}
Description: {body}

## {architect_title}
{architect}

## {critic_title}
{critic}

## {advocate_title}
{advocate}

## Your Task
Synthesize these perspectives into a unified implementation plan.
You MUST respond with a JSON object containing these exact fields:

{{
    "summary": "A single paragraph summarizing the implementation approach",
    "approach": "The high-level technical approach to implement this feature",
    "files_to_modify": ["list", "of", "files", "to", "modify"],
    "files_to_create": ["list", "of", "new", "files"],
    "test_strategy": "How this implementation will be tested",
    "risks": ["Risk 1 and mitigation", "Risk 2 and mitigation"],
    "estimated_complexity": "low or medium or high"
}}

Respond ONLY with the JSON object, no additional text."#,
        title = issue.title,
        body = issue.body,
        architect_title = Role::Architect.title(),
        critic_title = Role::Critic.title(),
        advocate_title = Role::Advocate.title(),
    )
}

/// Review prompt for `role` over an implementation `context`.
pub fn review_prompt(role: Role, context: &str) -> String {
    let (intro, focus) = match role {
        Role::Architect => (
            "You are The Architect reviewing code for correctness and integration.",
            [
                "Code correctness and logic",
                "Integration with existing codebase",
                "Architecture alignment",
                "Error handling completeness",
            ],
        ),
        Role::Critic => (
            "You are The Critic reviewing code for security and edge cases.",
            [
                "Security vulnerabilities",
                "Edge cases and error scenarios",
                "Input validation",
                "Resource management",
            ],
        ),
        Role::Advocate => (
            "You are The Advocate reviewing code for UX and documentation.",
            [
                "API ergonomics",
                "Error message clarity",
                "Documentation completeness",
                "Developer experience",
            ],
        ),
    };

    let focus: String = focus
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}\n", i + 1))
        .collect();

    format!(
        "{intro}\n\n{context}\n\n## Review Focus\n{focus}\n\
         ## Instructions\n\
         Provide a JSON response with:\n\
         - \"rating\": 0.0 to 1.0 (1.0 = perfect)\n\
         - \"issues\": list of identified issues\n\
         - \"suggestions\": list of improvement suggestions\n\n\
         Respond ONLY with the JSON object."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> Issue {
        Issue::new(42, "Add CSV export", "Users want to download reports")
    }

    #[test]
    fn test_architect_prompt_context() {
        let with = divergence_prompt(Role::Architect, &issue(), Some("Rust workspace"));
        assert!(with.contains("Repository Context:\nRust workspace"));

        let without = divergence_prompt(Role::Architect, &issue(), None);
        assert!(without.contains("Repository Context: Not provided"));
    }

    #[test]
    fn test_only_architect_sees_context() {
        let critic = divergence_prompt(Role::Critic, &issue(), Some("secret layout"));
        assert!(!critic.contains("secret layout"));
        assert!(critic.contains("Add CSV export"));
        assert!(critic.contains("WHAT could go wrong"));
    }

    #[test]
    fn test_convergence_prompt_lists_keys() {
        let prompt = convergence_prompt(&issue(), "design", "Not available", "docs");
        for key in [
            "summary",
            "approach",
            "files_to_modify",
            "files_to_create",
            "test_strategy",
            "risks",
            "estimated_complexity",
        ] {
            assert!(prompt.contains(&format!("\"{key}\"")), "missing {key}");
        }
        assert!(prompt.contains("## The Critic (Security & Edge Cases)\nNot available"));
        assert!(prompt.ends_with("Respond ONLY with the JSON object, no additional text."));
    }

    #[test]
    fn test_review_prompt_numbers_focus() {
        let prompt = review_prompt(Role::Critic, "diff here");
        assert!(prompt.contains("1. Security vulnerabilities\n"));
        assert!(prompt.contains("4. Resource management\n"));
        assert!(prompt.contains("diff here"));
    }
}
