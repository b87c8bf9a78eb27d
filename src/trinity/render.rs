// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Plan rendering and persistence.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::TrinityError;
use crate::state::write_atomic;

use super::types::{Role, TrinityPlan};

/// Markdown file name inside a plan directory.
pub const PLAN_MARKDOWN: &str = "plan.md";

/// JSON file name inside a plan directory.
pub const PLAN_JSON: &str = "plan.json";

fn bullet_list(items: &[String], code: bool, empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items
        .iter()
        .map(|item| if code { format!("- `{item}`") } else { format!("- {item}") })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a plan as Markdown.
///
/// Section order is fixed: summary, approach, files, test strategy, risks,
/// the three perspectives, then metadata.
pub fn render_markdown(plan: &TrinityPlan) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = write!(
        out,
        "# Implementation Plan: Issue #{number}\n\n\
         **ADW ID:** {adw_id}\n\
         **Issue Title:** {title}\n\
         **Created:** {created}\n\
         **Complexity:** {complexity}\n\n\
         ---\n\n\
         ## Summary\n\n{summary}\n\n\
         ## Technical Approach\n\n{approach}\n\n\
         ## Files to Modify\n\n{modify}\n\n\
         ## Files to Create\n\n{create}\n\n\
         ## Test Strategy\n\n{tests}\n\n\
         ## Risks and Mitigations\n\n{risks}\n\n\
         ---\n\n\
         ## Trinity Protocol Perspectives\n\n",
        number = plan.issue_number,
        adw_id = plan.adw_id,
        title = plan.issue_title,
        created = plan.created_at.to_rfc3339(),
        complexity = plan.estimated_complexity,
        summary = plan.summary,
        approach = plan.approach,
        modify = bullet_list(&plan.files_to_modify, true, "None"),
        create = bullet_list(&plan.files_to_create, true, "None"),
        tests = plan.test_strategy,
        risks = bullet_list(&plan.risks, false, "None identified"),
    );

    for role in Role::ALL {
        let _ = write!(out, "### {}\n\n{}\n\n", role.title(), plan.perspective_text(role));
    }

    let _ = write!(
        out,
        "---\n\n\
         ## Metadata\n\n\
         - **Total Tokens:** {}\n\
         - **Total Latency:** {:.2}ms\n",
        plan.total_tokens, plan.total_latency_ms
    );

    out
}

/// Write `{specs_dir}/{adw_id}/plan.md` and `plan.json`.
///
/// Returns `(markdown_path, json_path)`.
pub fn save_plan(plan: &TrinityPlan, specs_dir: &Path) -> Result<(PathBuf, PathBuf), TrinityError> {
    let dir = specs_dir.join(&plan.adw_id);
    std::fs::create_dir_all(&dir)?;

    let md_path = dir.join(PLAN_MARKDOWN);
    let json_path = dir.join(PLAN_JSON);

    write_atomic(&md_path, render_markdown(plan).as_bytes(), ".plan_")?;
    let json = serde_json::to_string_pretty(plan)?;
    write_atomic(&json_path, json.as_bytes(), ".plan_")?;

    info!(adw_id = %plan.adw_id, path = %md_path.display(), "Plan saved");
    Ok((md_path, json_path))
}
