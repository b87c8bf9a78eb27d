// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workflow ids and deterministic port allocation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorktreeError;

/// First backend port.
pub const BACKEND_PORT_BASE: u16 = 9100;

/// First frontend port. Always `backend + 100`.
pub const FRONTEND_PORT_BASE: u16 = 9200;

/// Number of port slots shared by all workflows.
pub const PORT_SLOTS: u16 = 15;

/// Length of a workflow id.
pub const ID_LEN: usize = 8;

/// Backend/frontend port pair owned by one workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortPair {
    pub backend: u16,
    pub frontend: u16,
}

impl std::fmt::Display for PortPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "backend={} frontend={}", self.backend, self.frontend)
    }
}

/// New random workflow id: 8 lowercase hex characters.
pub fn generate_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

/// Check that `id` is 8 lowercase hex characters.
pub fn validate_id(id: &str) -> Result<(), WorktreeError> {
    let ok = id.len() == ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if ok {
        Ok(())
    } else {
        Err(WorktreeError::InvalidId(id.to_string()))
    }
}

/// Ports for a workflow id.
///
/// The first 8 characters are read as a base-36 number and reduced modulo
/// the slot count, so the same id always maps to the same pair.
pub fn ports_for(id: &str) -> Result<PortPair, WorktreeError> {
    let prefix: String = id.chars().take(ID_LEN).collect();
    let value = u64::from_str_radix(&prefix, 36)
        .map_err(|_| WorktreeError::InvalidId(id.to_string()))?;
    let slot = (value % u64::from(PORT_SLOTS)) as u16;
    Ok(PortPair {
        backend: BACKEND_PORT_BASE + slot,
        frontend: FRONTEND_PORT_BASE + slot,
    })
}

/// Branch name for a workflow's worktree.
pub fn branch_name(issue_number: u64, id: &str) -> String {
    format!("feat/issue-{issue_number}-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_shape() {
        for _ in 0..100 {
            let id = generate_id();
            assert!(validate_id(&id).is_ok(), "bad id {id}");
        }
    }

    #[test]
    fn test_generate_id_varies() {
        let ids: std::collections::HashSet<String> = (0..50).map(|_| generate_id()).collect();
        assert!(ids.len() > 45);
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("a1b2c3d4").is_ok());
        assert!(validate_id("A1B2C3D4").is_err());
        assert!(validate_id("a1b2c3d").is_err());
        assert!(validate_id("a1b2c3dz").is_err());
    }

    #[test]
    fn test_ports_for_known_id() {
        let ports = ports_for("a1b2c3d4").unwrap();
        assert_eq!(ports, PortPair { backend: 9101, frontend: 9201 });
    }

    #[test]
    fn test_ports_for_is_deterministic_and_in_range() {
        for _ in 0..200 {
            let id = generate_id();
            let a = ports_for(&id).unwrap();
            let b = ports_for(&id).unwrap();
            assert_eq!(a, b);
            assert!((9100..=9114).contains(&a.backend));
            assert_eq!(a.frontend, a.backend + 100);
        }
    }

    #[test]
    fn test_ports_for_uses_first_eight_chars() {
        assert_eq!(ports_for("a1b2c3d4").unwrap(), ports_for("a1b2c3d4-extra").unwrap());
    }

    #[test]
    fn test_ports_for_rejects_non_base36() {
        assert!(ports_for("a1b2-3d4").is_err());
        assert!(ports_for("").is_err());
    }

    #[test]
    fn test_branch_name() {
        assert_eq!(branch_name(42, "a1b2c3d4"), "feat/issue-42-a1b2c3d4");
    }
}
