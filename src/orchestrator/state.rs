//! The jurisdiction state machine (§4.6).
//!
//! ```text
//! Created --provision--> Provisioning --stack success--> Active
//!    ^                        |
//!    |                        `--stack failure | timeout--> Created
//!    |
//! Inactive (==Created) <--stack DELETE_COMPLETE-- Decommissioning <--decommission-- Active
//! ```
//!
//! `Provisioning` and `Decommissioning` are not stored as a column value:
//! they are implied by `active=false` with a non-terminal status still
//! sitting in `assets.cloudformation_stack`, and exist only for as long as
//! an outstanding monitor job does.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JurisdictionState {
    Created,
    Active,
}

impl JurisdictionState {
    pub fn from_active_flag(active: bool) -> Self {
        if active {
            JurisdictionState::Active
        } else {
            JurisdictionState::Created
        }
    }
}

pub fn can_provision(state: JurisdictionState) -> bool {
    state == JurisdictionState::Created
}

pub fn can_decommission(state: JurisdictionState) -> bool {
    state == JurisdictionState::Active
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_created_jurisdictions_can_be_provisioned() {
        assert!(can_provision(JurisdictionState::Created));
        assert!(!can_provision(JurisdictionState::Active));
    }

    #[test]
    fn only_active_jurisdictions_can_be_decommissioned() {
        assert!(can_decommission(JurisdictionState::Active));
        assert!(!can_decommission(JurisdictionState::Created));
    }
}
