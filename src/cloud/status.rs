//! The only two things the orchestrator needs to know about cloud-engine
//! status strings (§4.5): the terminal-success set and the failure suffix.

pub const TERMINAL_SUCCESS: [&str; 3] = ["CREATE_COMPLETE", "UPDATE_COMPLETE", "DELETE_COMPLETE"];

pub fn is_terminal_success(status: &str) -> bool {
    TERMINAL_SUCCESS.contains(&status)
}

pub fn is_failed(status: &str) -> bool {
    status.ends_with("FAILED")
}

pub fn is_terminal(status: &str) -> bool {
    is_terminal_success(status) || is_failed(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_terminal_success_statuses() {
        assert!(is_terminal_success("CREATE_COMPLETE"));
        assert!(is_terminal_success("UPDATE_COMPLETE"));
        assert!(is_terminal_success("DELETE_COMPLETE"));
        assert!(!is_terminal_success("CREATE_IN_PROGRESS"));
    }

    #[test]
    fn recognizes_any_failed_suffix() {
        assert!(is_failed("CREATE_FAILED"));
        assert!(is_failed("ROLLBACK_FAILED"));
        assert!(!is_failed("CREATE_COMPLETE"));
    }
}
