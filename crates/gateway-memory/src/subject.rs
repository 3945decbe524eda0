//! Subject wildcard matching: `*` matches one token, a trailing `>` matches
//! one or more.

/// Whether the concrete `subject` is matched by `pattern`.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) | (None, None) => return true,
            (Some(p), Some(s)) if p == "*" || p == s => {}
            _ => return false,
        }
    }
}

/// Whether some concrete subject is matched by both patterns.
pub fn subjects_overlap(a: &str, b: &str) -> bool {
    let mut a_tokens = a.split('.');
    let mut b_tokens = b.split('.');

    loop {
        match (a_tokens.next(), b_tokens.next()) {
            (Some(">"), Some(_)) | (Some(_), Some(">")) | (None, None) => return true,
            (Some(x), Some(y)) if x == "*" || y == "*" || x == y => {}
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert!(subject_matches("ORDERS.created", "ORDERS.created"));
        assert!(!subject_matches("ORDERS.created", "ORDERS.cancelled"));
        assert!(!subject_matches("ORDERS", "ORDERS.created"));
        assert!(!subject_matches("ORDERS.created", "ORDERS"));
    }

    #[test]
    fn test_single_token_wildcard() {
        assert!(subject_matches("ORDERS.*", "ORDERS.created"));
        assert!(!subject_matches("ORDERS.*", "ORDERS.created.eu"));
        assert!(subject_matches("*.created", "ORDERS.created"));
    }

    #[test]
    fn test_tail_wildcard() {
        assert!(subject_matches("ORDERS.>", "ORDERS.created"));
        assert!(subject_matches("ORDERS.>", "ORDERS.created.eu"));
        assert!(!subject_matches("ORDERS.>", "ORDERS"));
    }

    #[test]
    fn test_namespaced_subjects_are_single_tokens() {
        assert!(subject_matches(
            "tenant:staff:check.permission",
            "tenant:staff:check.permission"
        ));
        assert!(!subject_matches(
            "staff:check.permission",
            "tenant:staff:check.permission"
        ));
    }

    #[test]
    fn test_overlap() {
        assert!(subjects_overlap("ORDERS.created", "ORDERS.created"));
        assert!(subjects_overlap("ORDERS.*", "ORDERS.created"));
        assert!(subjects_overlap("ORDERS.>", "*.created.eu"));
        assert!(!subjects_overlap("ORDERS.created", "ORDER.created"));
        assert!(!subjects_overlap("ORDERS.*", "ORDERS.created.eu"));
    }
}
