/// Whether a subject filter matches a concrete subject.
///
/// `*` matches exactly one token, a trailing `>` matches one or more.
pub fn matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return filter_tokens.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(f), Some(s)) if f == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether the subject is a non-empty sequence of non-empty tokens.
pub fn is_valid(subject: &str) -> bool {
    !subject.is_empty()
        && subject
            .split('.')
            .all(|token| !token.is_empty() && !token.contains(char::is_whitespace))
}

/// Whether the subject contains wildcard tokens.
pub fn is_wildcard(subject: &str) -> bool {
    subject.split('.').any(|token| token == "*" || token == ">")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_subjects_match_exactly() {
        assert!(matches("foo.bar", "foo.bar"));
        assert!(!matches("foo.bar", "foo.baz"));
        assert!(!matches("foo", "foo.bar"));
        assert!(!matches("foo.bar", "foo"));
    }

    #[test]
    fn test_star_matches_one_token() {
        assert!(matches("foo.*", "foo.bar"));
        assert!(matches("*.bar", "foo.bar"));
        assert!(!matches("foo.*", "foo.bar.baz"));
        assert!(!matches("foo.*", "foo"));
    }

    #[test]
    fn test_gt_matches_the_rest() {
        assert!(matches("foo.>", "foo.bar"));
        assert!(matches("foo.>", "foo.bar.baz"));
        assert!(!matches("foo.>", "foo"));
        assert!(matches(">", "anything.at.all"));
    }

    #[test]
    fn test_validity() {
        assert!(is_valid("StreamResponsePrefix.123-abc.foo"));
        assert!(!is_valid(""));
        assert!(!is_valid("foo..bar"));
        assert!(!is_valid("foo bar"));
        assert!(is_wildcard("foo.*"));
        assert!(!is_wildcard("foo.bar"));
    }
}
