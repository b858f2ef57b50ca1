use crate::LoadError;

const MAX_COMMAND_NAME_CHARS: usize = 32;
const INDEX_SEGMENT: &str = "index";
const SOURCE_SUFFIX: &str = ".rs";

/// Splits a declaration location into its routing segments.
///
/// Organisational segments written as `(name)` are dropped, and a `.rs`
/// suffix on the final segment is ignored. A trailing `index` segment
/// collapses into its parent only when two or more segments precede it, so
/// `eco/give/index` is `eco give` while `eco/index` stays the subcommand
/// `eco index`. Both `/` and `\` separate segments.
pub fn declaration_segments(location: &str) -> Result<Vec<String>, LoadError> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return Err(invalid_location(location, "location is empty"));
    }

    let mut segments = trimmed
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !is_organisational_segment(segment))
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();

    if let Some(last) = segments.last_mut() {
        if let Some(stripped) = last.strip_suffix(SOURCE_SUFFIX) {
            *last = stripped.to_string();
        }
    }
    if segments.len() > 2
        && segments
            .last()
            .is_some_and(|last| last.eq_ignore_ascii_case(INDEX_SEGMENT))
    {
        segments.pop();
    }
    segments.retain(|segment| !segment.is_empty());

    if segments.is_empty() {
        return Err(invalid_location(
            location,
            "location has no routable segments",
        ));
    }
    Ok(segments)
}

/// Returns true when `name` is usable as a structured command, group, subcommand, or option name.
pub fn is_valid_command_name(name: &str) -> bool {
    let length = name.chars().count();
    (1..=MAX_COMMAND_NAME_CHARS).contains(&length)
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
}

/// Returns true when `token` can be matched as a single free-text token.
pub fn is_valid_free_text_token(token: &str) -> bool {
    !token.is_empty() && !token.chars().any(char::is_whitespace)
}

fn is_organisational_segment(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('(') && segment.ends_with(')')
}

fn invalid_location(location: &str, reason: &str) -> LoadError {
    LoadError::InvalidLocation {
        location: location.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{declaration_segments, is_valid_command_name, is_valid_free_text_token};
    use crate::LoadError;

    fn segments(location: &str) -> Vec<String> {
        declaration_segments(location).expect("valid location")
    }

    #[test]
    fn unit_declaration_segments_drop_organisational_directories() {
        assert_eq!(segments("(economy)/eco/give"), vec!["eco", "give"]);
        assert_eq!(segments("mod/(internal)/warn"), vec!["mod", "warn"]);
    }

    #[test]
    fn unit_declaration_segments_collapse_trailing_index() {
        assert_eq!(segments("eco/give/index"), vec!["eco", "give"]);
        assert_eq!(segments("(economy)/eco/give/INDEX.rs"), vec!["eco", "give"]);
        assert_eq!(segments("index"), vec!["index"]);
    }

    #[test]
    fn regression_single_parent_index_stays_a_subcommand() {
        assert_eq!(segments("eco/index"), vec!["eco", "index"]);
        assert_eq!(segments("eco/index.rs"), vec!["eco", "index"]);
    }

    #[test]
    fn unit_declaration_segments_accept_mixed_separators_and_suffix() {
        assert_eq!(segments("\\eco\\bank/deposit.rs"), vec!["eco", "bank", "deposit"]);
        assert_eq!(segments("/ping/"), vec!["ping"]);
    }

    #[test]
    fn regression_declaration_segments_reject_empty_locations() {
        for location in ["", "   ", "(group)", "//"] {
            let error = declaration_segments(location).expect_err("location should be rejected");
            assert!(matches!(error, LoadError::InvalidLocation { .. }));
        }
    }

    #[test]
    fn unit_command_name_validation_matches_platform_rules() {
        assert!(is_valid_command_name("pay"));
        assert!(is_valid_command_name("set-nick_2"));
        assert!(!is_valid_command_name(""));
        assert!(!is_valid_command_name("Pay"));
        assert!(!is_valid_command_name("with space"));
        assert!(!is_valid_command_name(&"a".repeat(33)));
        assert!(is_valid_command_name(&"a".repeat(32)));
    }

    #[test]
    fn unit_free_text_tokens_reject_whitespace() {
        assert!(is_valid_free_text_token("Give"));
        assert!(!is_valid_free_text_token(""));
        assert!(!is_valid_free_text_token("two words"));
    }
}
