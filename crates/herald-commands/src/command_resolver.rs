use crate::{CommandPath, LoadedCommand, RouteTable};

/// A free-text match and the tokens left over for the handler.
#[derive(Debug, Clone)]
pub struct FreeTextMatch<'a> {
    pub command: &'a LoadedCommand,
    pub residual: Vec<String>,
}

/// Splits a prefixed message into whitespace-separated tokens.
///
/// Returns `None` when the text does not start with `prefix`, when `prefix`
/// is empty, or when nothing follows it.
pub fn tokenize_free_text(content: &str, prefix: &str) -> Option<Vec<String>> {
    if prefix.is_empty() {
        return None;
    }
    let rest = content.strip_prefix(prefix)?;
    let tokens = rest
        .split_whitespace()
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens)
    }
}

impl RouteTable {
    /// Exact lookup. A path without a group never matches a grouped command.
    pub fn resolve_structured(&self, path: &CommandPath) -> Option<&LoadedCommand> {
        let routes = self.structured_routes().get(&path.command)?;
        let index = match (&path.group, &path.subcommand) {
            (None, None) => routes.root?,
            (None, Some(subcommand)) => *routes.subcommands.get(subcommand)?,
            (Some(group), Some(subcommand)) => *routes.groups.get(group)?.get(subcommand)?,
            (Some(_), None) => return None,
        };
        self.get(index)
    }

    /// Matches tokens against free-text triggers.
    ///
    /// The match with the longest positional prefix wins; flat commands have a
    /// prefix of length zero. Equal lengths keep the earliest registration.
    pub fn resolve_free_text(&self, tokens: &[String]) -> Option<FreeTextMatch<'_>> {
        let mut best: Option<(&LoadedCommand, usize)> = None;
        for command in self.free_text_commands() {
            let Some(route) = &command.free_text else {
                continue;
            };
            let consumed = route.prefix.len();
            let Some(trigger) = tokens.get(consumed) else {
                continue;
            };
            if tokens[..consumed] != route.prefix[..] || !route.matches(trigger) {
                continue;
            }
            if best.map_or(true, |(_, best_consumed)| consumed > best_consumed) {
                best = Some((command, consumed));
            }
        }

        best.map(|(command, consumed)| FreeTextMatch {
            command,
            residual: tokens[consumed + 1..].to_vec(),
        })
    }
}
