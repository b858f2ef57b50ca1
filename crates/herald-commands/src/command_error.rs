use thiserror::Error;

/// Reasons a declared command is rejected while building a route table.
///
/// A rejected descriptor is skipped; every other descriptor still loads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("command '{location}' declares neither a structured nor a free-text handler")]
    MissingHandlers { location: String },
    #[error("command location '{location}' is invalid: {reason}")]
    InvalidLocation { location: String, reason: String },
    #[error("command '{location}' is nested {depth} levels deep (maximum is 3)")]
    InvalidDepth { location: String, depth: usize },
    #[error("command '{location}' uses invalid name '{name}'")]
    InvalidName { location: String, name: String },
    #[error("command '{location}' declares invalid option '{option}': {reason}")]
    InvalidOption {
        location: String,
        option: String,
        reason: String,
    },
    #[error("command '{location}' claims path '{path}' already registered by '{existing}'")]
    PathCollision {
        location: String,
        path: String,
        existing: String,
    },
    #[error("command '{location}' conflicts with '{existing}' at '{path}': {reason}")]
    PathConflict {
        location: String,
        path: String,
        existing: String,
        reason: String,
    },
    #[error("command '{location}' is restricted to invalid scope id '{scope}'")]
    InvalidScope { location: String, scope: String },
    #[error(
        "command '{location}' claims free-text trigger '{trigger}' already registered by '{existing}'"
    )]
    FreeTextCollision {
        location: String,
        trigger: String,
        existing: String,
    },
}

impl LoadError {
    pub fn location(&self) -> &str {
        match self {
            Self::MissingHandlers { location }
            | Self::InvalidLocation { location, .. }
            | Self::InvalidDepth { location, .. }
            | Self::InvalidName { location, .. }
            | Self::InvalidOption { location, .. }
            | Self::InvalidScope { location, .. }
            | Self::PathCollision { location, .. }
            | Self::PathConflict { location, .. }
            | Self::FreeTextCollision { location, .. } => location,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingHandlers { .. } => "missing_handlers",
            Self::InvalidLocation { .. } => "invalid_location",
            Self::InvalidDepth { .. } => "invalid_depth",
            Self::InvalidName { .. } => "invalid_name",
            Self::InvalidOption { .. } => "invalid_option",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::PathCollision { .. } => "path_collision",
            Self::PathConflict { .. } => "path_conflict",
            Self::FreeTextCollision { .. } => "free_text_collision",
        }
    }
}
