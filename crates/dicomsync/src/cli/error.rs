//! Errors with suggestions, for problems the operator can fix.

use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Configuration file is missing
    pub fn config_not_found(path: &Path) -> Self {
        Self::new(format!("Configuration not found: {}", path.display()))
            .with_context("dicomsync needs a TOML file naming the storage directory and watched folders")
            .with_suggestion(format!(
                "TRY: Write a starter file: dicomsync config --init > {}",
                path.display()
            ))
            .with_suggestion("TRY: Point at another file with --config <path> or DICOMSYNC_CONFIG")
    }

    /// Configuration was read but rejected
    pub fn invalid_config(path: &Path, reason: impl fmt::Display) -> Self {
        Self::new(format!("Invalid configuration in {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestion("TRY: Inspect the resolved settings: dicomsync config")
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\n  {}", context)?;
        }
        for suggestion in &self.suggestions {
            write!(f, "\n  {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_suggestions() {
        let err = HelpfulError::config_not_found(Path::new("/etc/dicomsync.toml"));
        let text = err.to_string();
        assert!(text.starts_with("Configuration not found: /etc/dicomsync.toml"));
        assert_eq!(text.matches("TRY:").count(), 2);
    }
}
