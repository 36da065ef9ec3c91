//! Production/development build mode.

use std::fmt;

/// Build mode for one invocation.
///
/// Selects the pipeline branch of every task and the optional production-only
/// stages (CSS inlining, unused-CSS removal, minification).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    /// Resolve the mode from the `--production` flag or `PIPEWRIGHT_MODE`.
    pub fn resolve(production_flag: bool) -> Self {
        if production_flag {
            return Self::Production;
        }
        match std::env::var("PIPEWRIGHT_MODE") {
            Ok(value) if value.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_forces_production() {
        assert_eq!(BuildMode::resolve(true), BuildMode::Production);
        assert!(BuildMode::Production.is_production());
        assert!(!BuildMode::Development.is_production());
    }

    #[test]
    fn test_display() {
        assert_eq!(BuildMode::Development.to_string(), "development");
        assert_eq!(BuildMode::Production.to_string(), "production");
    }
}
