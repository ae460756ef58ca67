//! User-friendly diagnostic messages.
//!
//! A diagnostic is the rendered form of an error: the root cause, the
//! context that led to it and, where we can tell, what to do about it.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    pub const NO_PROJECT: &str = "create a kiln.toml in the source directory";

    pub const NOT_CONFIGURED: &str =
        "run `kiln configure <SRCDIR> <BUILDDIR>` to set up the build directory";

    pub const BREAK_CYCLE: &str =
        "remove one of the listed dependencies, or split a target so it no longer consumes its own output";

    pub const UNKNOWN_REFERENCE: &str =
        "declare the referenced target or rule before the target that uses it";

    pub const STALE: &str = "run `kiln refresh` to regenerate the build files";

    pub const OTHER_BACKEND: &str = "run `kiln backends` to see the alternatives";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(&self, color: bool) -> &'static str {
        match (self, color) {
            (Severity::Error, false) => "error",
            (Severity::Warning, false) => "warning",
            (Severity::Error, true) => "\x1b[1;31merror\x1b[0m",
            (Severity::Warning, true) => "\x1b[1;33mwarning\x1b[0m",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label(false))
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related file
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = format!("{}: {}\n", self.severity.label(color), self.message);

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help = if color { "\x1b[1;32mhelp\x1b[0m" } else { "help" };
            output.push_str(&format!("{}: consider:\n", help));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("dependency cycle detected")
            .with_context("gen -> gen.h -> gen")
            .with_location("/src/kiln.toml")
            .with_suggestion(suggestions::BREAK_CYCLE)
            .with_suggestion("run with --verbose for the full graph");

        let output = diag.format(false);
        assert!(output.starts_with("error: dependency cycle detected\n"));
        assert!(output.contains("  --> /src/kiln.toml"));
        assert!(output.contains("  = gen -> gen.h -> gen"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("  2. run with --verbose"));
    }

    #[test]
    fn test_plain_warning() {
        let output = Diagnostic::warning("discovery results changed").format(false);
        assert_eq!(output, "warning: discovery results changed\n");
    }
}
