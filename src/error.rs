//! Crate-level error type.
//!
//! Library code returns the typed errors of its module; the generation
//! pipeline gathers them here. Commands work in `anyhow` and turn whatever
//! reaches `main` back into a [`Diagnostic`] with [`diagnose`].

use thiserror::Error;

use crate::backend::EmitError;
use crate::core::project::ProjectError;
use crate::discovery::DiscoveryError;
use crate::graph::GraphError;
use crate::util::diagnostic::{suggestions, Diagnostic};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Error::Project(e) => project_diagnostic(e),
            Error::Graph(e) => e.to_diagnostic(),
            Error::Discovery(e) => with_causes(Diagnostic::error(e.to_string()), e),
            Error::Emit(e) => e.to_diagnostic(),
        }
    }
}

/// Build the diagnostic for an error that reached the command line.
///
/// The first kiln error in the chain decides the message and suggestions;
/// anyhow context above it becomes context lines.
pub fn diagnose(err: &anyhow::Error) -> Diagnostic {
    let mut outer = Vec::new();
    for cause in err.chain() {
        let found = if let Some(e) = cause.downcast_ref::<Error>() {
            Some(e.to_diagnostic())
        } else if let Some(e) = cause.downcast_ref::<GraphError>() {
            Some(e.to_diagnostic())
        } else if let Some(e) = cause.downcast_ref::<EmitError>() {
            Some(e.to_diagnostic())
        } else {
            cause.downcast_ref::<ProjectError>().map(project_diagnostic)
        };

        if let Some(mut diagnostic) = found {
            for ctx in outer.into_iter().rev() {
                diagnostic.context.insert(0, ctx);
            }
            return diagnostic;
        }
        outer.push(cause.to_string());
    }

    let mut chain = err.chain();
    let message = chain.next().map(|c| c.to_string()).unwrap_or_default();
    chain.fold(Diagnostic::error(message), |d, cause| d.with_context(cause.to_string()))
}

fn project_diagnostic(e: &ProjectError) -> Diagnostic {
    let diagnostic = with_causes(Diagnostic::error(e.to_string()), e);
    match e {
        ProjectError::Io { path, .. } => diagnostic
            .with_location(path)
            .with_suggestion(suggestions::NO_PROJECT),
        ProjectError::Parse { path, .. } => diagnostic.with_location(path),
        _ => diagnostic,
    }
}

fn with_causes(mut diagnostic: Diagnostic, err: &dyn std::error::Error) -> Diagnostic {
    let mut source = err.source();
    while let Some(cause) = source {
        diagnostic = diagnostic.with_context(cause.to_string());
        source = cause.source();
    }
    diagnostic
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cycle_diagnostic_through_anyhow() {
        let err: anyhow::Result<()> = Err(Error::from(GraphError::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()],
        }))
        .context("failed to generate build files");

        let diagnostic = diagnose(&err.unwrap_err());
        assert_eq!(diagnostic.message, "dependency cycle detected");
        assert_eq!(
            diagnostic.context,
            vec!["failed to generate build files", "a -> b -> a"]
        );
        assert_eq!(diagnostic.suggestions, vec![suggestions::BREAK_CYCLE]);
    }

    #[test]
    fn test_plain_error_keeps_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        let diagnostic = diagnose(&err);
        assert_eq!(diagnostic.message, "outer");
        assert_eq!(diagnostic.context, vec!["inner"]);
    }
}
