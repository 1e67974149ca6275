//! Unified error handling for conductor
//!
//! Every lifecycle operation returns [`ScreenResult`]. Cancellation is a
//! variant of its own so layers can tell it apart from ordinary hook failures:
//! only cancellation rolls back locally-owned state.

use std::fmt;

use thiserror::Error;

/// Unified error type for lifecycle and conductor operations
#[derive(Debug, Error)]
pub enum ScreenError {
    /// The operation's cancellation token fired, or a hook reported cancellation
    #[error("operation cancelled")]
    Cancelled,

    /// An initialize/activate/deactivate/guard hook failed
    #[error("hook failed: {0}")]
    Hook(String),

    /// One or more members of a fan-out batch failed
    #[error(
        "{count} of {attempted} batch operations failed: {summary}",
        count = .failures.len(),
        summary = summarize(.failures)
    )]
    Batch {
        attempted: usize,
        failures: Vec<ScreenError>,
    },

    /// Scenario configuration is inconsistent
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A referenced unit or conductor does not exist
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl ScreenError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScreenError::Cancelled)
    }

    /// Fold the outcomes of a wait-for-all batch into a single result.
    ///
    /// Cancellation of any member wins, a single failure is reported as itself,
    /// several failures are reported together.
    pub fn settle(outcomes: Vec<ScreenResult<()>>) -> ScreenResult<()> {
        let attempted = outcomes.len();
        let mut failures: Vec<ScreenError> = outcomes.into_iter().filter_map(Result::err).collect();

        if failures.iter().any(ScreenError::is_cancelled) {
            return Err(ScreenError::Cancelled);
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(ScreenError::Batch {
                attempted,
                failures,
            }),
        }
    }
}

fn summarize(failures: &[ScreenError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for lifecycle operations
pub type ScreenResult<T> = std::result::Result<T, ScreenError>;

/// Helper trait for turning foreign errors into hook failures
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> ScreenResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> ScreenResult<T> {
        self.map_err(|e| ScreenError::Hook(format!("{context}: {e}")))
    }
}

#[macro_export]
macro_rules! hook_error {
    ($($arg:tt)*) => {
        $crate::core::ScreenError::Hook(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::ScreenError::Configuration(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_empty_batch_is_ok() {
        assert!(ScreenError::settle(vec![Ok(()), Ok(())]).is_ok());
    }

    #[test]
    fn test_settle_single_failure_is_reported_as_itself() {
        let result = ScreenError::settle(vec![Ok(()), Err(hook_error!("boom")), Ok(())]);
        assert!(matches!(result, Err(ScreenError::Hook(msg)) if msg == "boom"));
    }

    #[test]
    fn test_settle_cancellation_wins() {
        let result = ScreenError::settle(vec![
            Err(hook_error!("first")),
            Err(ScreenError::Cancelled),
        ]);
        assert!(matches!(result, Err(ScreenError::Cancelled)));
    }

    #[test]
    fn test_settle_many_failures_are_batched() {
        let result = ScreenError::settle(vec![
            Err(hook_error!("a")),
            Ok(()),
            Err(hook_error!("b {}", 2)),
        ]);
        match result {
            Err(ScreenError::Batch { attempted, failures }) => {
                assert_eq!(attempted, 3);
                assert_eq!(failures.len(), 2);
            }
            other => panic!("expected batch error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_macros_interpolate_inline_arguments() {
        let unit = "editor";
        let err = config_error!("{unit} is not a conductor");
        assert_eq!(err.to_string(), "configuration error: editor is not a conductor");

        let code = 7;
        assert!(matches!(hook_error!("exit {code}"), ScreenError::Hook(msg) if msg == "exit 7"));
        assert!(matches!(hook_error!("plain"), ScreenError::Hook(msg) if msg == "plain"));
    }

    #[test]
    fn test_error_context() {
        let parsed: Result<u32, _> = "nope".parse::<u32>();
        let err = parsed.with_context("parsing port").unwrap_err();
        assert!(err.to_string().contains("parsing port"));
        assert!(!err.is_cancelled());
    }
}
