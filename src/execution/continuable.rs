//! Continuable request construction.
//!
//! Building a provider request collects two kinds of problems: hard errors
//! (the request cannot be sent) and unsupported options (the request can be
//! sent, minus those options). Only the former abort the call; the latter
//! travel with the request and end up next to the result.

use crate::error::{LlmError, UnsupportedFeatures};
use crate::types::GenResult;
use serde::Serialize;

/// A provider request that serves both the synchronous and the streaming endpoint.
pub trait GenRequest: Serialize + Send + Sync {
    fn set_stream(&mut self, stream: bool);
}

/// A provider's synchronous response body.
pub trait ToGenResult {
    fn to_result(self) -> Result<GenResult, LlmError>;
}

/// Problems found while building a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIssues {
    pub errors: Vec<String>,
    pub unsupported: Vec<String>,
}

impl RequestIssues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an option that will be ignored.
    pub fn unsupported(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.unsupported.contains(&name) {
            self.unsupported.push(name);
        }
    }

    /// Record a problem that prevents sending the request.
    pub fn invalid(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.unsupported.is_empty()
    }

    /// Attach the collected issues to `request`.
    ///
    /// Any hard error fails with one [`LlmError::InvalidRequest`] listing every
    /// error and every ignored option.
    pub fn into_prepared<R>(self, request: R) -> Result<Prepared<R>, LlmError> {
        if !self.errors.is_empty() {
            return Err(LlmError::InvalidRequest {
                errors: self.errors,
                unsupported: self.unsupported,
            });
        }
        let unsupported = (!self.unsupported.is_empty())
            .then(|| UnsupportedFeatures::new(self.unsupported));
        Ok(Prepared {
            request,
            unsupported,
        })
    }
}

/// A request ready to send, with the options it had to leave out.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared<R> {
    pub request: R,
    pub unsupported: Option<UnsupportedFeatures>,
}

impl<R> Prepared<R> {
    /// A request that honors every option.
    pub fn clean(request: R) -> Self {
        Self {
            request,
            unsupported: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_only_proceeds_with_a_warning() {
        let mut issues = RequestIssues::new();
        issues.unsupported("top_k");
        issues.unsupported("seed");
        issues.unsupported("top_k");
        let prepared = issues.into_prepared("req").unwrap();
        let warning = prepared.unsupported.unwrap();
        assert_eq!(warning.names, vec!["top_k", "seed"]);
        assert_eq!(warning.to_string(), "unsupported options: top_k, seed");
    }

    #[test]
    fn hard_errors_are_fatal_and_carry_unsupported() {
        let mut issues = RequestIssues::new();
        issues.unsupported("top_k");
        issues.invalid("temperature must be within [0, 2], got 3");
        match issues.into_prepared(()).unwrap_err() {
            LlmError::InvalidRequest {
                errors,
                unsupported,
            } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(unsupported, vec!["top_k"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clean_issues_have_no_warning() {
        let issues = RequestIssues::new();
        assert!(issues.is_clean());
        assert_eq!(issues.into_prepared(1).unwrap(), Prepared::clean(1));
    }
}
