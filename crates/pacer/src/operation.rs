//! Descriptions of API operations.

use crate::request::PathTemplate;
use reqwest::Method;

/// One operation of a described API: method, path template and summary.
///
/// Generated API clients declare one `Operation` per endpoint and call it
/// through [`Controller::call`](crate::Controller::call).
///
/// # Examples
///
/// ```
/// use pacer::{Method, Operation};
///
/// let get_user = Operation::new(Method::GET, "users/{id}", "Fetch a single user");
/// assert_eq!(get_user.path().placeholders(), vec!["id"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct Operation {
    /// HTTP method
    method: Method,
    /// Path relative to the base URL, with `{name}` placeholders
    path: PathTemplate,
    /// Human readable summary
    description: String,
}

impl Operation {
    /// Describe an operation.
    pub fn new(
        method: Method,
        path: impl Into<PathTemplate>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
