//! Route constraints for parameter validation
//!
//! A constraint rejects a route candidate during matching when the decoded
//! parameter value does not satisfy it; the matcher then moves on to the
//! next registered route.
//!
//! ```
//! use keel_core::*;
//!
//! let mut router = Router::new();
//! router
//!     .get("/users/:id", "UserController.show")
//!     .unwrap()
//!     .constrain_with("id", UIntConstraint);
//! router
//!     .get("/users/:slug", "UserController.bySlug")
//!     .unwrap()
//!     .constrain("slug", "[a-z-]+");
//! ```

use regex::Regex;

/// Validates a single path or domain parameter.
pub trait RouteConstraint: Send + Sync {
    /// Returns Ok(()) if valid, Err with a descriptive message if invalid
    fn validate(&self, value: &str) -> Result<(), String>;

    /// Short description used in logs
    fn description(&self) -> &str;
}

/// Signed 64-bit integer
#[derive(Debug, Clone)]
pub struct IntConstraint;

impl RouteConstraint for IntConstraint {
    fn validate(&self, value: &str) -> Result<(), String> {
        value
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| format!("'{}' is not a valid integer", value))
    }

    fn description(&self) -> &str {
        "integer"
    }
}

/// Unsigned 64-bit integer
#[derive(Debug, Clone)]
pub struct UIntConstraint;

impl RouteConstraint for UIntConstraint {
    fn validate(&self, value: &str) -> Result<(), String> {
        value
            .parse::<u64>()
            .map(|_| ())
            .map_err(|_| format!("'{}' is not a valid unsigned integer", value))
    }

    fn description(&self) -> &str {
        "unsigned integer"
    }
}

/// Letters only
#[derive(Debug, Clone)]
pub struct AlphaConstraint;

impl RouteConstraint for AlphaConstraint {
    fn validate(&self, value: &str) -> Result<(), String> {
        if !value.is_empty() && value.chars().all(char::is_alphabetic) {
            Ok(())
        } else {
            Err(format!("'{}' must contain only letters", value))
        }
    }

    fn description(&self) -> &str {
        "alphabetic"
    }
}

/// Letters and digits only
#[derive(Debug, Clone)]
pub struct AlphaNumConstraint;

impl RouteConstraint for AlphaNumConstraint {
    fn validate(&self, value: &str) -> Result<(), String> {
        if !value.is_empty() && value.chars().all(char::is_alphanumeric) {
            Ok(())
        } else {
            Err(format!("'{}' must contain only letters and numbers", value))
        }
    }

    fn description(&self) -> &str {
        "alphanumeric"
    }
}

/// Hyphenated UUID (8-4-4-4-12 hex digits)
#[derive(Debug, Clone)]
pub struct UuidConstraint;

impl RouteConstraint for UuidConstraint {
    fn validate(&self, value: &str) -> Result<(), String> {
        let groups: Vec<&str> = value.split('-').collect();
        let lengths = [8, 4, 4, 4, 12];
        let valid = groups.len() == lengths.len()
            && groups
                .iter()
                .zip(lengths)
                .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()));

        if valid {
            Ok(())
        } else {
            Err(format!("'{}' is not a valid UUID", value))
        }
    }

    fn description(&self) -> &str {
        "UUID"
    }
}

/// Whole-value regular expression match.
///
/// The pattern is anchored, so `\d+` accepts `42` but not `42a`.
#[derive(Debug, Clone)]
pub struct RegexConstraint {
    regex: Regex,
    source: String,
}

impl RegexConstraint {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(&format!("^(?:{})$", pattern))?,
            source: pattern.to_string(),
        })
    }
}

impl RouteConstraint for RegexConstraint {
    fn validate(&self, value: &str) -> Result<(), String> {
        if self.regex.is_match(value) {
            Ok(())
        } else {
            Err(format!("'{}' must match pattern: {}", value, self.source))
        }
    }

    fn description(&self) -> &str {
        &self.source
    }
}
