//! Glob-like path patterns.
//!
//! Patterns select the operations an aspect or a common-parameter supplier
//! applies to. They are matched against the full operation path, mount
//! prefix included.
//!
//! | Token | Meaning                                   |
//! |-------|-------------------------------------------|
//! | `.`   | a literal dot                             |
//! | `**`  | zero or more characters, `/` included     |
//! | `*`   | one or more characters, `/` included      |
//!
//! Every other character is passed to the regex engine as written, and the
//! compiled expression is anchored at both ends.
//!
//! # Example
//!
//! ```
//! use weave_core::pattern::Pattern;
//!
//! let pattern = Pattern::compile("/api/*").unwrap();
//! assert!(pattern.matches("/api/test"));
//! assert!(!pattern.matches("/api/"));
//! ```

use crate::error::RegistrationError;
use regex::Regex;
use std::fmt;

/// A compiled, anchored path pattern.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] when the translated
    /// expression is not a valid regex (for example an unbalanced `(`).
    pub fn compile(pattern: &str) -> Result<Self, RegistrationError> {
        let expression = translate(pattern);
        let regex = Regex::new(&expression).map_err(|source| RegistrationError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Whether the whole of `path` matches.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// The pattern as written by the caller.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Translate a glob into an anchored regex. Order matters: dots first, then
/// `**`, then the remaining single stars. The `**` replacement must not
/// contain a `*` of its own.
fn translate(pattern: &str) -> String {
    let escaped = pattern.replace('.', r"\.");
    let double = escaped.replace("**", "(.{0,})");
    let single = double.replace('*', "(.+)");
    format!("^{single}$")
}
