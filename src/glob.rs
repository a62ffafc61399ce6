use std::fmt;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::scope::ScopeError;

/// Compiled glob where `*` matches any run of characters and everything else is literal.
#[derive(Clone, Debug)]
pub struct Glob {
    source: String,
    regex: Regex,
}

impl Glob {
    /// Return true if the whole candidate matches the glob.
    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Glob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

/// Compile a glob into an anchored regular expression.
pub fn compile_glob(glob: &str) -> Result<Glob, ScopeError> {
    let regex = Regex::new(&glob_to_regex(glob)).map_err(|err| ScopeError::InvalidGlob {
        glob: glob.to_string(),
        reason: err.to_string(),
    })?;
    Ok(Glob {
        source: glob.to_string(),
        regex,
    })
}

pub fn contains_wildcard(value: &str) -> bool {
    value.contains('*')
}

fn glob_to_regex(glob: &str) -> String {
    let mut pattern = String::with_capacity(glob.len() + 8);
    // `(?s)` lets `*` run across newlines as well as separators.
    pattern.push_str("(?s)^");
    for (index, literal) in glob.split('*').enumerate() {
        if index > 0 {
            pattern.push_str(".*");
        }
        pattern.push_str(&regex::escape(literal));
    }
    pattern.push('$');
    pattern
}
