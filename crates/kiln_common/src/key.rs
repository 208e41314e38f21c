//! Logical shader program keys.

use std::fmt;
use std::str::FromStr;

/// Identifies a logical render-pass shader program as a `(domain, pass)` pair.
///
/// The key is the host's name for a program, independent of its compiled
/// form. It is rendered as `domain:pass` when persisted in the cache index.
/// Any `%` or `:` inside the domain is percent-escaped so that the string
/// form parses back to the same key. Either component may be empty.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderKey {
    domain: String,
    pass: String,
}

impl ShaderKey {
    /// Creates a new key from a domain and a render pass name.
    pub fn new(domain: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            pass: pass.into(),
        }
    }

    /// Returns the domain component.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the render pass name component.
    pub fn pass(&self) -> &str {
        &self.pass
    }
}

impl fmt::Debug for ShaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShaderKey({self})")
    }
}

impl fmt::Display for ShaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.domain.chars() {
            match c {
                '%' => f.write_str("%25")?,
                ':' => f.write_str("%3A")?,
                c => write!(f, "{c}")?,
            }
        }
        write!(f, ":{}", self.pass)
    }
}

/// Reverses the domain escaping applied by `Display`.
fn unescape_domain(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        match code {
            "25" => out.push('%'),
            "3A" | "3a" => out.push(':'),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

/// Error returned when a string is not of the form `domain:pass`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid shader key '{input}': expected 'domain:pass'")]
pub struct ParseShaderKeyError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for ShaderKey {
    type Err = ParseShaderKeyError;

    /// Splits on the first `:` and unescapes the domain. The pass name is
    /// taken verbatim and may contain further colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseShaderKeyError {
            input: s.to_string(),
        };
        let (domain, pass) = s.split_once(':').ok_or_else(err)?;
        let domain = unescape_domain(domain).ok_or_else(err)?;
        Ok(Self::new(domain, pass))
    }
}
