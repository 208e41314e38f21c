//! Shader source normalization and stage fingerprinting.
//!
//! A stage fingerprint is the XXH64 hash of the stage source after the
//! compile-time prefix has been spliced in behind the version line. Forcing
//! the platform's version preamble and placing injected defines at a fixed
//! position keeps the hash stable across hosts that only differ in those
//! parts.

use kiln_common::{StageFingerprint, StageType};

use crate::config::CacheConfig;

/// Directive that marks the shading-language version line.
const VERSION_DIRECTIVE: &str = "#version";

/// Source text of one shader stage as handed to the compiler.
#[derive(Debug, Clone, Copy)]
pub struct StageSource<'a> {
    /// The stage this source belongs to.
    pub stage: StageType,
    /// The stage's source text.
    pub code: &'a str,
    /// Compile-time injected text (typically `#define` lines).
    pub prefix: Option<&'a str>,
}

impl<'a> StageSource<'a> {
    /// Creates a stage source without an injected prefix.
    pub fn new(stage: StageType, code: &'a str) -> Self {
        Self {
            stage,
            code,
            prefix: None,
        }
    }

    /// Attaches an injected prefix.
    pub fn with_prefix(mut self, prefix: &'a str) -> Self {
        self.prefix = Some(prefix);
        self
    }
}

/// Derives [`StageFingerprint`]s from shader source text.
#[derive(Debug, Clone, Default)]
pub struct SourceHasher {
    version_preamble: Option<String>,
}

impl SourceHasher {
    /// Creates a hasher that keeps each source's own version directive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hasher that replaces every version directive with
    /// `preamble`.
    pub fn with_version_preamble(preamble: impl Into<String>) -> Self {
        Self {
            version_preamble: Some(preamble.into()),
        }
    }

    /// Creates a hasher for the platform described by `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            version_preamble: config.version_preamble.clone(),
        }
    }

    /// Fingerprints one stage.
    ///
    /// Returns `None` when `source` is empty, meaning no such stage is
    /// present and the caller should skip it.
    pub fn fingerprint(
        &self,
        stage: StageType,
        source: &str,
        prefix: Option<&str>,
    ) -> Option<StageFingerprint> {
        if source.is_empty() {
            return None;
        }
        let normalized = self.normalize(source, prefix.unwrap_or_default());
        let hash = xxhash_rust::xxh64::xxh64(normalized.as_bytes(), 0);
        let size = i32::try_from(normalized.len()).unwrap_or(i32::MAX);
        Some(StageFingerprint::new(stage, hash, size))
    }

    /// Fingerprints every stage of a program.
    ///
    /// A program is cacheable only if every stage it declares has source, so
    /// a single empty stage makes the whole program uncacheable (`None`).
    pub fn fingerprint_program(&self, stages: &[StageSource<'_>]) -> Option<Vec<StageFingerprint>> {
        stages
            .iter()
            .map(|s| self.fingerprint(s.stage, s.code, s.prefix))
            .collect()
    }

    /// Builds the byte sequence that gets hashed.
    ///
    /// Layout: version line (forced preamble, or the source's own version
    /// line verbatim), then `prefix`, then the rest of the source.
    pub fn normalize(&self, source: &str, prefix: &str) -> String {
        let (version_line, rest) = split_version_line(source);
        let mut out = String::with_capacity(source.len() + prefix.len() + 16);

        match (&self.version_preamble, version_line) {
            (Some(preamble), _) => push_line(&mut out, preamble),
            (None, Some(line)) => push_line(&mut out, line),
            (None, None) => {}
        }
        out.push_str(prefix);
        out.push_str(rest);
        out
    }
}

/// Splits `source` after the line containing the version directive.
///
/// The head includes everything up to and including that line's newline.
/// Without a directive the whole source is the remainder.
fn split_version_line(source: &str) -> (Option<&str>, &str) {
    let Some(start) = source.find(VERSION_DIRECTIVE) else {
        return (None, source);
    };
    match source[start..].find('\n') {
        Some(offset) => {
            let end = start + offset + 1;
            (Some(&source[..end]), &source[end..])
        }
        None => (Some(source), ""),
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    if !line.ends_with('\n') {
        out.push('\n');
    }
}
