//! Glob patterns over log paths.
//!
//! `*` never crosses a `/`, `**` spans any number of directories and a
//! trailing `**` matches everything below its prefix. Patterns starting with
//! `/` are matched against the absolute path of a file, all others against
//! its path relative to the discovery root.

use glob::{MatchOptions, Pattern};
use std::path::Path;
use thiserror::Error;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Error, Debug)]
#[error("Invalid glob pattern '{pattern}': {message}")]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

/// A file path in both forms a pattern can be written against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePath {
    absolute: String,
    relative: String,
}

impl CandidatePath {
    pub fn new(root: &Path, path: &Path) -> Self {
        let absolute = path.to_string_lossy().into_owned();
        let relative = path
            .strip_prefix(root)
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_else(|_| absolute.clone());
        Self { absolute, relative }
    }

    pub fn absolute(&self) -> &str {
        &self.absolute
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }
}

#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    pattern: Pattern,
    anchored: bool,
}

impl PathPattern {
    pub fn new(source: &str) -> Result<Self, PatternError> {
        let mut expanded = source.to_string();
        if expanded == "**" || expanded.ends_with("/**") {
            expanded.push_str("/*");
        }

        let pattern = Pattern::new(&expanded).map_err(|e| PatternError {
            pattern: source.to_string(),
            message: e.msg.to_string(),
        })?;

        Ok(Self {
            source: source.to_string(),
            pattern,
            anchored: source.starts_with('/'),
        })
    }

    pub fn matches(&self, candidate: &CandidatePath) -> bool {
        let target = if self.anchored {
            candidate.absolute()
        } else {
            candidate.relative()
        };
        self.pattern.matches_with(target, MATCH_OPTIONS)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternList(Vec<PathPattern>);

impl PatternList {
    pub fn compile(sources: &[String]) -> Result<Self, PatternError> {
        sources
            .iter()
            .map(|source| PathPattern::new(source))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if any pattern matches. An empty list matches nothing.
    pub fn matches_any(&self, candidate: &CandidatePath) -> bool {
        self.0.iter().any(|pattern| pattern.matches(candidate))
    }
}

/// A compiled include/exclude pair.
///
/// An empty include list admits every path, an empty exclude list rejects
/// none.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: PatternList,
    exclude: PatternList,
}

impl PathFilter {
    pub fn compile(include: &[String], exclude: &[String]) -> Result<Self, PatternError> {
        Ok(Self {
            include: PatternList::compile(include)?,
            exclude: PatternList::compile(exclude)?,
        })
    }

    pub fn allows(&self, candidate: &CandidatePath) -> bool {
        (self.include.is_empty() || self.include.matches_any(candidate))
            && !self.exclude.matches_any(candidate)
    }
}
