// Budfs generative filesystem overlay.
// Copyright 2025 Martin Pool.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

//! Glob patterns over the overlay namespace.

use globset::{GlobBuilder, GlobMatcher};

use crate::{opath, Error, Result};

/// A compiled glob pattern, with the literal directory prefix it can be
/// walked from.
///
/// `*` and `?` do not cross `/`, so `x/*.md` matches direct children of
/// `x` only; `**` spans directories.
#[derive(Clone, Debug)]
pub struct Pattern {
    pattern: String,
    matcher: GlobMatcher,
    base: String,
}

impl Pattern {
    pub fn compile(pattern: &str) -> Result<Pattern> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| Error::Pattern {
                pattern: pattern.to_owned(),
                source,
            })?;
        Ok(Pattern {
            pattern: pattern.to_owned(),
            matcher: glob.compile_matcher(),
            base: base_prefix(pattern),
        })
    }

    pub fn is_match(&self, opath: &str) -> bool {
        self.matcher.is_match(opath)
    }

    /// The subtree a walk must cover to find every match.
    ///
    /// Correctness never depends on the base being tight: `"."` is always
    /// a safe answer, just a slower walk.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// The leading meta-free components of a pattern, or the root if the very
/// first component has meta characters.
fn base_prefix(pattern: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in pattern.split('/') {
        if seg.is_empty()
            || seg
                .chars()
                .any(|c| matches!(c, '*' | '?' | '[' | '{' | '\\'))
        {
            break;
        }
        parts.push(seg);
    }
    if parts.is_empty() {
        opath::ROOT.to_owned()
    } else {
        parts.join("/")
    }
}
