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

//! Budfs error types.

use thiserror::Error;

use crate::fsys;

/// Budfs specific error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// The path names nothing: not in the generator tree, not in the
    /// backing filesystem.
    #[error("Not found: {path:?}")]
    NotFound { path: String },

    /// A malformed path, or a path the requested operation can't apply to.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A generator callback failed. The callback's own error is kept
    /// intact as the source.
    #[error("Generator for {path:?} failed: {source}")]
    Generate { path: String, source: Box<Error> },

    /// A generator reported a failure of its own.
    #[error("{message}")]
    Failed { message: String },

    /// The backing filesystem failed with something other than not-found.
    #[error("Backing filesystem error: {source}")]
    Fsys {
        #[from]
        source: fsys::Error,
    },

    /// A glob pattern that doesn't compile.
    #[error("Bad glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },

    /// The overlay was closed.
    #[error("Filesystem is closed")]
    Closed,
}

impl Error {
    /// A failure reported by a generator, with a message of its own.
    pub fn failed<S: ToString>(message: S) -> Error {
        Error::Failed {
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
