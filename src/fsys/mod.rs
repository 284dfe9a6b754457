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

//! Backing filesystem abstraction underneath the overlay.
//!
//! Everything is addressed with cleaned relative paths below a root, and
//! errors distinguish not-found from other IO failure so the merge layer
//! can fall through one source to the next.
//!
//! Operations return a module-specific Result to reflect their narrower
//! focus.

use std::io;

use bytes::Bytes;
use thiserror::Error;

use crate::entry::{DirEntry, Metadata};

mod cached;
mod local;
mod memory;

pub use cached::CachedFsys;
pub use local::LocalFsys;
pub use memory::MemoryFsys;

pub type Result<T> = std::result::Result<T, Error>;

/// A read-only filesystem that can sit underneath the overlay, or be
/// mounted into it.
///
/// Implementations must be `Send + Sync`, so one filesystem can serve
/// concurrent readers.
///
/// Files in generator inputs have bounded size and fit in memory, so this
/// does not need to support streaming or partial reads.
pub trait Fsys: Send + Sync + std::fmt::Debug {
    /// Get one complete file.
    fn read_file(&self, opath: &str) -> Result<Bytes>;

    /// Read the entries of a directory, without recursing down.
    ///
    /// The result does not contain entries for `.` and `..`. Entries come
    /// back in a deterministic order, sorted by name.
    fn list_dir(&self, opath: &str) -> Result<Vec<DirEntry>>;

    /// Get metadata about one entry.
    fn metadata(&self, opath: &str) -> Result<Metadata>;
}

impl<F: Fsys + ?Sized> Fsys for std::sync::Arc<F> {
    fn read_file(&self, opath: &str) -> Result<Bytes> {
        (**self).read_file(opath)
    }

    fn list_dir(&self, opath: &str) -> Result<Vec<DirEntry>> {
        (**self).list_dir(opath)
    }

    fn metadata(&self, opath: &str) -> Result<Metadata> {
        (**self).metadata(opath)
    }
}

/// A filesystem that can also be written: the destination of a sync.
pub trait WriteFsys: Fsys {
    /// Create a directory, and any missing ancestors.
    ///
    /// Creating a directory that already exists is not an error.
    fn make_dir(&self, opath: &str) -> Result<()>;

    /// Write a complete file, atomically where the filesystem allows it.
    fn write_file(&self, opath: &str, content: &[u8]) -> Result<()>;
}

/// Backing filesystem error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {path:?}")]
    NotFound { path: String },

    #[error("IO error on {path:?}: {source}")]
    Io { path: String, source: io::Error },
}

impl Error {
    /// Classify an io::Error against the path it happened on.
    pub(crate) fn io_error(path: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_owned(),
            },
            _ => Error::Io {
                path: path.to_owned(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
