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

//! The filesystem view handed to a running producer.
//!
//! Every read goes through the overlay like any other, and is also
//! recorded as a dependency of the producer's target, so a later change
//! to what was read evicts the produced entry. The records live here
//! until the run succeeds; a failed run discards them.

use std::sync::Mutex;

use bytes::Bytes;

use crate::context::Context;
use crate::entry::{DirEntry, VirtualEntry};
use crate::glob::Pattern;
use crate::linkmap::{Link, Op};
use crate::opath;
use crate::overlay::Overlay;
use crate::{Error, Result};

/// A per-invocation view of the overlay that records what it reads.
#[derive(Debug)]
pub struct ScopedFs {
    overlay: Overlay,
    target: String,
    links: Mutex<Vec<Link>>,
}

impl ScopedFs {
    pub(crate) fn new(overlay: Overlay, target: &str) -> ScopedFs {
        ScopedFs {
            overlay,
            target: target.to_owned(),
            links: Mutex::new(Vec::new()),
        }
    }

    /// The path whose production this view is recording for.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn into_links(self) -> Vec<Link> {
        self.links.into_inner().unwrap()
    }

    fn record(&self, link: Link) {
        self.links.lock().unwrap().push(link);
    }

    /// Open a path in the overlay, recording an exact dependency on it.
    pub fn open(&self, path: &str) -> Result<VirtualEntry> {
        let p = opath::clean(path)?;
        self.record(Link::Exact {
            op: Op::Open,
            path: p.clone(),
        });
        self.overlay.open(&p)
    }

    /// Read a whole file. Shorthand for `open` on a file path.
    pub fn read(&self, path: &str) -> Result<Bytes> {
        match self.open(path)? {
            VirtualEntry::File { data, .. } => Ok(data),
            VirtualEntry::Dir { path, .. } => Err(Error::InvalidPath {
                path,
                reason: "is a directory",
            }),
        }
    }

    /// List a directory, recording a dependency on the directory and its
    /// direct children.
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let p = opath::clean(path)?;
        self.record(Link::ReadDir { dir: p.clone() });
        self.overlay.read_dir(&p)
    }

    /// Glob over the overlay, recording a dependency on everything the
    /// pattern could ever match.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = Pattern::compile(pattern)?;
        self.record(Link::Glob {
            pattern: pattern.clone(),
        });
        self.overlay.glob_pattern(&pattern)
    }

    /// Record a dependency on a path without reading it.
    pub fn link(&self, path: &str) -> Result<()> {
        let p = opath::clean(path)?;
        self.record(Link::Exact {
            op: Op::Link,
            path: p,
        });
        Ok(())
    }

    /// The ambient context; producers should stop promptly once it is
    /// cancelled.
    pub fn context(&self) -> Context {
        self.overlay.context()
    }

    /// Register a hook to run when the overlay closes.
    ///
    /// Hooks run in reverse registration order. Every call appends, even
    /// across re-runs of the same producer.
    pub fn defer<H>(&self, hook: H)
    where
        H: FnOnce() -> Result<()> + Send + 'static,
    {
        self.overlay.push_defer(Box::new(hook));
    }
}
