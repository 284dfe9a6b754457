// Budfs generative filesystem overlay.
// Copyright 2025 Martin Pool.

//! Utilities to set up test environments.
//!
//! Fixtures that create directories delete them again when the object is
//! dropped.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use std::sync::Arc;

use crate::fsys::LocalFsys;
use crate::producer::{FileGen, GenFile};
use crate::scoped::ScopedFs;
use crate::Result;

/// A temporary source tree on disk, deleted when it goes out of scope.
pub struct ScratchTree {
    root: PathBuf,
    _tempdir: tempfile::TempDir,
}

impl Default for ScratchTree {
    fn default() -> Self {
        ScratchTree::new()
    }
}

impl ScratchTree {
    pub fn new() -> ScratchTree {
        let tempdir = tempfile::Builder::new()
            .prefix("budfs_ScratchTree")
            .tempdir()
            .unwrap();
        let root = tempdir.path().to_path_buf();
        ScratchTree {
            root,
            _tempdir: tempdir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// A backing filesystem rooted at this tree.
    pub fn fsys(&self) -> LocalFsys {
        LocalFsys::new(&self.root)
    }

    pub fn create_file(&self, relpath: &str, content: &[u8]) {
        let full = self.root.join(relpath);
        let mut f = fs::File::create(full).unwrap();
        f.write_all(content).unwrap();
    }

    pub fn create_dir(&self, relpath: &str) {
        fs::create_dir_all(self.root.join(relpath)).unwrap();
    }
}

/// A file generator that counts its runs.
///
/// Tests assert how often the overlay really ran a producer, as opposed
/// to serving its cache.
pub struct CountingGen<G: FileGen> {
    inner: G,
    runs: Arc<AtomicUsize>,
}

impl<G: FileGen> CountingGen<G> {
    pub fn new(inner: G) -> CountingGen<G> {
        CountingGen {
            inner,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A handle on the run count, alive after the generator is handed to
    /// an overlay.
    pub fn runs(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

impl<G: FileGen> FileGen for CountingGen<G> {
    fn generate(&self, fs: &ScopedFs, file: &mut GenFile) -> Result<()> {
        self.runs.fetch_add(1, Relaxed);
        self.inner.generate(fs, file)
    }
}
