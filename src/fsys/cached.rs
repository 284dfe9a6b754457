// Budfs generative filesystem overlay.
// Copyright 2025 Martin Pool.

//! A filesystem wrapper that memoises successful reads.
//!
//! Sync swaps this in over the primary backing filesystem so that walking
//! the whole overlay reads each backing file once, and the steady-state
//! overlay never sees entries the walk pulled in.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;

use crate::entry::{DirEntry, Metadata};
use crate::fsys::{Fsys, Result};

/// Wraps another filesystem, remembering every successful read.
///
/// Errors are not remembered; a failed read is retried on the next call.
#[derive(Debug)]
pub struct CachedFsys<F: Fsys> {
    inner: F,
    files: Mutex<HashMap<String, Bytes>>,
    dirs: Mutex<HashMap<String, Vec<DirEntry>>>,
    metas: Mutex<HashMap<String, Metadata>>,
}

impl<F: Fsys> CachedFsys<F> {
    pub fn new(inner: F) -> Self {
        CachedFsys {
            inner,
            files: Mutex::new(HashMap::new()),
            dirs: Mutex::new(HashMap::new()),
            metas: Mutex::new(HashMap::new()),
        }
    }
}

impl<F: Fsys> Fsys for CachedFsys<F> {
    fn read_file(&self, opath: &str) -> Result<Bytes> {
        if let Some(data) = self.files.lock().unwrap().get(opath) {
            return Ok(data.clone());
        }
        let data = self.inner.read_file(opath)?;
        self.files
            .lock()
            .unwrap()
            .insert(opath.to_owned(), data.clone());
        Ok(data)
    }

    fn list_dir(&self, opath: &str) -> Result<Vec<DirEntry>> {
        if let Some(entries) = self.dirs.lock().unwrap().get(opath) {
            return Ok(entries.clone());
        }
        let entries = self.inner.list_dir(opath)?;
        self.dirs
            .lock()
            .unwrap()
            .insert(opath.to_owned(), entries.clone());
        Ok(entries)
    }

    fn metadata(&self, opath: &str) -> Result<Metadata> {
        if let Some(meta) = self.metas.lock().unwrap().get(opath) {
            return Ok(meta.clone());
        }
        let meta = self.inner.metadata(opath)?;
        self.metas
            .lock()
            .unwrap()
            .insert(opath.to_owned(), meta.clone());
        Ok(meta)
    }
}
