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

//! The overlay: a read-only filesystem view composing the generator tree,
//! the entry cache, the dependency records, and a backing filesystem.
//!
//! Reads consult the tree first and fall back to the backing filesystem.
//! A path owned by a producer is materialised at most once per validity
//! interval: concurrent opens of the same uncached target run the producer
//! once, and `change` evicts everything a changed input can reach.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Mutex, RwLock};

use itertools::Itertools;
use tracing::{debug, instrument, trace, warn};

use crate::cache::Cache;
use crate::context::Context;
use crate::counters::{Counter, Counters};
use crate::entry::{DirEntry, Metadata, VirtualEntry};
use crate::fsys::{CachedFsys, Fsys, LocalFsys, WriteFsys};
use crate::glob::Pattern;
use crate::kind::Kind;
use crate::linkmap::{self, LinkMap};
use crate::opath;
use crate::producer::{DirGen, FileGen, GenDir, GenFile, Producer};
use crate::scoped::ScopedFs;
use crate::tree::{Resolve, Tree};
use crate::{Error, Result};

pub(crate) type DeferHook = Box<dyn FnOnce() -> Result<()> + Send>;

/// A generative virtual filesystem overlay.
///
/// Clones are cheap handles onto the same overlay, so one overlay can be
/// shared across threads; `close` through any handle closes them all.
#[derive(Clone)]
pub struct Overlay {
    inner: Arc<Inner>,
}

struct Inner {
    tree: RwLock<Tree>,
    cache: Cache,
    links: LinkMap,
    backing: RwLock<Arc<dyn Fsys>>,
    /// One gate per target, so concurrent opens of an uncached target run
    /// its producer once.
    flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    defers: Mutex<Vec<DeferHook>>,
    closed: AtomicBool,
    counters: Counters,
    context: RwLock<Context>,
}

/// How the tree answers one open.
enum Route {
    /// Run this producer for the requested path.
    Produce {
        producer: Arc<Producer>,
        node_path: String,
        mode: u32,
    },
    /// A plain directory with bound children: synthesise its listing.
    ServeDir { mode: u32, entries: Vec<DirEntry> },
    /// The request named a file server's own directory.
    ServerDirSelf,
    /// A file node with no producer.
    Unreadable,
    /// The tree doesn't serve this path.
    Backing,
}

impl Overlay {
    pub fn new(backing: Arc<dyn Fsys>) -> Overlay {
        Overlay {
            inner: Arc::new(Inner {
                tree: RwLock::new(Tree::new()),
                cache: Cache::default(),
                links: LinkMap::default(),
                backing: RwLock::new(backing),
                flight: Mutex::new(HashMap::new()),
                defers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
                context: RwLock::new(Context::new()),
            }),
        }
    }

    /// An overlay over a local directory.
    pub fn local(path: &Path) -> Overlay {
        Overlay::new(Arc::new(LocalFsys::new(path)))
    }

    /// Replace the ambient context handed to producers.
    pub fn with_context(self, context: Context) -> Overlay {
        *self.inner.context.write().unwrap() = context;
        self
    }

    pub fn context(&self) -> Context {
        self.inner.context.read().unwrap().clone()
    }

    pub fn counters(&self) -> &Counters {
        &self.inner.counters
    }

    fn backing(&self) -> Arc<dyn Fsys> {
        Arc::clone(&self.inner.backing.read().unwrap())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    // Registration ---------------------------------------------------------

    /// Bind a generator producing one file at `path`.
    pub fn generate_file<G: FileGen + 'static>(&self, path: &str, gen: G) -> Result<()> {
        self.file_generator(path, Arc::new(gen))
    }

    pub fn file_generator(&self, path: &str, gen: Arc<dyn FileGen>) -> Result<()> {
        self.bind(
            path,
            Kind::File,
            Kind::File.default_mode(),
            Producer::File(gen),
        )
    }

    /// Bind a generator that populates the directory at `path` the first
    /// time anything below it is requested.
    pub fn generate_dir<G: DirGen + 'static>(&self, path: &str, gen: G) -> Result<()> {
        self.dir_generator(path, Arc::new(gen))
    }

    pub fn dir_generator(&self, path: &str, gen: Arc<dyn DirGen>) -> Result<()> {
        self.bind(path, Kind::Dir, Kind::Dir.default_mode(), Producer::Dir(gen))
    }

    /// Bind a server generating a file for each requested path below
    /// `dir`. The directory itself can't be opened.
    pub fn serve_file<G: FileGen + 'static>(&self, dir: &str, gen: G) -> Result<()> {
        self.file_server(dir, Arc::new(gen))
    }

    pub fn file_server(&self, dir: &str, gen: Arc<dyn FileGen>) -> Result<()> {
        self.bind(
            dir,
            Kind::Dir,
            Kind::Dir.default_mode(),
            Producer::Server(gen),
        )
    }

    /// Make a foreign read-only filesystem's content appear below `dir`.
    ///
    /// Top-level entries are bound eagerly; everything deeper resolves
    /// lazily against the mounted filesystem.
    pub fn mount(&self, dir: &str, fsys: Arc<dyn Fsys>) -> Result<()> {
        self.ensure_open()?;
        let dir = opath::clean(dir)?;
        let entries = fsys.list_dir(opath::ROOT).map_err(Error::from)?;
        for entry in entries {
            let producer = Producer::Mount {
                fsys: Arc::clone(&fsys),
                dir: dir.clone(),
            };
            self.bind(
                &opath::join(&dir, &entry.name),
                entry.kind,
                entry.mode,
                producer,
            )?;
        }
        debug!(dir = %dir, "mounted filesystem");
        Ok(())
    }

    fn bind(&self, path: &str, kind: Kind, mode: u32, producer: Producer) -> Result<()> {
        self.ensure_open()?;
        let p = opath::clean(path)?;
        self.inner
            .tree
            .write()
            .unwrap()
            .bind(&p, kind, mode, Arc::new(producer))?;
        // A rebind makes any earlier materialisation stale.
        if self.inner.cache.delete(&p) {
            self.inner.links.remove(&p);
            self.inner.counters.inc(Counter::Invalidations);
        }
        debug!(path = %p, ?kind, "bound producer");
        Ok(())
    }

    // Reads ----------------------------------------------------------------

    /// Open one path in the merged view, materialising it if a producer
    /// owns it.
    pub fn open(&self, path: &str) -> Result<VirtualEntry> {
        self.ensure_open()?;
        let p = opath::clean(path)?;
        if let Some(entry) = self.inner.cache.get(&p) {
            self.inner.counters.inc(Counter::CacheHits);
            trace!(path = %p, "cache hit");
            return Ok(entry);
        }
        self.inner.counters.inc(Counter::CacheMisses);
        self.ensure_resolved(&p)?;
        if let Some(entry) = self.inner.cache.get(&p) {
            return Ok(entry);
        }
        match self.route(&p) {
            Route::Produce {
                producer,
                node_path,
                mode,
            } => self.materialise(&p, &producer, &node_path, mode, &p),
            Route::ServeDir { mode, entries } => Ok(VirtualEntry::Dir {
                path: p,
                mode,
                entries,
            }),
            Route::ServerDirSelf => Err(Error::InvalidPath {
                path: p,
                reason: "a file server cannot serve its own directory",
            }),
            Route::Unreadable => Err(Error::InvalidPath {
                path: p,
                reason: "no producer bound",
            }),
            Route::Backing => self.open_backing(&p),
        }
    }

    /// List one directory: the union of the tree side and the backing
    /// side, deduplicated by name with the tree winning.
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.ensure_open()?;
        let p = opath::clean(path)?;
        self.ensure_resolved(&p)?;
        let tree_side = self.dir_tree_side(&p)?;
        let had_tree_side = tree_side.is_some();
        let mut entries = tree_side.unwrap_or_default();
        self.inner.counters.inc(Counter::BackingReads);
        match self.backing().list_dir(&p) {
            Ok(backing_entries) => {
                // Tree entries come first, so on a name conflict the tree
                // side wins.
                entries = entries
                    .into_iter()
                    .chain(backing_entries)
                    .unique_by(|e| e.name.clone())
                    .collect();
            }
            Err(err) if err.is_not_found() => {
                if !had_tree_side {
                    return Err(Error::NotFound { path: p });
                }
            }
            Err(err) => return Err(err.into()),
        }
        Ok(entries)
    }

    /// Stat one path in the merged view.
    pub fn metadata(&self, path: &str) -> Result<Metadata> {
        self.ensure_open()?;
        let p = opath::clean(path)?;
        if let Some(entry) = self.inner.cache.get(&p) {
            return Ok(entry.metadata());
        }
        self.ensure_resolved(&p)?;
        if let Some(entry) = self.inner.cache.get(&p) {
            return Ok(entry.metadata());
        }
        match self.route(&p) {
            Route::Produce {
                producer,
                node_path,
                mode,
            } => Ok(self.materialise(&p, &producer, &node_path, mode, &p)?.metadata()),
            Route::ServeDir { mode, .. } => Ok(Metadata {
                kind: Kind::Dir,
                mode,
                len: 0,
            }),
            Route::ServerDirSelf => Err(Error::InvalidPath {
                path: p,
                reason: "a file server cannot serve its own directory",
            }),
            Route::Unreadable => Err(Error::InvalidPath {
                path: p,
                reason: "no producer bound",
            }),
            Route::Backing => {
                self.inner.counters.inc(Counter::BackingReads);
                match self.backing().metadata(&p) {
                    Err(err) if err.is_not_found() => Err(Error::NotFound { path: p }),
                    Err(err) => Err(err.into()),
                    Ok(meta) => Ok(meta),
                }
            }
        }
    }

    /// Visit `base` and everything below it in the merged view, parents
    /// before children, in listing order.
    pub fn walk<F>(&self, base: &str, f: &mut F) -> Result<()>
    where
        F: FnMut(&str, Kind) -> Result<()>,
    {
        self.ensure_open()?;
        let base = opath::clean(base)?;
        let kind = self.metadata(&base)?.kind;
        self.walk_inner(&base, kind, f)
    }

    fn walk_inner(
        &self,
        path: &str,
        kind: Kind,
        f: &mut dyn FnMut(&str, Kind) -> Result<()>,
    ) -> Result<()> {
        f(path, kind)?;
        if kind.is_dir() {
            for entry in self.read_dir(path)? {
                self.walk_inner(&opath::join(path, &entry.name), entry.kind, f)?;
            }
        }
        Ok(())
    }

    /// Every path in the merged view matching a glob pattern, in walk
    /// order.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let pattern = Pattern::compile(pattern)?;
        self.glob_pattern(&pattern)
    }

    pub(crate) fn glob_pattern(&self, pattern: &Pattern) -> Result<Vec<String>> {
        let mut matches = Vec::new();
        let walked = self.walk(pattern.base(), &mut |path, _kind| {
            if pattern.is_match(path) {
                matches.push(path.to_owned());
            }
            Ok(())
        });
        match walked {
            Ok(()) => Ok(matches),
            // A pattern whose base names nothing matches nothing.
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    // Maintenance ----------------------------------------------------------

    /// Tell the overlay some input paths changed.
    ///
    /// Every cached entry whose recorded dependencies accept a changed
    /// path is evicted, and eviction cascades: an evicted generated path
    /// is itself a change for whatever read it. The sweep runs to a fixed
    /// point; cycles and duplicates are harmless because an already
    /// evicted entry is not re-queued.
    pub fn change<S: AsRef<str>>(&self, paths: &[S]) -> Result<()> {
        self.ensure_open()?;
        let mut work: Vec<String> = Vec::with_capacity(paths.len());
        for path in paths {
            work.push(opath::clean(path.as_ref())?);
        }
        debug!(?work, "change sweep");
        let mut i = 0;
        while i < work.len() {
            let p = work[i].clone();
            if self.inner.cache.delete(&p) {
                self.inner.links.remove(&p);
                self.inner.counters.inc(Counter::Invalidations);
                trace!(path = %p, "evicted");
            }
            let mut affected = Vec::new();
            self.inner.links.range(|generated, links| {
                if self.inner.cache.has(generated) && linkmap::check(links, &p) {
                    affected.push(generated.to_owned());
                }
                true
            });
            work.extend(affected);
            i += 1;
        }
        Ok(())
    }

    /// Materialise everything under `dir` and copy it to a writable
    /// filesystem.
    ///
    /// Backing reads go through a throwaway memoising layer for the
    /// duration, and the primary backing filesystem is restored
    /// afterwards, error or not. On error the copy is partial: files
    /// already written stay written.
    #[instrument(skip(self, dest))]
    pub fn sync(&self, dest: &dyn WriteFsys, dir: &str) -> Result<()> {
        self.ensure_open()?;
        let dir = opath::clean(dir)?;
        let original = {
            let mut backing = self.inner.backing.write().unwrap();
            let original = Arc::clone(&backing);
            *backing = Arc::new(CachedFsys::new(Arc::clone(&original)));
            original
        };
        let result = self.sync_inner(dest, &dir);
        *self.inner.backing.write().unwrap() = original;
        result
    }

    fn sync_inner(&self, dest: &dyn WriteFsys, dir: &str) -> Result<()> {
        self.walk(dir, &mut |path, kind| {
            match kind {
                Kind::Dir => {
                    if path != opath::ROOT {
                        dest.make_dir(path)?;
                    }
                }
                Kind::File => {
                    let entry = self.open(path)?;
                    let data = entry.file_data().expect("file entry has data");
                    dest.write_file(path, data)?;
                }
            }
            Ok(())
        })
    }

    /// Close the overlay and run deferred hooks in reverse registration
    /// order.
    ///
    /// Idempotent: the first call drains the hooks and reports the first
    /// hook failure; later calls return Ok. Reads after close fail with
    /// [Error::Closed].
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, SeqCst) {
            return Ok(());
        }
        let mut hooks: Vec<DeferHook> = std::mem::take(&mut *self.inner.defers.lock().unwrap());
        let mut first_failure = None;
        while let Some(hook) = hooks.pop() {
            self.inner.counters.inc(Counter::DeferredHooks);
            if let Err(err) = hook() {
                warn!(?err, "deferred close hook failed");
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
        debug!(counters = ?self.inner.counters, "closed");
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn push_defer(&self, hook: DeferHook) {
        self.inner.defers.lock().unwrap().push(hook);
    }

    // Internals ------------------------------------------------------------

    /// Materialise any directory generators on the way to `p`, so the
    /// tree below them is populated before routing.
    ///
    /// Each round materialises one deeper directory, so this terminates
    /// within the depth of `p`.
    fn ensure_resolved(&self, p: &str) -> Result<()> {
        loop {
            let pending = {
                let tree = self.inner.tree.read().unwrap();
                match tree.resolve(p) {
                    Resolve::Exact(node) => node
                        .producer()
                        .filter(|producer| producer.is_dir_gen())
                        .map(|producer| (Arc::clone(producer), p.to_owned(), node.mode())),
                    Resolve::Ancestor { node, path } => node
                        .producer()
                        .filter(|producer| producer.is_dir_gen())
                        .map(|producer| (Arc::clone(producer), path, node.mode())),
                    Resolve::None => None,
                }
            };
            match pending {
                Some((producer, node_path, mode)) if !self.inner.cache.has(&node_path) => {
                    self.materialise(&node_path, &producer, &node_path, mode, p)?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn route(&self, p: &str) -> Route {
        let tree = self.inner.tree.read().unwrap();
        match tree.resolve(p) {
            Resolve::Exact(node) => match node.kind() {
                Kind::File => match node.producer() {
                    Some(producer) => Route::Produce {
                        producer: Arc::clone(producer),
                        node_path: p.to_owned(),
                        mode: node.mode(),
                    },
                    None => Route::Unreadable,
                },
                Kind::Dir => match node.producer() {
                    Some(producer) => match &**producer {
                        Producer::Server(_) => Route::ServerDirSelf,
                        _ => Route::Produce {
                            producer: Arc::clone(producer),
                            node_path: p.to_owned(),
                            mode: node.mode(),
                        },
                    },
                    None => {
                        if node.has_children() {
                            Route::ServeDir {
                                mode: node.mode(),
                                entries: node.entries(),
                            }
                        } else {
                            Route::Backing
                        }
                    }
                },
            },
            Resolve::Ancestor { node, path } => match node.producer() {
                Some(producer)
                    if matches!(&**producer, Producer::Server(_) | Producer::Mount { .. }) =>
                {
                    Route::Produce {
                        producer: Arc::clone(producer),
                        node_path: path,
                        mode: node.mode(),
                    }
                }
                // A directory generator here was already materialised by
                // ensure_resolved and still doesn't know this path.
                _ => Route::Backing,
            },
            Resolve::None => Route::Backing,
        }
    }

    /// The tree's contribution to a directory listing, or None when the
    /// tree has nothing to say about `p`.
    fn dir_tree_side(&self, p: &str) -> Result<Option<Vec<DirEntry>>> {
        enum Side {
            Entries(Vec<DirEntry>),
            Mount {
                producer: Arc<Producer>,
                node_path: String,
                mode: u32,
            },
            ServerDir,
            NotADir,
            None,
        }
        let side = {
            let tree = self.inner.tree.read().unwrap();
            match tree.resolve(p) {
                Resolve::Exact(node) => match node.kind() {
                    Kind::File => Side::NotADir,
                    Kind::Dir => match node.producer() {
                        Some(producer) => match &**producer {
                            Producer::Mount { .. } => Side::Mount {
                                producer: Arc::clone(producer),
                                node_path: p.to_owned(),
                                mode: node.mode(),
                            },
                            Producer::Server(_) => Side::ServerDir,
                            _ => Side::Entries(node.entries()),
                        },
                        None => Side::Entries(node.entries()),
                    },
                },
                Resolve::Ancestor { node, path } => match node.producer() {
                    Some(producer) if matches!(&**producer, Producer::Mount { .. }) => {
                        Side::Mount {
                            producer: Arc::clone(producer),
                            node_path: path,
                            mode: node.mode(),
                        }
                    }
                    _ => Side::None,
                },
                Resolve::None => Side::None,
            }
        };
        match side {
            Side::Entries(entries) => Ok(Some(entries)),
            Side::Mount {
                producer,
                node_path,
                mode,
            } => match self.materialise(p, &producer, &node_path, mode, p)? {
                VirtualEntry::Dir { entries, .. } => Ok(Some(entries)),
                VirtualEntry::File { .. } => Err(Error::InvalidPath {
                    path: p.to_owned(),
                    reason: "not a directory",
                }),
            },
            Side::ServerDir => Err(Error::InvalidPath {
                path: p.to_owned(),
                reason: "a file server cannot serve its own directory",
            }),
            Side::NotADir => Err(Error::InvalidPath {
                path: p.to_owned(),
                reason: "not a directory",
            }),
            Side::None => Ok(None),
        }
    }

    /// Run one producer under the single-flight gate for its cache key
    /// and record the result.
    ///
    /// `key` is the target for file producers and the node's own path for
    /// directory generators. The link list is committed before the cache
    /// entry appears, so a change sweep can never see the entry without
    /// its dependencies.
    fn materialise(
        &self,
        key: &str,
        producer: &Producer,
        node_path: &str,
        node_mode: u32,
        target: &str,
    ) -> Result<VirtualEntry> {
        let gate = {
            let mut flight = self.inner.flight.lock().unwrap();
            Arc::clone(flight.entry(key.to_owned()).or_default())
        };
        let _guard = gate.lock().unwrap();
        if let Some(entry) = self.inner.cache.get(key) {
            self.inner.counters.inc(Counter::CacheHits);
            return Ok(entry);
        }
        self.inner.counters.inc(Counter::ProducerRuns);
        trace!(path = %key, "run producer");
        let scope = ScopedFs::new(self.clone(), key);
        let produced: Result<VirtualEntry> = match producer {
            Producer::File(gen) | Producer::Server(gen) => {
                let mut file = GenFile::new(node_path, target);
                gen.generate(&scope, &mut file).map(|()| {
                    let mode = file.mode();
                    let data = std::mem::take(&mut file.data);
                    VirtualEntry::File {
                        path: target.to_owned(),
                        mode,
                        data: data.into(),
                    }
                })
            }
            Producer::Dir(gen) => {
                let dir = GenDir::new(self.clone(), node_path, target, node_mode);
                gen.generate(&scope, &dir).map(|()| {
                    let entries = self
                        .inner
                        .tree
                        .read()
                        .unwrap()
                        .lookup(node_path)
                        .map(|node| node.entries())
                        .unwrap_or_default();
                    VirtualEntry::Dir {
                        path: node_path.to_owned(),
                        mode: node_mode,
                        entries,
                    }
                })
            }
            Producer::Mount { fsys, dir } => self.read_mounted(fsys.as_ref(), dir, target),
        };
        match produced {
            Ok(entry) => {
                self.inner.links.replace(key, scope.into_links());
                self.inner.cache.set(key, entry.clone());
                debug!(path = %key, "materialised");
                Ok(entry)
            }
            // Failures populate nothing: the next read starts over.
            Err(err) => match producer {
                Producer::Mount { .. } => Err(err),
                _ => Err(Error::Generate {
                    path: key.to_owned(),
                    source: Box::new(err),
                }),
            },
        }
    }

    fn read_mounted(&self, fsys: &dyn Fsys, mount_dir: &str, target: &str) -> Result<VirtualEntry> {
        let rel = opath::strip_prefix(target, mount_dir).ok_or(Error::InvalidPath {
            path: target.to_owned(),
            reason: "outside the mount",
        })?;
        match fsys.metadata(rel) {
            Err(err) if err.is_not_found() => Err(Error::NotFound {
                path: target.to_owned(),
            }),
            Err(err) => Err(err.into()),
            Ok(meta) => match meta.kind {
                Kind::File => Ok(VirtualEntry::File {
                    path: target.to_owned(),
                    mode: meta.mode,
                    data: fsys.read_file(rel)?,
                }),
                Kind::Dir => Ok(VirtualEntry::Dir {
                    path: target.to_owned(),
                    mode: meta.mode,
                    entries: fsys.list_dir(rel)?,
                }),
            },
        }
    }

    fn open_backing(&self, p: &str) -> Result<VirtualEntry> {
        self.inner.counters.inc(Counter::BackingReads);
        let backing = self.backing();
        match backing.metadata(p) {
            Err(err) if err.is_not_found() => Err(Error::NotFound { path: p.to_owned() }),
            Err(err) => Err(err.into()),
            Ok(meta) => match meta.kind {
                Kind::File => Ok(VirtualEntry::File {
                    path: p.to_owned(),
                    mode: meta.mode,
                    data: backing.read_file(p)?,
                }),
                Kind::Dir => Ok(VirtualEntry::Dir {
                    path: p.to_owned(),
                    mode: meta.mode,
                    entries: backing.list_dir(p)?,
                }),
            },
        }
    }
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("closed", &self.inner.closed.load(SeqCst))
            .field("counters", &self.inner.counters)
            .finish_non_exhaustive()
    }
}
