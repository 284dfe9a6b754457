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

//! Producers: generator callbacks bound into the tree, and the handles
//! they receive.

use std::fmt;
use std::sync::Arc;

use crate::fsys::Fsys;
use crate::kind::DEFAULT_FILE_MODE;
use crate::opath;
use crate::overlay::Overlay;
use crate::scoped::ScopedFs;
use crate::Result;

/// Generates the content of a single file.
///
/// Implemented for closures, so `|fs, file| { ... }` registers directly.
pub trait FileGen: Send + Sync {
    fn generate(&self, fs: &ScopedFs, file: &mut GenFile) -> Result<()>;
}

impl<F> FileGen for F
where
    F: Fn(&ScopedFs, &mut GenFile) -> Result<()> + Send + Sync,
{
    fn generate(&self, fs: &ScopedFs, file: &mut GenFile) -> Result<()> {
        self(fs, file)
    }
}

/// Populates a directory with child bindings on first use.
pub trait DirGen: Send + Sync {
    fn generate(&self, fs: &ScopedFs, dir: &GenDir) -> Result<()>;
}

impl<F> DirGen for F
where
    F: Fn(&ScopedFs, &GenDir) -> Result<()> + Send + Sync,
{
    fn generate(&self, fs: &ScopedFs, dir: &GenDir) -> Result<()> {
        self(fs, dir)
    }
}

/// A producer bound to one tree node.
#[derive(Clone)]
pub enum Producer {
    /// Generates one file at the bound path.
    File(Arc<dyn FileGen>),
    /// Populates the bound directory the first time anything below it is
    /// requested.
    Dir(Arc<dyn DirGen>),
    /// Generates a file for each requested path below the bound directory.
    Server(Arc<dyn FileGen>),
    /// Serves a foreign read-only filesystem mounted at `dir`.
    Mount { fsys: Arc<dyn Fsys>, dir: String },
}

impl Producer {
    /// Can this producer answer for paths below its node?
    pub(crate) fn serves_descendants(&self) -> bool {
        matches!(
            self,
            Producer::Dir(_) | Producer::Server(_) | Producer::Mount { .. }
        )
    }

    pub(crate) fn is_dir_gen(&self) -> bool {
        matches!(self, Producer::Dir(_))
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producer::File(_) => f.write_str("Producer::File"),
            Producer::Dir(_) => f.write_str("Producer::Dir"),
            Producer::Server(_) => f.write_str("Producer::Server"),
            Producer::Mount { dir, .. } => write!(f, "Producer::Mount({dir:?})"),
        }
    }
}

/// The handle a file generator writes into.
///
/// `path` is where the producer is bound and `target` is the path the
/// caller asked for; they differ only for file servers.
#[derive(Debug)]
pub struct GenFile {
    path: String,
    target: String,
    mode: u32,
    /// Content of the generated file. The generator assigns or appends;
    /// whatever is here when the callback returns is the file.
    pub data: Vec<u8>,
}

impl GenFile {
    pub(crate) fn new(path: &str, target: &str) -> GenFile {
        GenFile {
            path: path.to_owned(),
            target: target.to_owned(),
            mode: DEFAULT_FILE_MODE,
            data: Vec::new(),
        }
    }

    /// The path the producer is bound at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path the caller asked for.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Choose the generated file's mode bits.
    pub fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    /// The target relative to the bound path, or `"."` for the bound path
    /// itself.
    pub fn relative(&self) -> &str {
        opath::strip_prefix(&self.target, &self.path).unwrap_or(opath::ROOT)
    }
}

/// The handle a directory generator registers children through.
///
/// Bindings made here land below the generated directory; the handle
/// rejects paths that escape it.
#[derive(Debug)]
pub struct GenDir {
    overlay: Overlay,
    path: String,
    target: String,
    mode: u32,
}

impl GenDir {
    pub(crate) fn new(overlay: Overlay, path: &str, target: &str, mode: u32) -> GenDir {
        GenDir {
            overlay,
            path: path.to_owned(),
            target: target.to_owned(),
            mode,
        }
    }

    /// The directory the producer is bound at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The requested path that triggered population.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// The target relative to the bound directory, or `"."`.
    pub fn relative(&self) -> &str {
        opath::strip_prefix(&self.target, &self.path).unwrap_or(opath::ROOT)
    }

    fn below(&self, rel: &str) -> Result<String> {
        let rel = opath::clean(rel)?;
        Ok(opath::join(&self.path, &rel))
    }

    /// Bind a file generator below this directory.
    pub fn generate_file<G: FileGen + 'static>(&self, rel: &str, gen: G) -> Result<()> {
        self.overlay.generate_file(&self.below(rel)?, gen)
    }

    /// Bind a file generator below this directory, from a shared trait
    /// object.
    pub fn file_generator(&self, rel: &str, gen: Arc<dyn FileGen>) -> Result<()> {
        self.overlay.file_generator(&self.below(rel)?, gen)
    }

    /// Bind a directory generator below this directory.
    pub fn generate_dir<G: DirGen + 'static>(&self, rel: &str, gen: G) -> Result<()> {
        self.overlay.generate_dir(&self.below(rel)?, gen)
    }

    pub fn dir_generator(&self, rel: &str, gen: Arc<dyn DirGen>) -> Result<()> {
        self.overlay.dir_generator(&self.below(rel)?, gen)
    }

    /// Bind a file server below this directory.
    pub fn serve_file<G: FileGen + 'static>(&self, rel: &str, gen: G) -> Result<()> {
        self.overlay.serve_file(&self.below(rel)?, gen)
    }

    pub fn file_server(&self, rel: &str, gen: Arc<dyn FileGen>) -> Result<()> {
        self.overlay.file_server(&self.below(rel)?, gen)
    }

    /// Mount a foreign filesystem below this directory.
    pub fn mount(&self, rel: &str, fsys: Arc<dyn Fsys>) -> Result<()> {
        self.overlay.mount(&self.below(rel)?, fsys)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn genfile_relative() {
        let file = GenFile::new("serve", "serve/a/b.txt");
        assert_eq!(file.relative(), "a/b.txt");
        let own = GenFile::new("a.txt", "a.txt");
        assert_eq!(own.relative(), ".");
    }

    #[test]
    fn genfile_defaults() {
        let mut file = GenFile::new("a.txt", "a.txt");
        assert_eq!(file.mode(), DEFAULT_FILE_MODE);
        assert!(file.data.is_empty());
        file.set_mode(0o755);
        assert_eq!(file.mode(), 0o755);
    }
}
