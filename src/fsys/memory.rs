// Budfs generative filesystem overlay.
// Copyright 2025 Martin Pool.

//! An in-memory filesystem: a mount source, a sync destination, and the
//! easiest backing tree to set up in tests.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use crate::entry::{DirEntry, Metadata};
use crate::fsys::{Error, Fsys, Result, WriteFsys};
use crate::kind::Kind;
use crate::opath;

#[derive(Debug)]
enum MemoryNode {
    File { data: Bytes, mode: u32 },
    Dir { mode: u32 },
}

impl MemoryNode {
    fn kind(&self) -> Kind {
        match self {
            MemoryNode::File { .. } => Kind::File,
            MemoryNode::Dir { .. } => Kind::Dir,
        }
    }

    fn mode(&self) -> u32 {
        match self {
            MemoryNode::File { mode, .. } | MemoryNode::Dir { mode } => *mode,
        }
    }
}

/// An in-memory tree of files and directories.
///
/// Clones share the same tree, so a test can keep a handle and mutate the
/// content after handing the filesystem to an overlay. The root directory
/// always exists.
#[derive(Clone, Debug, Default)]
pub struct MemoryFsys {
    nodes: Arc<RwLock<BTreeMap<String, MemoryNode>>>,
}

impl MemoryFsys {
    pub fn new() -> MemoryFsys {
        MemoryFsys::default()
    }

    /// Add one file, creating missing parent directories.
    ///
    /// Replaces any previous file at the same path. Panics on a malformed
    /// path.
    pub fn add_file<B: Into<Bytes>>(&self, opath: &str, data: B) -> &Self {
        let p = opath::clean(opath).expect("valid opath");
        assert_ne!(p, opath::ROOT, "cannot add a file at the root");
        let mut nodes = self.nodes.write().unwrap();
        Self::add_parents(&mut nodes, &p);
        nodes.insert(
            p,
            MemoryNode::File {
                data: data.into(),
                mode: Kind::File.default_mode(),
            },
        );
        self
    }

    /// Add one directory, creating missing parents. Panics on a malformed
    /// path.
    pub fn add_dir(&self, opath: &str) -> &Self {
        let p = opath::clean(opath).expect("valid opath");
        if p != opath::ROOT {
            let mut nodes = self.nodes.write().unwrap();
            Self::add_parents(&mut nodes, &p);
            nodes.entry(p).or_insert(MemoryNode::Dir {
                mode: Kind::Dir.default_mode(),
            });
        }
        self
    }

    /// Remove one file or empty directory, if present.
    pub fn remove(&self, opath: &str) -> &Self {
        if let Ok(p) = opath::clean(opath) {
            self.nodes.write().unwrap().remove(&p);
        }
        self
    }

    /// All paths in the tree, in sorted order, not including the root.
    pub fn paths(&self) -> Vec<String> {
        self.nodes.read().unwrap().keys().cloned().collect()
    }

    fn add_parents(nodes: &mut BTreeMap<String, MemoryNode>, p: &str) {
        let mut ancestor = opath::parent(p);
        while let Some(a) = ancestor {
            if a == opath::ROOT {
                break;
            }
            nodes.entry(a.to_owned()).or_insert(MemoryNode::Dir {
                mode: Kind::Dir.default_mode(),
            });
            ancestor = opath::parent(a);
        }
    }
}

impl Fsys for MemoryFsys {
    fn read_file(&self, opath: &str) -> Result<Bytes> {
        let nodes = self.nodes.read().unwrap();
        match nodes.get(opath) {
            Some(MemoryNode::File { data, .. }) => Ok(data.clone()),
            Some(MemoryNode::Dir { .. }) => Err(Error::Io {
                path: opath.to_owned(),
                source: io::Error::new(io::ErrorKind::Other, "is a directory"),
            }),
            None => Err(Error::NotFound {
                path: opath.to_owned(),
            }),
        }
    }

    fn list_dir(&self, opath: &str) -> Result<Vec<DirEntry>> {
        let nodes = self.nodes.read().unwrap();
        if opath != opath::ROOT {
            match nodes.get(opath) {
                Some(MemoryNode::Dir { .. }) => (),
                Some(MemoryNode::File { .. }) => {
                    return Err(Error::Io {
                        path: opath.to_owned(),
                        source: io::Error::new(io::ErrorKind::Other, "not a directory"),
                    })
                }
                None => {
                    return Err(Error::NotFound {
                        path: opath.to_owned(),
                    })
                }
            }
        }
        // BTreeMap order sorts children of one directory by name.
        Ok(nodes
            .iter()
            .filter(|(p, _)| opath::parent(p) == Some(opath))
            .map(|(p, node)| DirEntry {
                name: p.rsplit('/').next().unwrap().to_owned(),
                kind: node.kind(),
                mode: node.mode(),
            })
            .collect())
    }

    fn metadata(&self, opath: &str) -> Result<Metadata> {
        if opath == opath::ROOT {
            return Ok(Metadata {
                kind: Kind::Dir,
                mode: Kind::Dir.default_mode(),
                len: 0,
            });
        }
        let nodes = self.nodes.read().unwrap();
        match nodes.get(opath) {
            Some(node) => Ok(Metadata {
                kind: node.kind(),
                mode: node.mode(),
                len: match node {
                    MemoryNode::File { data, .. } => data.len() as u64,
                    MemoryNode::Dir { .. } => 0,
                },
            }),
            None => Err(Error::NotFound {
                path: opath.to_owned(),
            }),
        }
    }
}

impl WriteFsys for MemoryFsys {
    fn make_dir(&self, opath: &str) -> Result<()> {
        let p = cleaned(opath)?;
        if p != opath::ROOT {
            let mut nodes = self.nodes.write().unwrap();
            Self::add_parents(&mut nodes, &p);
            nodes.entry(p).or_insert(MemoryNode::Dir {
                mode: Kind::Dir.default_mode(),
            });
        }
        Ok(())
    }

    fn write_file(&self, opath: &str, content: &[u8]) -> Result<()> {
        let p = cleaned(opath)?;
        if p == opath::ROOT {
            return Err(Error::Io {
                path: p,
                source: io::Error::new(io::ErrorKind::InvalidInput, "is a directory"),
            });
        }
        let mut nodes = self.nodes.write().unwrap();
        Self::add_parents(&mut nodes, &p);
        nodes.insert(
            p,
            MemoryNode::File {
                data: Bytes::from(content.to_vec()),
                mode: Kind::File.default_mode(),
            },
        );
        Ok(())
    }
}

fn cleaned(opath: &str) -> Result<String> {
    opath::clean(opath).map_err(|_| Error::Io {
        path: opath.to_owned(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "malformed path"),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_and_read() {
        let fsys = MemoryFsys::new();
        fsys.add_file("a/b.txt", "content");
        assert_eq!(fsys.read_file("a/b.txt").unwrap(), "content");
        assert!(fsys.read_file("a/absent").unwrap_err().is_not_found());
    }

    #[test]
    fn parents_are_implied() {
        let fsys = MemoryFsys::new();
        fsys.add_file("x/y/z.txt", "z");
        assert_eq!(fsys.metadata("x").unwrap().kind, Kind::Dir);
        assert_eq!(fsys.metadata("x/y").unwrap().kind, Kind::Dir);
        let names: Vec<String> = fsys
            .list_dir("x")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["y"]);
    }

    #[test]
    fn list_root() {
        let fsys = MemoryFsys::new();
        fsys.add_file("b", "b").add_file("a", "a").add_dir("c");
        let names: Vec<String> = fsys
            .list_dir(".")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn clones_share_content() {
        let fsys = MemoryFsys::new();
        let other = fsys.clone();
        fsys.add_file("in", "v1");
        assert_eq!(other.read_file("in").unwrap(), "v1");
        other.add_file("in", "v2");
        assert_eq!(fsys.read_file("in").unwrap(), "v2");
    }
}
