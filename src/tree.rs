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

//! The trie of bound paths: one node per path component, with producers
//! hanging off the nodes that generate something.

use std::sync::Arc;

use crate::entry::DirEntry;
use crate::kind::Kind;
use crate::opath;
use crate::producer::Producer;
use crate::{Error, Result};

/// One node in the tree: a file or directory named by its path from the
/// root.
///
/// Children keep insertion order, so listings are stable. File nodes have
/// no children.
#[derive(Debug)]
pub struct Node {
    name: String,
    kind: Kind,
    mode: u32,
    producer: Option<Arc<Producer>>,
    children: Vec<Node>,
}

impl Node {
    fn new_dir(name: &str) -> Node {
        Node {
            name: name.to_owned(),
            kind: Kind::Dir,
            mode: Kind::Dir.default_mode(),
            producer: None,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn producer(&self) -> Option<&Arc<Producer>> {
        self.producer.as_ref()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Children as directory entries, in insertion order.
    pub fn entries(&self) -> Vec<DirEntry> {
        self.children
            .iter()
            .map(|c| DirEntry {
                name: c.name.clone(),
                kind: c.kind,
                mode: c.mode,
            })
            .collect()
    }
}

/// Where a lookup landed.
#[derive(Debug)]
pub enum Resolve<'a> {
    /// The path is bound exactly.
    Exact(&'a Node),
    /// The deepest ancestor that can answer for descendants: a directory
    /// generator, file server, or mount.
    Ancestor { node: &'a Node, path: String },
    /// Nothing in the tree serves this path.
    None,
}

/// The tree of all bound paths, rooted at `"."`.
#[derive(Debug)]
pub struct Tree {
    root: Node,
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

impl Tree {
    pub fn new() -> Tree {
        Tree {
            root: Node::new_dir(opath::ROOT),
        }
    }

    /// Bind a producer at a path, creating missing ancestor directories
    /// with the default directory mode.
    ///
    /// Rebinding an already-bound path replaces the producer and, for
    /// directories, keeps the children. Binding a file where a directory
    /// is (or the reverse) is an error, as is binding below a file.
    pub fn bind(
        &mut self,
        opath: &str,
        kind: Kind,
        mode: u32,
        producer: Arc<Producer>,
    ) -> Result<()> {
        if opath == opath::ROOT {
            if kind != Kind::Dir {
                return Err(Error::InvalidPath {
                    path: opath.to_owned(),
                    reason: "cannot bind a file at the root",
                });
            }
            self.root.producer = Some(producer);
            return Ok(());
        }
        let segments: Vec<&str> = opath::segments(opath).collect();
        let (last, parents) = segments.split_last().expect("cleaned non-root path");
        let mut node = &mut self.root;
        for seg in parents {
            if !node.kind.is_dir() {
                return Err(Error::InvalidPath {
                    path: opath.to_owned(),
                    reason: "an ancestor is a file",
                });
            }
            if node.child(seg).is_none() {
                node.children.push(Node::new_dir(seg));
            }
            let pos = node
                .children
                .iter()
                .position(|c| c.name == *seg)
                .expect("child just ensured");
            node = &mut node.children[pos];
        }
        if !node.kind.is_dir() {
            return Err(Error::InvalidPath {
                path: opath.to_owned(),
                reason: "an ancestor is a file",
            });
        }
        match node.children.iter().position(|c| c.name == *last) {
            Some(pos) => {
                let child = &mut node.children[pos];
                if child.kind != kind {
                    return Err(Error::InvalidPath {
                        path: opath.to_owned(),
                        reason: "already bound with a different kind",
                    });
                }
                child.producer = Some(producer);
                child.mode = mode;
            }
            None => node.children.push(Node {
                name: (*last).to_owned(),
                kind,
                mode,
                producer: Some(producer),
                children: Vec::new(),
            }),
        }
        Ok(())
    }

    /// The node at exactly this path, if any.
    pub fn lookup(&self, opath: &str) -> Option<&Node> {
        let mut node = &self.root;
        for seg in opath::segments(opath) {
            node = node.child(seg)?;
        }
        Some(node)
    }

    /// The node at this path, or the deepest ancestor whose producer can
    /// answer for descendants.
    pub fn resolve(&self, opath: &str) -> Resolve<'_> {
        let mut node = &self.root;
        let mut node_path = opath::ROOT.to_owned();
        let mut best: Option<(&Node, String)> = None;
        for seg in opath::segments(opath) {
            if let Some(producer) = &node.producer {
                if producer.serves_descendants() {
                    best = Some((node, node_path.clone()));
                }
            }
            match node.child(seg) {
                Some(child) => {
                    node_path = opath::join(&node_path, seg);
                    node = child;
                }
                None => {
                    return match best {
                        Some((node, path)) => Resolve::Ancestor { node, path },
                        None => Resolve::None,
                    }
                }
            }
        }
        Resolve::Exact(node)
    }
}
