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

//! What each generated path read while it was being produced.
//!
//! Every producer run rebuilds its target's list from scratch; the list
//! replaces the previous one only if the run succeeds. A change sweep asks
//! each list whether a changed path would have affected the run that
//! recorded it.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::glob::Pattern;
use crate::opath;

/// The operation that recorded an exact dependency: a real read, or an
/// explicit link that never touched the path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Op {
    Open,
    Link,
}

/// One recorded dependency of a generated path.
#[derive(Clone, Debug)]
pub enum Link {
    /// The producer read, or explicitly linked, exactly this path.
    Exact { op: Op, path: String },
    /// The producer listed this directory; the directory itself or any
    /// direct child affects it.
    ReadDir { dir: String },
    /// The producer globbed; any matching path affects it.
    Glob { pattern: Pattern },
}

impl Link {
    /// Would a change to `opath` have affected the run that recorded this?
    pub fn accepts(&self, opath: &str) -> bool {
        match self {
            Link::Exact { path, .. } => path == opath,
            Link::ReadDir { dir } => opath == dir || opath::parent(opath) == Some(dir.as_str()),
            Link::Glob { pattern } => pattern.is_match(opath),
        }
    }
}

/// True iff any record in the list accepts the changed path.
///
/// Short-circuits on the first match.
pub fn check(links: &[Link], opath: &str) -> bool {
    links.iter().any(|link| link.accepts(opath))
}

/// Per-generated-path dependency lists.
///
/// One lock covers the whole map: `range` runs under the read guard and
/// replacement takes the write guard, so a check never observes a list
/// mid-replacement.
#[derive(Debug, Default)]
pub struct LinkMap {
    lists: RwLock<HashMap<String, Vec<Link>>>,
}

impl LinkMap {
    /// Install the list a fresh producer run recorded for its target.
    pub fn replace(&self, target: &str, links: Vec<Link>) {
        self.lists.write().unwrap().insert(target.to_owned(), links);
    }

    /// Drop the list of an evicted path.
    pub fn remove(&self, target: &str) {
        self.lists.write().unwrap().remove(target);
    }

    /// Visit every (generated path, list) pair, in unspecified order.
    ///
    /// Return false from the callback to stop early.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &[Link]) -> bool,
    {
        for (target, links) in self.lists.read().unwrap().iter() {
            if !f(target, links) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::glob::Pattern;

    #[test]
    fn exact_matches_by_equality() {
        let link = Link::Exact {
            op: Op::Open,
            path: "a/b".to_owned(),
        };
        assert!(link.accepts("a/b"));
        assert!(!link.accepts("a/b/c"));
        assert!(!link.accepts("a"));
    }

    #[test]
    fn readdir_matches_dir_and_direct_children() {
        let link = Link::ReadDir {
            dir: "x".to_owned(),
        };
        assert!(link.accepts("x"));
        assert!(link.accepts("x/1.md"));
        assert!(!link.accepts("x/sub/2.md"));
        assert!(!link.accepts("y"));
    }

    #[test]
    fn readdir_on_root_matches_top_level() {
        let link = Link::ReadDir {
            dir: ".".to_owned(),
        };
        assert!(link.accepts("."));
        assert!(link.accepts("top"));
        assert!(!link.accepts("top/nested"));
    }

    #[test]
    fn glob_matches_by_pattern() {
        let link = Link::Glob {
            pattern: Pattern::compile("x/*.md").unwrap(),
        };
        assert!(link.accepts("x/3.md"));
        assert!(!link.accepts("x/3.txt"));
    }

    #[test]
    fn check_any_record() {
        let links = vec![
            Link::Exact {
                op: Op::Open,
                path: "in".to_owned(),
            },
            Link::ReadDir {
                dir: "x".to_owned(),
            },
        ];
        assert!(check(&links, "in"));
        assert!(check(&links, "x/new"));
        assert!(!check(&links, "unrelated"));
        assert!(!check(&[], "in"));
    }

    #[test]
    fn replace_and_range() {
        let map = LinkMap::default();
        map.replace(
            "out",
            vec![Link::Exact {
                op: Op::Open,
                path: "in".to_owned(),
            }],
        );
        let mut seen = Vec::new();
        map.range(|target, links| {
            seen.push((target.to_owned(), links.len()));
            true
        });
        assert_eq!(seen, [("out".to_owned(), 1)]);
        map.remove("out");
        let mut any = false;
        map.range(|_, _| {
            any = true;
            true
        });
        assert!(!any);
    }
}
