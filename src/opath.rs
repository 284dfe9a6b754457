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

//! "Opaths" (overlay paths) are platform-independent relative paths naming
//! entries in the overlay namespace.
//!
//! Overlay paths are:
//!
//!  * Case-sensitive.
//!  * Components separated by `/`.
//!  * UTF-8, without consideration of normalization.
//!  * Relative: no leading slash, no `..`, no empty components.
//!
//! `"."` names the overlay root. Every public API cleans its path arguments
//! with [clean] before lookup, so `"a//b"` and `"./a/b"` address the same
//! entry as `"a/b"`.
//!
//! Opaths in memory are simply strings.

use crate::{Error, Result};

/// The overlay root.
pub const ROOT: &str = ".";

/// Normalise a path to its canonical overlay form.
///
/// Collapses `.` and empty components and strips any trailing slash. The
/// empty string cleans to the root. Absolute paths, `..` components, and
/// NUL bytes are rejected rather than resolved.
pub fn clean(path: &str) -> Result<String> {
    if path.contains('\0') {
        return invalid(path, "contains NUL");
    }
    if path.starts_with('/') {
        return invalid(path, "absolute paths are not allowed");
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => (),
            ".." => return invalid(path, "'..' components are not allowed"),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        Ok(ROOT.to_owned())
    } else {
        Ok(parts.join("/"))
    }
}

fn invalid<T>(path: &str, reason: &'static str) -> Result<T> {
    Err(Error::InvalidPath {
        path: path.to_owned(),
        reason,
    })
}

/// The directory containing a cleaned path, or None for the root.
///
/// A single-component path is directly under the root, so its parent is
/// `"."`.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        None
    } else {
        match path.rfind('/') {
            Some(i) => Some(&path[..i]),
            None => Some(ROOT),
        }
    }
}

/// Join a name onto a cleaned base path.
pub fn join(base: &str, name: &str) -> String {
    if base == ROOT {
        name.to_owned()
    } else if name == ROOT {
        base.to_owned()
    } else {
        format!("{base}/{name}")
    }
}

/// The components of a cleaned path, in order. The root has none.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ROOT)
}

/// `path` relative to `base`, if `path` is at or below it.
///
/// Returns `"."` when they are equal, and None when `path` is outside
/// `base`. Both arguments must already be cleaned.
pub fn strip_prefix<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base == ROOT {
        Some(path)
    } else if path == base {
        Some(ROOT)
    } else if path.len() > base.len() && path.starts_with(base) && path.as_bytes()[base.len()] == b'/'
    {
        Some(&path[base.len() + 1..])
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[test]
    fn clean_accepts_and_normalises() {
        let cases = [
            ("", "."),
            (".", "."),
            ("a", "a"),
            ("a/b", "a/b"),
            ("a//b", "a/b"),
            ("./a/b", "a/b"),
            ("a/./b", "a/b"),
            ("a/b/", "a/b"),
            ("a/.config", "a/.config"),
            ("a/..obscure", "a/..obscure"),
            ("a/...", "a/..."),
            ("kleine Katze Fuß", "kleine Katze Fuß"),
        ];
        for (raw, want) in cases {
            assert_eq!(clean(raw).unwrap(), want, "clean({raw:?})");
        }
    }

    #[test]
    fn clean_rejects() {
        let invalid_cases = ["/", "/a", "../a", "a/../b", "a/b/..", "..", "hello\0"];
        for v in invalid_cases {
            if clean(v).is_ok() {
                panic!("{:?} incorrectly accepted", v);
            }
        }
    }

    #[rstest]
    #[case(".", None)]
    #[case("a", Some("."))]
    #[case("a/b", Some("a"))]
    #[case("a/b/c", Some("a/b"))]
    fn parent_of(#[case] path: &str, #[case] want: Option<&str>) {
        assert_eq!(parent(path), want);
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join(".", "a"), "a");
        assert_eq!(join("a", "b"), "a/b");
        assert_eq!(join("a/b", "."), "a/b");
    }

    #[test]
    fn segments_of_root_are_empty() {
        assert_eq!(segments(".").count(), 0);
        assert_eq!(segments("a/b/c").collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn strip_prefix_cases() {
        assert_eq!(strip_prefix("a/b/c", "a"), Some("b/c"));
        assert_eq!(strip_prefix("a/b", "a/b"), Some("."));
        assert_eq!(strip_prefix("a/bc", "a/b"), None);
        assert_eq!(strip_prefix("x", "a"), None);
        assert_eq!(strip_prefix("a/b", "."), Some("a/b"));
    }
}
