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

//! Backing filesystem contract, exercised through trait objects the way
//! the overlay holds them.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use budfs::fsys::Fsys;
use budfs::test_fixtures::ScratchTree;
use budfs::{Kind, LocalFsys, MemoryFsys, Overlay, WriteFsys};

#[test]
fn local_tree_through_a_trait_object() {
    let tree = ScratchTree::new();
    tree.create_dir("sub");
    tree.create_file("sub/one.txt", b"one");
    tree.create_file("two.txt", b"two");

    let fsys: Arc<dyn Fsys> = Arc::new(tree.fsys());
    assert_eq!(fsys.read_file("sub/one.txt").unwrap(), "one");
    let root_names: Vec<String> = fsys
        .list_dir(".")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(root_names, ["sub", "two.txt"]);
    assert_eq!(fsys.metadata("sub").unwrap().kind, Kind::Dir);
    assert!(fsys.read_file("missing").unwrap_err().is_not_found());
}

#[test]
fn local_tree_backs_an_overlay() {
    let tree = ScratchTree::new();
    tree.create_file("real.txt", b"from disk");
    let overlay = Overlay::local(tree.path());
    let entry = overlay.open("real.txt").unwrap();
    assert_eq!(entry.file_data().unwrap(), "from disk");
}

#[test]
fn memory_fsys_as_sync_destination() {
    let dest = MemoryFsys::new();
    dest.make_dir("a/b").unwrap();
    dest.write_file("a/b/c.txt", b"payload").unwrap();
    assert_eq!(dest.read_file("a/b/c.txt").unwrap(), "payload");
    assert_eq!(
        dest.paths(),
        ["a".to_owned(), "a/b".to_owned(), "a/b/c.txt".to_owned()]
    );
}

#[test]
fn local_write_fsys_roundtrip() {
    let tree = ScratchTree::new();
    let fsys = LocalFsys::new(tree.path());
    fsys.make_dir("out/deep").unwrap();
    fsys.write_file("out/deep/f.bin", b"\x00\x01\x02").unwrap();
    assert_eq!(fsys.read_file("out/deep/f.bin").unwrap(), &b"\x00\x01\x02"[..]);
    // Overwriting replaces the whole file.
    fsys.write_file("out/deep/f.bin", b"short").unwrap();
    assert_eq!(fsys.read_file("out/deep/f.bin").unwrap(), "short");
}
