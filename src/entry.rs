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

//! Entries served by the overlay: directory listings, stat metadata, and
//! materialised virtual files and directories.

use bytes::Bytes;

use crate::kind::Kind;

/// A directory entry, from the generator tree or a backing filesystem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    /// Name of the entry within the directory being listed.
    pub name: String,
    /// Kind of entry.
    pub kind: Kind,
    /// Unix-style permission bits.
    pub mode: u32,
}

/// Stat metadata about one entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Metadata {
    pub kind: Kind,
    pub mode: u32,
    /// File length; zero for directories.
    pub len: u64,
}

/// A materialised entry: what one producer run yielded for one path.
///
/// Entries are immutable once inserted into the cache. Readers get clones;
/// file data is shared, not copied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VirtualEntry {
    File {
        path: String,
        mode: u32,
        data: Bytes,
    },
    Dir {
        path: String,
        mode: u32,
        entries: Vec<DirEntry>,
    },
}

impl VirtualEntry {
    pub fn path(&self) -> &str {
        match self {
            VirtualEntry::File { path, .. } | VirtualEntry::Dir { path, .. } => path,
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            VirtualEntry::File { .. } => Kind::File,
            VirtualEntry::Dir { .. } => Kind::Dir,
        }
    }

    pub fn mode(&self) -> u32 {
        match self {
            VirtualEntry::File { mode, .. } | VirtualEntry::Dir { mode, .. } => *mode,
        }
    }

    /// File content, if this is a file.
    pub fn file_data(&self) -> Option<&Bytes> {
        match self {
            VirtualEntry::File { data, .. } => Some(data),
            VirtualEntry::Dir { .. } => None,
        }
    }

    /// Child entries, if this is a directory.
    pub fn dir_entries(&self) -> Option<&[DirEntry]> {
        match self {
            VirtualEntry::File { .. } => None,
            VirtualEntry::Dir { entries, .. } => Some(entries),
        }
    }

    pub fn metadata(&self) -> Metadata {
        match self {
            VirtualEntry::File { mode, data, .. } => Metadata {
                kind: Kind::File,
                mode: *mode,
                len: data.len() as u64,
            },
            VirtualEntry::Dir { mode, .. } => Metadata {
                kind: Kind::Dir,
                mode: *mode,
                len: 0,
            },
        }
    }
}
