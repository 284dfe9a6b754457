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

//! A generative virtual filesystem overlay.
//!
//! Budfs merges a tree of lazily generated files with a real backing
//! filesystem under one read-only, path-addressed namespace. Generators
//! observe each other's output through the same namespace; what each one
//! reads is recorded while it runs, so [Overlay::change] can evict
//! exactly the cached entries a source edit can reach, transitively.
//!
//! The overlay lives for the process: nothing is persisted, and
//! invalidation is in-process only.

pub mod cache;
pub mod context;
pub mod counters;
pub mod entry;
mod errors;
pub mod fsys;
pub mod glob;
pub mod kind;
pub mod linkmap;
pub mod opath;
pub mod overlay;
pub mod producer;
pub mod scoped;
pub mod test_fixtures;
pub mod tree;

pub use crate::context::Context;
pub use crate::counters::{Counter, Counters};
pub use crate::entry::{DirEntry, Metadata, VirtualEntry};
pub use crate::errors::Error;
pub use crate::fsys::{Fsys, LocalFsys, MemoryFsys, WriteFsys};
pub use crate::glob::Pattern;
pub use crate::kind::Kind;
pub use crate::overlay::Overlay;
pub use crate::producer::{DirGen, FileGen, GenDir, GenFile};
pub use crate::scoped::ScopedFs;

/// Result type used through the library.
pub type Result<T> = std::result::Result<T, Error>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
