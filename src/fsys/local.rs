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

//! Access to a tree on the local filesystem.

use std::fs::{create_dir_all, File};
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::entry::{DirEntry, Metadata};
use crate::fsys::{Error, Fsys, Result, WriteFsys};

/// Prefix on temporary files created while writing.
const TMP_PREFIX: &str = ".budfs-tmp";

/// A local directory serving as a backing filesystem or sync destination.
#[derive(Clone, Debug)]
pub struct LocalFsys {
    /// Root directory; all opaths resolve below it.
    root: PathBuf,
}

impl LocalFsys {
    pub fn new(path: &Path) -> Self {
        LocalFsys {
            root: path.to_owned(),
        }
    }

    pub fn full_path(&self, opath: &str) -> PathBuf {
        debug_assert!(!opath.contains("/../"), "path must not contain /../");
        self.root.join(opath)
    }

    fn mode_of(metadata: &std::fs::Metadata) -> u32 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o7777
        }
        #[cfg(not(unix))]
        {
            crate::kind::Kind::from(metadata.file_type()).default_mode()
        }
    }
}

impl Fsys for LocalFsys {
    fn read_file(&self, opath: &str) -> Result<Bytes> {
        let full_path = self.full_path(opath);
        let read = |full_path: &Path| -> io::Result<Bytes> {
            let mut file = File::open(full_path)?;
            let estimated_len = file.metadata()?.len() as usize;
            let mut out_buf = Vec::with_capacity(estimated_len);
            file.read_to_end(&mut out_buf)?;
            Ok(out_buf.into())
        };
        read(&full_path).map_err(|err| Error::io_error(opath, err))
    }

    fn list_dir(&self, opath: &str) -> Result<Vec<DirEntry>> {
        // Non-UTF-8 names should never normally occur in generator inputs,
        // but pass them back as lossy UTF-8 so they can at least be
        // reported at a higher level.
        let full_path = self.full_path(opath);
        let list = |full_path: &Path| -> io::Result<Vec<DirEntry>> {
            let mut entries = Vec::new();
            for de in full_path.read_dir()? {
                let de = de?;
                let metadata = de.metadata()?;
                entries.push(DirEntry {
                    name: de.file_name().to_string_lossy().into(),
                    kind: de.file_type()?.into(),
                    mode: Self::mode_of(&metadata),
                });
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        };
        list(&full_path).map_err(|err| Error::io_error(opath, err))
    }

    fn metadata(&self, opath: &str) -> Result<Metadata> {
        let fsmeta = std::fs::metadata(self.full_path(opath))
            .map_err(|err| Error::io_error(opath, err))?;
        Ok(Metadata {
            kind: fsmeta.file_type().into(),
            mode: Self::mode_of(&fsmeta),
            len: fsmeta.len(),
        })
    }
}

impl WriteFsys for LocalFsys {
    fn make_dir(&self, opath: &str) -> Result<()> {
        create_dir_all(self.full_path(opath)).map_err(|err| Error::io_error(opath, err))
    }

    fn write_file(&self, opath: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(opath);
        let dir = full_path.parent().expect("write path has a parent");
        let write = |dir: &Path| -> io::Result<()> {
            let mut temp = tempfile::Builder::new().prefix(TMP_PREFIX).tempfile_in(dir)?;
            if let Err(err) = temp.write_all(content) {
                let _ = temp.close();
                return Err(err);
            }
            if let Err(persist_error) = temp.persist(&full_path) {
                persist_error.file.close()?;
                Err(persist_error.error)
            } else {
                Ok(())
            }
        };
        write(dir).map_err(|err| Error::io_error(opath, err))
    }
}

#[cfg(test)]
mod test {
    use assert_fs::prelude::*;

    use super::*;
    use crate::kind::Kind;

    #[test]
    fn read_file_and_not_found() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("in.txt").write_str("hello").unwrap();
        let fsys = LocalFsys::new(temp.path());
        assert_eq!(fsys.read_file("in.txt").unwrap(), "hello");
        let err = fsys.read_file("absent").unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err:?}");
        temp.close().unwrap();
    }

    #[test]
    fn list_dir_sorted_with_kinds() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b dir").create_dir_all().unwrap();
        temp.child("a file").touch().unwrap();
        let fsys = LocalFsys::new(temp.path());
        let entries = fsys.list_dir(".").unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a file", "b dir"]);
        assert_eq!(entries[0].kind, Kind::File);
        assert_eq!(entries[1].kind, Kind::Dir);
        temp.close().unwrap();
    }

    #[test]
    fn write_file_is_complete_and_leaves_no_temps() {
        let temp = assert_fs::TempDir::new().unwrap();
        let fsys = LocalFsys::new(temp.path());
        fsys.make_dir("sub").unwrap();
        fsys.write_file("sub/out.txt", b"content").unwrap();
        temp.child("sub/out.txt")
            .assert(predicates::str::contains("content"));
        let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("sub"))
            .unwrap()
            .map(|de| de.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
        temp.close().unwrap();
    }

    #[test]
    fn metadata_distinguishes_kinds() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("f").write_str("xyz").unwrap();
        temp.child("d").create_dir_all().unwrap();
        let fsys = LocalFsys::new(temp.path());
        let fm = fsys.metadata("f").unwrap();
        assert_eq!(fm.kind, Kind::File);
        assert_eq!(fm.len, 3);
        assert_eq!(fsys.metadata("d").unwrap().kind, Kind::Dir);
        assert!(fsys.metadata("absent").unwrap_err().is_not_found());
        temp.close().unwrap();
    }
}
