use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ChunkStoreError, Result};
use crate::store::{ChunkStore, ReadSeek, StagedFile};

/// Store rooted at a local directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut out = self.root.clone();
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            if seg == ".." || seg == "." {
                return Err(ChunkStoreError::Argument(format!(
                    "store path {path:?} escapes the root"
                )));
            }
            out.push(seg);
        }
        Ok(out)
    }

    fn walk(&self, start: &Path) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for e in WalkDir::new(start).follow_links(false) {
            let e = e.map_err(std::io::Error::other)?;
            if !e.file_type().is_file() {
                continue;
            }
            let rel = e
                .path()
                .strip_prefix(&self.root)
                .map_err(std::io::Error::other)?;
            let parts: Vec<_> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(parts.join("/"));
        }
        out.sort();
        Ok(out)
    }

    fn not_found_aware(path: &str, e: std::io::Error) -> ChunkStoreError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ChunkStoreError::NotFound(path.to_string())
        } else {
            e.into()
        }
    }
}

impl ChunkStore for FsStore {
    fn list_files(&self) -> Result<Vec<String>> {
        self.walk(&self.root)
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        let start = self.resolve(dir)?;
        if !start.is_dir() {
            return Ok(Vec::new());
        }
        self.walk(&start)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(self.resolve(path)?).map_err(|e| Self::not_found_aware(path, e))
    }

    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek + '_>> {
        let f = File::open(self.resolve(path)?).map_err(|e| Self::not_found_aware(path, e))?;
        Ok(Box::new(std::io::BufReader::new(f)))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let dst = self.resolve(path)?;
        let dir = dst.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dst).map_err(|e| e.error)?;
        debug!(path, bytes = data.len(), "wrote store file");
        Ok(())
    }

    fn create(&self, path: &str) -> Result<Box<dyn StagedFile + '_>> {
        let dst = self.resolve(path)?;
        let dir = dst.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        Ok(Box::new(FsStagedFile {
            tmp: BufWriter::new(tmp),
            dst,
        }))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn size(&self, path: &str) -> Result<u64> {
        let md = fs::metadata(self.resolve(path)?).map_err(|e| Self::not_found_aware(path, e))?;
        Ok(md.len())
    }

    fn modified(&self, path: &str) -> Result<SystemTime> {
        let md = fs::metadata(self.resolve(path)?).map_err(|e| Self::not_found_aware(path, e))?;
        Ok(md.modified()?)
    }

    fn delete(&self, path: &str) -> Result<()> {
        fs::remove_file(self.resolve(path)?).map_err(|e| Self::not_found_aware(path, e))
    }

    fn root_label(&self) -> String {
        self.root.display().to_string()
    }
}

/// Temp file beside the destination, renamed into place on commit.
struct FsStagedFile {
    tmp: BufWriter<NamedTempFile>,
    dst: PathBuf,
}

impl Write for FsStagedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.tmp.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.tmp.flush()
    }
}

impl StagedFile for FsStagedFile {
    fn commit(self: Box<Self>) -> Result<()> {
        let FsStagedFile { tmp, dst } = *self;
        let tmp = tmp.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dst).map_err(|e| e.error)?;
        debug!(path = %dst.display(), "committed staged file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn write_list_read_delete() {
        let td = tempfile::tempdir().unwrap();
        let s = FsStore::new(td.path());
        s.write("Chunks/07/A.chunk", b"abc").unwrap();
        s.write("b.manifest", b"xy").unwrap();
        assert_eq!(s.list_files().unwrap(), vec!["Chunks/07/A.chunk", "b.manifest"]);
        assert_eq!(s.list_dir("Chunks").unwrap(), vec!["Chunks/07/A.chunk"]);
        assert!(s.list_dir("Deltas").unwrap().is_empty());
        assert_eq!(s.read("Chunks/07/A.chunk").unwrap(), b"abc");
        assert_eq!(s.size("b.manifest").unwrap(), 2);
        let mut buf = String::new();
        s.open("b.manifest").unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "xy");
        s.delete("b.manifest").unwrap();
        assert!(!s.exists("b.manifest").unwrap());
        assert!(matches!(s.read("b.manifest"), Err(ChunkStoreError::NotFound(_))));
    }

    #[test]
    fn staged_file_lands_on_disk_only_when_committed() {
        let td = tempfile::tempdir().unwrap();
        let s = FsStore::new(td.path());
        let mut w = s.create("out/pkg.bin").unwrap();
        w.write_all(b"hello").unwrap();
        w.flush().unwrap();
        assert!(!s.exists("out/pkg.bin").unwrap());
        w.commit().unwrap();
        assert_eq!(fs::read(td.path().join("out/pkg.bin")).unwrap(), b"hello");
        assert_eq!(s.list_files().unwrap(), vec!["out/pkg.bin"]);
    }

    #[test]
    fn dropped_staged_file_leaves_nothing_behind() {
        let td = tempfile::tempdir().unwrap();
        let s = FsStore::new(td.path());
        s.write("out/pkg.bin", b"old").unwrap();
        {
            let mut w = s.create("out/pkg.bin").unwrap();
            w.write_all(b"half a package").unwrap();
            w.flush().unwrap();
        }
        assert_eq!(s.read("out/pkg.bin").unwrap(), b"old");
        assert_eq!(s.list_files().unwrap(), vec!["out/pkg.bin"]);

        drop(s.create("fresh/pkg.bin").unwrap());
        assert!(s.list_dir("fresh").unwrap().is_empty());
    }

    #[test]
    fn parent_segments_are_rejected() {
        let s = FsStore::new("/tmp/nowhere");
        assert!(matches!(s.read("../etc/passwd"), Err(ChunkStoreError::Argument(_))));
    }
}
