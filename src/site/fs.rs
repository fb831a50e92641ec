//! Read-only file systems a site can be served from.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use tokio::io::AsyncReadExt;

use crate::http::body::ByteStream;

const READ_CHUNK: usize = 64 * 1024;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Storage behind a [`SiteBinding`](crate::site::SiteBinding).
///
/// Paths are produced by [`normalize`](ReadOnlyFileSystem::normalize) and are
/// opaque to the caller.
pub trait ReadOnlyFileSystem: Send + Sync {
    /// Resolve `relative` (`/`-separated, already free of `..`) under `root`.
    fn normalize(&self, root: &str, relative: &str) -> String;

    fn file_exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, bool>;

    fn directory_exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, bool>;

    fn open_read_stream<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<ByteStream>>;

    /// Entries of a directory, sorted by name.
    fn list_directory<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<Vec<DirEntry>>>;
}

/// The local disk, through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl ReadOnlyFileSystem for LocalFileSystem {
    fn normalize(&self, root: &str, relative: &str) -> String {
        let mut path = PathBuf::from(root);
        path.extend(relative.split('/').filter(|segment| !segment.is_empty()));
        path.to_string_lossy().into_owned()
    }

    fn file_exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, bool> {
        async move {
            tokio::fs::metadata(path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false)
        }
        .boxed()
    }

    fn directory_exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, bool> {
        async move {
            tokio::fs::metadata(path)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false)
        }
        .boxed()
    }

    fn open_read_stream<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<ByteStream>> {
        async move {
            let file = tokio::fs::File::open(Path::new(path)).await?;
            let chunks = stream::try_unfold(file, |mut file| async move {
                let mut buf = BytesMut::with_capacity(READ_CHUNK);
                let read = file.read_buf(&mut buf).await?;
                io::Result::Ok((read > 0).then(|| (buf.freeze(), file)))
            });
            Ok(chunks.boxed())
        }
        .boxed()
    }

    fn list_directory<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<Vec<DirEntry>>> {
        async move {
            let mut reader = tokio::fs::read_dir(path).await?;
            let mut entries = Vec::new();
            while let Some(entry) = reader.next_entry().await? {
                entries.push(DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    is_dir: entry.file_type().await?.is_dir(),
                });
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        }
        .boxed()
    }
}

/// Documents held in memory, keyed by `/`-separated path.
///
/// Directories exist implicitly through the files below them.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: BTreeMap<String, Bytes>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Bytes>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<Bytes>) {
        self.files.insert(join(&[path]), contents.into());
    }

    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a str, bool)> + 'a {
        self.files.keys().filter_map(move |key| {
            let rest = if dir.is_empty() {
                key.as_str()
            } else {
                key.strip_prefix(dir)?.strip_prefix('/')?
            };
            Some(match rest.split_once('/') {
                Some((name, _)) => (name, true),
                None => (rest, false),
            })
        })
    }
}

impl ReadOnlyFileSystem for MemoryFileSystem {
    fn normalize(&self, root: &str, relative: &str) -> String {
        join(&[root, relative])
    }

    fn file_exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, bool> {
        futures_util::future::ready(self.files.contains_key(path)).boxed()
    }

    fn directory_exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, bool> {
        let exists = !self.files.contains_key(path) && self.children(path).next().is_some();
        futures_util::future::ready(exists).boxed()
    }

    fn open_read_stream<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<ByteStream>> {
        let result = match self.files.get(path) {
            Some(contents) => Ok(stream::iter([Ok(contents.clone())]).boxed()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, path.to_owned())),
        };
        futures_util::future::ready(result).boxed()
    }

    fn list_directory<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<Vec<DirEntry>>> {
        let mut entries: Vec<DirEntry> = self
            .children(path)
            .map(|(name, is_dir)| DirEntry {
                name: name.to_owned(),
                is_dir,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|a, b| a.name == b.name);
        futures_util::future::ready(Ok(entries)).boxed()
    }
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    async fn read_all(fs: &dyn ReadOnlyFileSystem, path: &str) -> Vec<u8> {
        let chunks: Vec<Bytes> = fs.open_read_stream(path).await.unwrap().try_collect().await.unwrap();
        chunks.concat()
    }

    fn memory() -> MemoryFileSystem {
        MemoryFileSystem::new()
            .with_file("/site/index.html", "<h1>home</h1>")
            .with_file("site/docs/a.txt", "a")
            .with_file("site/docs/b.txt", "b")
    }

    #[tokio::test]
    async fn memory_files_and_directories() {
        let fs = memory();
        let root = fs.normalize("/site/", "");
        assert_eq!(root, "site");

        assert!(fs.file_exists(&fs.normalize("site", "index.html")).await);
        assert!(fs.directory_exists(&fs.normalize("site", "docs/")).await);
        assert!(!fs.directory_exists(&fs.normalize("site", "index.html")).await);
        assert!(!fs.file_exists(&fs.normalize("site", "missing.txt")).await);
        assert_eq!(read_all(&fs, "site/docs/a.txt").await, b"a");
    }

    #[tokio::test]
    async fn memory_listing_is_sorted_and_deduplicated() {
        let fs = memory();
        let entries = fs.list_directory("site").await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "docs".into(), is_dir: true },
                DirEntry { name: "index.html".into(), is_dir: false },
            ]
        );
    }

    #[tokio::test]
    async fn local_file_system_streams_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let big = vec![7u8; READ_CHUNK * 2 + 10];
        std::fs::write(dir.path().join("big.bin"), &big).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let fs = LocalFileSystem;
        let root = dir.path().to_string_lossy().into_owned();
        let file = fs.normalize(&root, "big.bin");

        assert!(fs.file_exists(&file).await);
        assert!(fs.directory_exists(&fs.normalize(&root, "sub/")).await);
        assert_eq!(read_all(&fs, &file).await, big);

        let names: Vec<_> = fs
            .list_directory(&root)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| (entry.name, entry.is_dir))
            .collect();
        assert_eq!(names, vec![("big.bin".to_owned(), false), ("sub".to_owned(), true)]);
    }
}
