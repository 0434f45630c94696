//! The concurrent copy engine.
//!
//! [`copy`] walks each source tree depth-first and recreates it under the
//! destination root. Directory and symlink creation happen inline on the
//! traversal task; regular-file copies are handed to a bounded pool of
//! workers so at most [`MAX_CONCURRENCY`] byte streams are in flight. A
//! size pre-scan runs concurrently and reports the total work units through
//! the [`Progress`] contract.

use anyhow::anyhow;
use async_recursion::async_recursion;
use std::io;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::path;
use crate::progress::Progress;
use crate::wfs::{self, DirEntry, EntryKind, FileInfo, ReadableFile, Wfs, WritableFile};

/// Upper bound on simultaneous regular-file copies.
const MAX_CONCURRENCY: u32 = 10;
const CHUNK_SIZE: usize = 1024 * 1024;

/// A path paired with the backend it lives on, so a path can never be
/// handed to the wrong backend by accident.
#[derive(Clone)]
pub struct FsPath {
    pub fs: Arc<dyn Wfs>,
    pub path: String,
}

impl FsPath {
    pub fn new(fs: Arc<dyn Wfs>, path: impl Into<String>) -> FsPath {
        FsPath {
            fs,
            path: path.into(),
        }
    }

    fn with_path(&self, path: String) -> FsPath {
        FsPath {
            fs: self.fs.clone(),
            path,
        }
    }

    fn child(&self, name: &str) -> FsPath {
        self.with_path(path::join(&self.path, name))
    }

    async fn open(&self) -> io::Result<Box<dyn ReadableFile>> {
        self.fs.open(&self.path).await
    }

    async fn create(&self, mode: u32) -> io::Result<Box<dyn WritableFile>> {
        self.fs.create(&self.path, mode).await
    }

    async fn read_dir(&self) -> io::Result<Vec<DirEntry>> {
        self.fs.read_dir(&self.path).await
    }

    async fn stat(&self) -> io::Result<FileInfo> {
        self.fs.stat(&self.path).await
    }

    async fn lstat(&self) -> io::Result<FileInfo> {
        self.fs.lstat(&self.path).await
    }

    async fn read_link(&self) -> io::Result<String> {
        self.fs.read_link(&self.path).await
    }

    async fn symlink_from(&self, target: &str) -> io::Result<()> {
        self.fs.symlink(target, &self.path).await
    }

    async fn mkdir(&self) -> io::Result<()> {
        self.fs.mkdir(&self.path).await
    }

    async fn mkdir_with_mode(&self, mode: u32) -> io::Result<()> {
        wfs::mkdir_with_mode(self.fs.as_ref(), &self.path, mode).await
    }

    async fn chmod(&self, mode: u32) -> io::Result<()> {
        self.fs.chmod(&self.path, mode).await
    }

    async fn remove_all(&self) -> io::Result<()> {
        wfs::remove_all(self.fs.as_ref(), &self.path).await
    }

    async fn exists(&self) -> bool {
        !matches!(
            self.fs.lstat(&self.path).await,
            Err(err) if err.kind() == io::ErrorKind::NotFound
        )
    }
}

impl PartialEq for FsPath {
    /// Two paths are the same file when they name the same path on the same
    /// backend instance.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs) && self.path == other.path
    }
}

impl std::fmt::Display for FsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fs.display_path(&self.path))
    }
}

impl std::fmt::Debug for FsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.fs.display_path(&self.path))
    }
}

struct DeferredChmod {
    dst: FsPath,
    mode: u32,
}

#[derive(Clone)]
struct Copier {
    progress: Arc<dyn Progress>,
    force: bool,
}

impl Copier {
    /// Runs a destination-creating operation. When it fails and `force` is
    /// set and the destination exists, the destination is removed and the
    /// operation retried exactly once.
    async fn open_with_retry<T, Fut>(&self, dst: &FsPath, op: impl Fn() -> Fut) -> io::Result<T>
    where
        Fut: std::future::Future<Output = io::Result<T>>,
    {
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(err) => err,
        };
        if !self.force || !dst.exists().await {
            return Err(err);
        }
        dst.remove_all().await?;
        op().await
    }

    async fn copy_regular_file(&self, src: &FsPath, dst: &FsPath) -> anyhow::Result<()> {
        self.progress.file_start(&src.to_string(), &dst.to_string());
        let mut reader = src.open().await?;
        let info = reader.stat().await?;
        let mut writer = self
            .open_with_retry(dst, || dst.create(info.perm()))
            .await?;
        loop {
            let chunk = reader.read_chunk(CHUNK_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            let n = chunk.len() as u64;
            writer.write_chunk(chunk).await?;
            self.progress.progress(n);
        }
        writer.close().await?;
        self.progress.progress(1);
        self.progress.file_done(&src.to_string(), None);
        Ok(())
    }

    async fn copy_symlink(&self, src: &FsPath, dst: &FsPath) -> anyhow::Result<()> {
        let target = src.read_link().await?;
        self.open_with_retry(dst, || dst.symlink_from(&target))
            .await?;
        self.progress.progress(1);
        Ok(())
    }
}

#[async_recursion]
async fn copy_tree(
    copier: &Copier,
    sem: &Arc<Semaphore>,
    deferred: &mut Vec<DeferredChmod>,
    src: FsPath,
    dst: FsPath,
    kind: EntryKind,
) {
    tracing::debug!("copy: {} -> {}", src, dst);
    match kind {
        EntryKind::Regular => {
            let permit = sem.clone().acquire_owned().await.unwrap();
            let copier = copier.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = copier.copy_regular_file(&src, &dst).await {
                    copier.progress.file_done(&src.to_string(), Some(err));
                }
            });
        }
        EntryKind::Directory => {
            let info = match src.stat().await {
                Ok(info) => info,
                Err(err) => {
                    copier.progress.file_done(&src.to_string(), Some(err.into()));
                    return;
                }
            };
            let has_write_perm = info.mode & 0o300 == 0o300;
            let res = copier
                .open_with_retry(&dst, || async {
                    if has_write_perm {
                        dst.mkdir_with_mode(info.perm()).await
                    } else {
                        // A directory created with a read-only mode could
                        // not be populated, so create it with default
                        // permissions now and restore the mode after the
                        // traversal.
                        dst.mkdir().await
                    }
                })
                .await;
            if let Err(err) = res {
                copier.progress.file_done(&src.to_string(), Some(err.into()));
                return;
            }
            if has_write_perm {
                copier.progress.progress(1);
            } else {
                deferred.push(DeferredChmod {
                    dst: dst.clone(),
                    mode: info.perm(),
                });
            }
            let mut entries = match src.read_dir().await {
                Ok(entries) => entries,
                Err(err) => {
                    copier.progress.file_done(&src.to_string(), Some(err.into()));
                    return;
                }
            };
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in entries {
                copy_tree(
                    copier,
                    sem,
                    deferred,
                    src.child(&entry.name),
                    dst.child(&entry.name),
                    entry.kind,
                )
                .await;
            }
        }
        EntryKind::Symlink => {
            if let Err(err) = copier.copy_symlink(&src, &dst).await {
                copier.progress.file_done(&src.to_string(), Some(err));
            }
        }
        EntryKind::Other => {
            copier
                .progress
                .file_done(&src.to_string(), Some(anyhow!("{}: unknown file type", src)));
        }
    }
}

/// Work units for the pre-scan: one per directory or symlink, size plus one
/// per regular file so even empty files visibly complete.
async fn total_work(srcs: &[FsPath]) -> u64 {
    let mut total = 0;
    for src in srcs {
        let Ok(info) = src.stat().await else {
            continue;
        };
        total += entry_work(src, info.kind(), info.size).await;
    }
    total
}

#[async_recursion]
async fn entry_work(path: &FsPath, kind: EntryKind, size: u64) -> u64 {
    match kind {
        EntryKind::Regular => size + 1,
        EntryKind::Symlink => 1,
        EntryKind::Directory => {
            let mut total = 1;
            let Ok(entries) = path.read_dir().await else {
                return total;
            };
            for entry in entries {
                let child = path.child(&entry.name);
                let size = match entry.kind {
                    EntryKind::Regular => match child.lstat().await {
                        Ok(info) => info.size,
                        Err(_) => continue,
                    },
                    _ => 0,
                };
                total += entry_work(&child, entry.kind, size).await;
            }
            total
        }
        EntryKind::Other => 0,
    }
}

/// Copies every source in `srcs` to `dst_root`, reporting progress and
/// per-entry errors through `progress`. With `force` set, a destination
/// entry that cannot be opened is removed and retried once.
///
/// When `dst_root` is an existing directory (or there are multiple
/// sources), each source is copied to `dst_root/<basename>`; otherwise
/// `dst_root` names the destination itself.
pub async fn copy(progress: Arc<dyn Progress>, srcs: &[FsPath], dst_root: &FsPath, force: bool) {
    let scan = {
        let progress = progress.clone();
        let srcs = srcs.to_vec();
        tokio::spawn(async move { progress.max(total_work(&srcs).await) })
    };

    let dst_root = dst_root.with_path(path::clean(&dst_root.path));
    let dst_is_dir = if srcs.len() == 1 {
        matches!(dst_root.stat().await, Ok(info) if info.is_dir())
    } else {
        true
    };

    let copier = Copier {
        progress: progress.clone(),
        force,
    };
    let sem = Arc::new(Semaphore::new(MAX_CONCURRENCY as usize));
    let mut deferred: Vec<DeferredChmod> = Vec::new();

    for src_root in srcs {
        let dst_root = if dst_is_dir {
            // The destination is a directory: copy into it. The basename is
            // taken from the source path as given, before normalization.
            dst_root.child(path::base(&src_root.path))
        } else {
            dst_root.clone()
        };
        let src_root = src_root.with_path(path::clean(&src_root.path));
        if src_root == dst_root {
            progress.file_done(
                &src_root.to_string(),
                Some(anyhow!(
                    "{:?} and {:?} are the same file",
                    src_root.to_string(),
                    dst_root.to_string()
                )),
            );
            continue;
        }
        let kind = match src_root.stat().await {
            Ok(info) => info.kind(),
            Err(err) => {
                progress.file_done(&src_root.to_string(), Some(err.into()));
                continue;
            }
        };
        copy_tree(&copier, &sem, &mut deferred, src_root, dst_root, kind).await;
    }

    // Wait for every outstanding file worker.
    let barrier = sem.acquire_many(MAX_CONCURRENCY).await.unwrap();
    drop(barrier);

    // Reverse order: directory contents are restored before the parent
    // itself becomes read-only.
    for d in deferred.iter().rev() {
        match d.dst.chmod(d.mode).await {
            Ok(()) => progress.progress(1),
            Err(err) => progress.file_done(&d.dst.to_string(), Some(err.into())),
        }
    }

    let _ = scan.await;
}
