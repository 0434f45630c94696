//! A writable file system abstraction.
//!
//! Backends expose a named hierarchical namespace through the [`Wfs`] trait;
//! the copy engine only ever talks to `dyn Wfs`, so the same traversal drives
//! a local directory, a remote SFTP mount, or a test fake. Optional
//! capabilities (read-link, mkdir-with-mode) are probed at runtime: the
//! default trait methods report `ErrorKind::Unsupported` and the helpers in
//! this module fall back accordingly.

use async_recursion::async_recursion;
use async_trait::async_trait;
use std::io;

use crate::path;

pub(crate) const S_IFMT: u32 = 0o170000;
pub(crate) const S_IFDIR: u32 = 0o040000;
pub(crate) const S_IFLNK: u32 = 0o120000;
pub(crate) const S_IFREG: u32 = 0o100000;

/// Classification of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    /// Devices, sockets, fifos and anything else the copier does not handle.
    Other,
}

pub(crate) fn kind_from_mode(mode: u32) -> EntryKind {
    match mode & S_IFMT {
        S_IFDIR => EntryKind::Directory,
        S_IFLNK => EntryKind::Symlink,
        S_IFREG => EntryKind::Regular,
        _ => EntryKind::Other,
    }
}

/// File metadata as reported by [`Wfs::stat`] and [`Wfs::lstat`].
///
/// `mode` carries both the file type and the permission bits; `size` is only
/// meaningful for regular files.
#[derive(Clone, Copy, Debug)]
pub struct FileInfo {
    pub size: u64,
    pub mode: u32,
}

impl FileInfo {
    pub fn kind(&self) -> EntryKind {
        kind_from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    /// The permission bits alone.
    pub fn perm(&self) -> u32 {
        self.mode & 0o777
    }
}

/// A single entry from [`Wfs::read_dir`]. The kind is authoritative; the
/// mode is fetched on demand with [`Wfs::lstat`].
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// A file opened for sequential reading. Dropping the handle releases it.
#[async_trait]
pub trait ReadableFile: Send {
    /// Reads up to `max_len` bytes. An empty result means end of file.
    async fn read_chunk(&mut self, max_len: usize) -> io::Result<Vec<u8>>;

    /// Metadata of the open file.
    async fn stat(&mut self) -> io::Result<FileInfo>;
}

/// A file opened for writing. [`close`](WritableFile::close) must be called
/// to observe deferred write errors.
#[async_trait]
pub trait WritableFile: Send {
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;
}

/// A writable hierarchical file system.
///
/// All paths are slash-separated strings relative to the backend's
/// namespace. Every method wraps the underlying error with the operation
/// name and the decorated path so failures are self-describing.
#[async_trait]
pub trait Wfs: Send + Sync {
    /// Opens the named file for reading.
    async fn open(&self, name: &str) -> io::Result<Box<dyn ReadableFile>>;

    /// Non-recursive listing, excluding `.` and `..`. Order is unspecified.
    async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>>;

    /// Metadata for the named file, following symlinks.
    async fn stat(&self, name: &str) -> io::Result<FileInfo>;

    /// Metadata without following symlinks. Backends without link semantics
    /// inherit the default, which is identical to [`stat`](Wfs::stat).
    async fn lstat(&self, name: &str) -> io::Result<FileInfo> {
        self.stat(name).await
    }

    /// The raw target of a symlink. Backends without link semantics inherit
    /// the default, which fails with an invalid-operation error.
    async fn read_link(&self, name: &str) -> io::Result<String> {
        Err(invalid_operation("readlink", &self.display_path(name)))
    }

    /// Creates (or truncates) a regular file with the given permission bits.
    /// An existing file is overwritten, subject to permission.
    async fn create(&self, name: &str, mode: u32) -> io::Result<Box<dyn WritableFile>>;

    /// Creates a directory with backend-default permissions.
    async fn mkdir(&self, name: &str) -> io::Result<()>;

    /// Creates a directory with the given mode. Optional capability; the
    /// default fails with an invalid-operation error and
    /// [`mkdir_with_mode`] emulates it as mkdir followed by chmod.
    async fn mkdir_mode(&self, name: &str, _mode: u32) -> io::Result<()> {
        Err(invalid_operation("mkdir", &self.display_path(name)))
    }

    /// Creates a symlink at `linkpath` pointing at the literal string
    /// `target`. The target is not validated.
    async fn symlink(&self, target: &str, linkpath: &str) -> io::Result<()>;

    async fn chmod(&self, name: &str, mode: u32) -> io::Result<()>;

    /// Removes a single entry. Fails for non-empty directories.
    async fn remove(&self, name: &str) -> io::Result<()>;

    /// How paths of this backend should be rendered in messages.
    fn display_path(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Wraps a backend error with the operation name and the decorated path.
pub(crate) fn wrap_err(op: &str, path: &str, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), format!("{} {:?}: {}", op, path, err))
}

pub(crate) fn invalid_operation(op: &str, path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} {:?}: invalid operation", op, path),
    )
}

/// Creates a directory with the given permission bits, using the backend's
/// native mkdir-with-mode when available and mkdir followed by chmod
/// otherwise.
pub async fn mkdir_with_mode(fs: &dyn Wfs, name: &str, mode: u32) -> io::Result<()> {
    match fs.mkdir_mode(name, mode).await {
        Err(err) if err.kind() == io::ErrorKind::Unsupported => {
            fs.mkdir(name).await?;
            fs.chmod(name, mode).await
        }
        res => res,
    }
}

/// Removes `name` and any children it contains. Everything removable is
/// removed even after a failure; the first error encountered is returned.
/// A missing path is not an error.
pub async fn remove_all(fs: &dyn Wfs, name: &str) -> io::Result<()> {
    // Simple case: a plain remove finishes the job.
    let remove_err = match fs.remove(name).await {
        Ok(()) => return Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => err,
    };
    let info = match fs.lstat(name).await {
        Ok(info) => info,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if info.kind() != EntryKind::Directory {
        return Err(remove_err);
    }
    remove_dir(fs, name).await
}

async fn remove_entry(fs: &dyn Wfs, name: &str, kind: EntryKind) -> io::Result<()> {
    let err = match fs.remove(name).await {
        Ok(()) => return Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => err,
    };
    if kind != EntryKind::Directory {
        return Err(err);
    }
    remove_dir(fs, name).await
}

#[async_recursion]
async fn remove_dir(fs: &dyn Wfs, dir: &str) -> io::Result<()> {
    let (entries, read_err) = match fs.read_dir(dir).await {
        Ok(entries) => (entries, None),
        Err(err) => (Vec::new(), Some(err)),
    };
    let mut first_err: Option<io::Error> = None;
    for entry in entries {
        let child = path::join(dir, &entry.name);
        if let Err(err) = remove_entry(fs, &child, entry.kind).await {
            first_err.get_or_insert(err);
        }
    }
    if first_err.is_none() {
        first_err = read_err;
    }
    match fs.remove(dir).await {
        Ok(()) => {}
        Err(err)
            if err.kind() == io::ErrorKind::NotFound
                && matches!(&first_err, Some(e) if e.kind() == io::ErrorKind::NotFound) => {}
        Err(err) => {
            first_err.get_or_insert(err);
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalFs;
    use std::os::unix::fs::PermissionsExt;
    use test_log::test;

    fn path_str(path: &std::path::Path) -> String {
        path.to_str().unwrap().to_string()
    }

    #[test(tokio::test)]
    async fn remove_all_missing_path_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = LocalFs::new();
        remove_all(&fs, &path_str(&tmp.path().join("nope")))
            .await
            .unwrap();
    }

    #[test(tokio::test)]
    async fn remove_all_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        let fs = LocalFs::new();
        remove_all(&fs, &path_str(&file)).await.unwrap();
        assert!(!file.exists());
    }

    #[test(tokio::test)]
    async fn remove_all_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub").join("b.txt"), "b").unwrap();
        std::os::unix::fs::symlink("a.txt", root.join("link")).unwrap();
        let fs = LocalFs::new();
        remove_all(&fs, &path_str(&root)).await.unwrap();
        assert!(!root.exists());
    }

    #[test(tokio::test)]
    async fn remove_all_keeps_going_after_first_error() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        let locked = root.join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("stuck.txt"), "x").unwrap();
        // Children of a read-only directory cannot be unlinked.
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();
        std::fs::write(root.join("z.txt"), "z").unwrap();

        let fs = LocalFs::new();
        let err = remove_all(&fs, &path_str(&root)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied, "{err}");
        // The siblings were still removed.
        assert!(!root.join("a.txt").exists());
        assert!(!root.join("z.txt").exists());
        assert!(locked.join("stuck.txt").exists());

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        remove_all(&fs, &path_str(&root)).await.unwrap();
        assert!(!root.exists());
    }

    /// A local file system that hides its optional capabilities, to exercise
    /// the trait defaults and the mkdir fallback.
    struct PlainFs(LocalFs);

    #[async_trait]
    impl Wfs for PlainFs {
        async fn open(&self, name: &str) -> io::Result<Box<dyn ReadableFile>> {
            self.0.open(name).await
        }
        async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
            self.0.read_dir(name).await
        }
        async fn stat(&self, name: &str) -> io::Result<FileInfo> {
            self.0.stat(name).await
        }
        async fn create(&self, name: &str, mode: u32) -> io::Result<Box<dyn WritableFile>> {
            self.0.create(name, mode).await
        }
        async fn mkdir(&self, name: &str) -> io::Result<()> {
            self.0.mkdir(name).await
        }
        async fn symlink(&self, target: &str, linkpath: &str) -> io::Result<()> {
            self.0.symlink(target, linkpath).await
        }
        async fn chmod(&self, name: &str, mode: u32) -> io::Result<()> {
            self.0.chmod(name, mode).await
        }
        async fn remove(&self, name: &str) -> io::Result<()> {
            self.0.remove(name).await
        }
    }

    #[test(tokio::test)]
    async fn mkdir_with_mode_falls_back_to_chmod() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("made");
        let fs = PlainFs(LocalFs::new());
        mkdir_with_mode(&fs, &path_str(&dir), 0o755).await.unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test(tokio::test)]
    async fn mkdir_with_mode_uses_native_support() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("made");
        let fs = LocalFs::new();
        mkdir_with_mode(&fs, &path_str(&dir), 0o710).await.unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o710);
    }

    #[test(tokio::test)]
    async fn read_link_default_is_invalid_operation() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("t");
        std::fs::write(&target, "x").unwrap();
        let link = tmp.path().join("l");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let fs = PlainFs(LocalFs::new());
        let err = fs.read_link(&path_str(&link)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test(tokio::test)]
    async fn lstat_default_follows_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("t");
        std::fs::write(&target, "xyz").unwrap();
        let link = tmp.path().join("l");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let fs = PlainFs(LocalFs::new());
        let info = fs.lstat(&path_str(&link)).await.unwrap();
        assert_eq!(info.kind(), EntryKind::Regular);
        assert_eq!(info.size, 3);
    }
}
