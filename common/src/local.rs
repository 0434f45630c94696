//! Local file system backend: a thin adapter of OS calls onto [`Wfs`].

use async_trait::async_trait;
use std::io;
use std::os::unix::fs::PermissionsExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::wfs::{wrap_err, DirEntry, EntryKind, FileInfo, ReadableFile, Wfs, WritableFile};

#[derive(Debug, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        LocalFs
    }
}

fn file_info(metadata: &std::fs::Metadata) -> FileInfo {
    FileInfo {
        size: metadata.len(),
        mode: metadata.permissions().mode(),
    }
}

struct LocalReadableFile {
    file: tokio::fs::File,
    name: String,
}

#[async_trait]
impl ReadableFile for LocalReadableFile {
    async fn read_chunk(&mut self, max_len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; max_len];
        let n = self
            .file
            .read(&mut buf)
            .await
            .map_err(|err| wrap_err("read", &self.name, err))?;
        buf.truncate(n);
        Ok(buf)
    }

    async fn stat(&mut self) -> io::Result<FileInfo> {
        let metadata = self
            .file
            .metadata()
            .await
            .map_err(|err| wrap_err("stat", &self.name, err))?;
        Ok(file_info(&metadata))
    }
}

struct LocalWritableFile {
    file: tokio::fs::File,
    name: String,
}

#[async_trait]
impl WritableFile for LocalWritableFile {
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> io::Result<()> {
        self.file
            .write_all(&chunk)
            .await
            .map_err(|err| wrap_err("write", &self.name, err))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.file
            .flush()
            .await
            .map_err(|err| wrap_err("close", &self.name, err))
    }
}

#[async_trait]
impl Wfs for LocalFs {
    async fn open(&self, name: &str) -> io::Result<Box<dyn ReadableFile>> {
        let file = tokio::fs::File::open(name)
            .await
            .map_err(|err| wrap_err("open", name, err))?;
        Ok(Box::new(LocalReadableFile {
            file,
            name: name.to_string(),
        }))
    }

    async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
        let mut read_dir = tokio::fs::read_dir(name)
            .await
            .map_err(|err| wrap_err("readdir", name, err))?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|err| wrap_err("readdir", name, err))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| wrap_err("readdir", name, err))?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_file() {
                EntryKind::Regular
            } else {
                EntryKind::Other
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(entries)
    }

    async fn stat(&self, name: &str) -> io::Result<FileInfo> {
        let metadata = tokio::fs::metadata(name)
            .await
            .map_err(|err| wrap_err("stat", name, err))?;
        Ok(file_info(&metadata))
    }

    async fn lstat(&self, name: &str) -> io::Result<FileInfo> {
        let metadata = tokio::fs::symlink_metadata(name)
            .await
            .map_err(|err| wrap_err("lstat", name, err))?;
        Ok(file_info(&metadata))
    }

    async fn read_link(&self, name: &str) -> io::Result<String> {
        let target = tokio::fs::read_link(name)
            .await
            .map_err(|err| wrap_err("readlink", name, err))?;
        Ok(target.to_string_lossy().into_owned())
    }

    async fn create(&self, name: &str, mode: u32) -> io::Result<Box<dyn WritableFile>> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(name)
            .await
            .map_err(|err| wrap_err("open", name, err))?;
        Ok(Box::new(LocalWritableFile {
            file,
            name: name.to_string(),
        }))
    }

    async fn mkdir(&self, name: &str) -> io::Result<()> {
        self.mkdir_mode(name, 0o700).await
    }

    async fn mkdir_mode(&self, name: &str, mode: u32) -> io::Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.mode(mode);
        builder
            .create(name)
            .await
            .map_err(|err| wrap_err("mkdir", name, err))
    }

    async fn symlink(&self, target: &str, linkpath: &str) -> io::Result<()> {
        tokio::fs::symlink(target, linkpath)
            .await
            .map_err(|err| wrap_err("symlink", linkpath, err))
    }

    async fn chmod(&self, name: &str, mode: u32) -> io::Result<()> {
        tokio::fs::set_permissions(name, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|err| wrap_err("chmod", name, err))
    }

    async fn remove(&self, name: &str) -> io::Result<()> {
        let metadata = tokio::fs::symlink_metadata(name)
            .await
            .map_err(|err| wrap_err("remove", name, err))?;
        let res = if metadata.is_dir() {
            tokio::fs::remove_dir(name).await
        } else {
            tokio::fs::remove_file(name).await
        };
        res.map_err(|err| wrap_err("remove", name, err))
    }
}
