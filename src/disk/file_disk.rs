use std::{
    fs::{File, OpenOptions},
    io::{Error, ErrorKind, Read, Result, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use log::debug;

use crate::disk::block_device::BlockDevice;

/// 以宿主机上的单个文件作为虚拟磁盘。
///
/// 文件句柄在整个挂载期间只打开一次，每次读写只在一次 seek + read/write 的范围内持锁。
#[derive(Debug)]
pub struct FileDisk {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileDisk {
    /// 创建（或截断）磁盘文件，并预分配 `len` 字节，内容全为 0。
    pub fn create(path: impl AsRef<Path>, len: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len)?;
        debug!("created disk image {} ({} bytes)", path.display(), len);

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// 打开已存在的磁盘文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "disk image lock poisoned"))
    }
}

impl BlockDevice for FileDisk {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.lock()?.metadata()?.len())
    }
}
