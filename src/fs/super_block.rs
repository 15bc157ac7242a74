use serde::{Deserialize, Serialize};

use crate::{
    disk::BlockDevice,
    fs::{
        config::{
            DIR_ENTRY_SIZE, FS_MAGIC, FS_TYPE, FS_VERSION, HEADER_SIZE, MAX_BLOCK_SIZE,
            MIN_BLOCK_SIZE, TOTAL_BLOCKS,
        },
        error::{FileSystemError, Result},
    },
    utils::{current_time, generate_uuid},
};

/// 卷头，保存在卷文件最前面的 HEADER_SIZE 字节里，不占用任何数据块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub magic: u64,         // 魔数，用于识别文件系统
    pub fs_type: String,    // 文件系统标识
    pub version: u32,       // 格式版本
    pub block_size: u32,    // 每块大小（字节）
    pub total_blocks: u32,  // 总块数
    pub volume_id: String,  // 卷的唯一 ID
    pub created_at: i64,    // 格式化时间（本地时间的秒数）
}

impl SuperBlock {
    pub fn new(block_size: u32) -> Self {
        Self {
            magic: FS_MAGIC,
            fs_type: FS_TYPE.to_string(),
            version: FS_VERSION,
            block_size,
            total_blocks: TOTAL_BLOCKS,
            volume_id: generate_uuid(),
            created_at: current_time().and_utc().timestamp(),
        }
    }

    /// 块大小以 KB 给出（允许 0.5 这样的小数），换算成字节后校验
    pub fn block_size_from_kb(kb: f64) -> Result<u32> {
        let bytes = kb * 1024.0;
        if !bytes.is_finite() || bytes.fract() != 0.0 {
            return Err(FileSystemError::InvalidBlockSize(kb));
        }
        let bytes = bytes as usize;
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&bytes) || bytes % DIR_ENTRY_SIZE != 0 {
            return Err(FileSystemError::InvalidBlockSize(kb));
        }
        Ok(bytes as u32)
    }

    fn validate(&self) -> Result<()> {
        if self.magic != FS_MAGIC {
            return Err(FileSystemError::CorruptState(format!(
                "bad magic {:#x}, not a {} volume",
                self.magic, FS_TYPE
            )));
        }
        if self.total_blocks != TOTAL_BLOCKS {
            return Err(FileSystemError::CorruptState(format!(
                "volume has {} blocks, expected {}",
                self.total_blocks, TOTAL_BLOCKS
            )));
        }
        let block_size = self.block_size as usize;
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size)
            || block_size % DIR_ENTRY_SIZE != 0
        {
            return Err(FileSystemError::CorruptState(format!(
                "invalid block size {} in header",
                self.block_size
            )));
        }
        Ok(())
    }

    pub fn load(disk: &dyn BlockDevice) -> Result<Self> {
        let mut buf = vec![0u8; HEADER_SIZE as usize];
        disk.read_at(0, &mut buf)?;
        let super_block: SuperBlock = bincode::deserialize(&buf)?;
        super_block.validate()?;
        Ok(super_block)
    }

    pub fn sync(&self, disk: &dyn BlockDevice) -> Result<()> {
        let mut bytes = bincode::serialize(self)?;
        if bytes.len() > HEADER_SIZE as usize {
            return Err(FileSystemError::CorruptState(format!(
                "header needs {} bytes, only {} reserved",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        // 不够 HEADER_SIZE 用 0 填充
        bytes.resize(HEADER_SIZE as usize, 0);
        disk.write_at(0, &bytes)?;
        Ok(())
    }
}
