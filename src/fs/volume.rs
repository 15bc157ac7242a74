use std::path::Path;

use log::debug;

use crate::{
    disk::{BlockDevice, FileDisk},
    fs::{
        allocation_table::{BlockAllocationTable, BlockId},
        config::{DIR_ENTRY_SIZE, FAT_ENTRY_SIZE, HEADER_SIZE, TOTAL_BLOCKS},
        directory::{DirectoryEntry, EntryList},
        error::{FileSystemError, Result},
        super_block::SuperBlock,
    },
};

/// 卷文件布局：
///
/// ```text
/// | header (HEADER_SIZE) | block 0 .. block N-1 | FAT (N * 4) | count (u32) | entries (count * 32) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLayout {
    pub block_size: u32,
    pub total_blocks: u32,
}

impl VolumeLayout {
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            total_blocks: TOTAL_BLOCKS,
        }
    }

    pub fn block_offset(&self, block: BlockId) -> u64 {
        HEADER_SIZE + block as u64 * self.block_size as u64
    }

    pub fn table_offset(&self) -> u64 {
        self.block_offset(self.total_blocks)
    }

    pub fn entries_offset(&self) -> u64 {
        self.table_offset() + (self.total_blocks as usize * FAT_ENTRY_SIZE) as u64
    }

    /// 只有根目录时整个卷文件的长度
    pub fn initial_len(&self) -> u64 {
        self.entries_offset() + 4 + DIR_ENTRY_SIZE as u64
    }

    pub fn slots_per_block(&self) -> usize {
        self.block_size as usize / DIR_ENTRY_SIZE
    }
}

/// 卷文件：按块号读写原始数据，并负责元数据（卷头、分配表、目录项表）的落盘。
#[derive(Debug)]
pub struct VolumeStore {
    disk: FileDisk,
    layout: VolumeLayout,
}

impl VolumeStore {
    /// 新建一个全 0 的卷文件
    pub fn create(path: impl AsRef<Path>, block_size: u32) -> Result<Self> {
        let layout = VolumeLayout::new(block_size);
        let disk = FileDisk::create(path, layout.initial_len())?;
        Ok(Self { disk, layout })
    }

    /// 打开已有卷文件，读出并校验卷头
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, SuperBlock)> {
        let disk = FileDisk::open(path)?;
        let super_block = SuperBlock::load(&disk)?;
        let layout = VolumeLayout::new(super_block.block_size);

        let len = disk.len()?;
        if len < layout.entries_offset() + 4 {
            return Err(FileSystemError::CorruptState(format!(
                "volume is {} bytes, expected at least {}",
                len,
                layout.entries_offset() + 4
            )));
        }

        Ok((Self { disk, layout }, super_block))
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    pub fn block_size(&self) -> usize {
        self.layout.block_size as usize
    }

    pub fn path(&self) -> &Path {
        self.disk.path()
    }

    fn check_block(&self, block: BlockId) -> Result<()> {
        if block >= self.layout.total_blocks {
            return Err(FileSystemError::CorruptState(format!(
                "block {} is outside the volume",
                block
            )));
        }
        Ok(())
    }

    pub fn read_block(&self, block: BlockId) -> Result<Vec<u8>> {
        self.check_block(block)?;
        let mut buf = vec![0u8; self.block_size()];
        self.disk.read_at(self.layout.block_offset(block), &mut buf)?;
        Ok(buf)
    }

    /// 写入一个块，`data` 不足一块时剩余部分补 0
    pub fn write_block(&self, block: BlockId, data: &[u8]) -> Result<()> {
        self.check_block(block)?;
        if data.len() > self.block_size() {
            return Err(FileSystemError::InvalidArgument(format!(
                "{} bytes do not fit in a {} byte block",
                data.len(),
                self.block_size()
            )));
        }
        let mut buf = vec![0u8; self.block_size()];
        buf[..data.len()].copy_from_slice(data);
        self.disk.write_at(self.layout.block_offset(block), &buf)?;
        debug!("wrote {} bytes to block {}", data.len(), block);
        Ok(())
    }

    pub fn zero_block(&self, block: BlockId) -> Result<()> {
        self.write_block(block, &[])
    }

    /// 读出目录块中所有非空槽位：(槽位号, 目录项)
    pub fn read_records(&self, block: BlockId) -> Result<Vec<(usize, DirectoryEntry)>> {
        let data = self.read_block(block)?;
        data.chunks_exact(DIR_ENTRY_SIZE)
            .enumerate()
            .filter(|(_, slot)| !DirectoryEntry::is_free_slot(slot))
            .map(|(slot, bytes)| DirectoryEntry::from_bytes(bytes).map(|entry| (slot, entry)))
            .collect()
    }

    /// 写到目录块的第一个空槽，返回槽位号；没有空槽时返回 None
    pub fn append_record(&self, block: BlockId, entry: &DirectoryEntry) -> Result<Option<usize>> {
        let data = self.read_block(block)?;
        let free = data
            .chunks_exact(DIR_ENTRY_SIZE)
            .position(DirectoryEntry::is_free_slot);

        if let Some(slot) = free {
            self.write_record(block, slot, entry)?;
        }
        Ok(free)
    }

    pub fn clear_record(&self, block: BlockId, slot: usize) -> Result<()> {
        self.write_slot(block, slot, &[0u8; DIR_ENTRY_SIZE])
    }

    /// 覆盖目录块中指定槽位的记录
    pub fn write_record(&self, block: BlockId, slot: usize, entry: &DirectoryEntry) -> Result<()> {
        self.write_slot(block, slot, &entry.to_bytes()?)
    }

    fn write_slot(&self, block: BlockId, slot: usize, bytes: &[u8; DIR_ENTRY_SIZE]) -> Result<()> {
        self.check_block(block)?;
        let offset = self.layout.block_offset(block) + (slot * DIR_ENTRY_SIZE) as u64;
        self.disk.write_at(offset, bytes)?;
        Ok(())
    }

    /// 卷头、分配表、目录项表依次写回，直接覆盖旧内容
    pub fn save(
        &self,
        super_block: &SuperBlock,
        table: &BlockAllocationTable,
        entries: &EntryList,
    ) -> Result<()> {
        super_block.sync(&self.disk)?;
        table.sync(&self.disk, self.layout.table_offset())?;
        entries.sync(&self.disk, self.layout.entries_offset())?;
        debug!(
            "saved volume {}: {} busy blocks, {} entries",
            self.path().display(),
            table.busy_count(),
            entries.len()
        );
        Ok(())
    }

    pub fn load_table(&self) -> Result<BlockAllocationTable> {
        BlockAllocationTable::load(
            &self.disk,
            self.layout.table_offset(),
            self.layout.total_blocks,
        )
    }

    pub fn load_entries(&self) -> Result<EntryList> {
        EntryList::load(&self.disk, self.layout.entries_offset())
    }
}
