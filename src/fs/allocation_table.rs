use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    disk::BlockDevice,
    fs::{
        config::{FAT_END_OF_CHAIN, FAT_ENTRY_SIZE},
        error::{FileSystemError, Result},
    },
};

/// 块号，取值范围 `[0, total_blocks)`
pub type BlockId = u32;

/// 分配表中的一项：是否被占用 + 链上的下一块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FatEntry {
    pub busy: bool,
    pub next: Option<BlockId>, // None = 链尾或未使用
}

// 落盘格式，bincode 定长编码后正好 FAT_ENTRY_SIZE 字节
#[derive(Serialize, Deserialize)]
struct RawFatEntry {
    busy: u8,
    reserved: u8,
    next: u16,
}

/// 块分配表（FAT）。
///
/// 负责所有块的生命周期：分配总是返回编号最小的空闲块，释放时清空链接。
/// 越界的块号在 `free`/`set_next`/`next`/`is_busy` 中一律静默忽略。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAllocationTable {
    entries: Vec<FatEntry>,
    free_blocks: u32, // 当前空闲块数
}

impl BlockAllocationTable {
    pub fn new(total_blocks: u32) -> Self {
        Self {
            entries: vec![FatEntry::default(); total_blocks as usize],
            free_blocks: total_blocks,
        }
    }

    pub fn total_blocks(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn free_count(&self) -> u32 {
        self.free_blocks
    }

    pub fn busy_count(&self) -> u32 {
        self.total_blocks() - self.free_blocks
    }

    // 分配一个空闲块，返回编号；表满时返回 None
    pub fn alloc(&mut self) -> Option<BlockId> {
        let index = self.entries.iter().position(|entry| !entry.busy)?;
        self.entries[index] = FatEntry {
            busy: true,
            next: None,
        };
        self.free_blocks -= 1;
        Some(index as BlockId)
    }

    // 释放一个块
    pub fn free(&mut self, block: BlockId) {
        let Some(entry) = self.entries.get_mut(block as usize) else {
            return; // 防止越界
        };
        if entry.busy {
            self.free_blocks += 1;
        }
        *entry = FatEntry::default();
    }

    /// 设置链接。只对已占用的块生效，空闲块必须保持 `next = None`。
    pub fn set_next(&mut self, block: BlockId, next: Option<BlockId>) {
        if let Some(entry) = self.entries.get_mut(block as usize) {
            if entry.busy {
                entry.next = next;
            }
        }
    }

    pub fn next(&self, block: BlockId) -> Option<BlockId> {
        self.entries.get(block as usize).and_then(|entry| entry.next)
    }

    pub fn is_busy(&self, block: BlockId) -> bool {
        self.entries
            .get(block as usize)
            .map_or(false, |entry| entry.busy)
    }

    /// 从 `start` 开始沿链走到链尾，返回经过的所有块。
    ///
    /// 步数不超过表容量，损坏的环形链也能终止。
    pub fn chain(&self, start: BlockId) -> Vec<BlockId> {
        let mut blocks = Vec::new();
        let mut current = Some(start);

        while let Some(block) = current {
            if !self.is_busy(block) || blocks.len() >= self.entries.len() {
                break;
            }
            blocks.push(block);
            current = self.next(block);
        }
        blocks
    }

    pub fn busy_blocks(&self) -> impl Iterator<Item = (BlockId, &FatEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.busy)
            .map(|(index, entry)| (index as BlockId, entry))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.entries.len() * FAT_ENTRY_SIZE);
        for entry in &self.entries {
            let raw = RawFatEntry {
                busy: entry.busy as u8,
                reserved: 0,
                next: entry.next.map_or(FAT_END_OF_CHAIN, |next| next as u16),
            };
            bytes.extend_from_slice(&bincode::serialize(&raw)?);
        }
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8], total_blocks: u32) -> Result<Self> {
        let expected = total_blocks as usize * FAT_ENTRY_SIZE;
        if bytes.len() < expected {
            return Err(FileSystemError::CorruptState(format!(
                "allocation table truncated: {} of {} bytes",
                bytes.len(),
                expected
            )));
        }

        let mut table = Self::new(total_blocks);
        for (index, chunk) in bytes[..expected].chunks_exact(FAT_ENTRY_SIZE).enumerate() {
            let raw: RawFatEntry = bincode::deserialize(chunk)?;
            let next = match raw.next {
                FAT_END_OF_CHAIN => None,
                next if (next as u32) < total_blocks => Some(next as BlockId),
                next => {
                    return Err(FileSystemError::CorruptState(format!(
                        "block {} links to out-of-range block {}",
                        index, next
                    )))
                }
            };
            let busy = match raw.busy {
                0 => false,
                1 => true,
                other => {
                    return Err(FileSystemError::CorruptState(format!(
                        "block {} has invalid busy flag {}",
                        index, other
                    )))
                }
            };
            if !busy && next.is_some() {
                return Err(FileSystemError::CorruptState(format!(
                    "free block {} is linked into a chain",
                    index
                )));
            }

            table.entries[index] = FatEntry { busy, next };
        }
        table.free_blocks = table.entries.iter().filter(|entry| !entry.busy).count() as u32;

        Ok(table)
    }

    // 从磁盘加载分配表
    pub fn load(disk: &dyn BlockDevice, offset: u64, total_blocks: u32) -> Result<Self> {
        let mut bytes = vec![0u8; total_blocks as usize * FAT_ENTRY_SIZE];
        disk.read_at(offset, &mut bytes)?;
        Self::from_bytes(&bytes, total_blocks)
    }

    // 将分配表写回磁盘
    pub fn sync(&self, disk: &dyn BlockDevice, offset: u64) -> Result<()> {
        disk.write_at(offset, &self.to_bytes()?)?;
        Ok(())
    }
}

impl fmt::Display for BlockAllocationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FAT Table (Occupied Blocks Only):")?;
        for (block, entry) in self.busy_blocks() {
            match entry.next {
                Some(next) => writeln!(f, "Block {}: next = {}", block, next)?,
                None => writeln!(f, "Block {}: end of chain", block)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_table_allocates_every_block_in_order() {
        let mut table = BlockAllocationTable::new(64);
        for expected in 0..64 {
            assert_eq!(table.alloc(), Some(expected));
        }
        assert_eq!(table.alloc(), None);
        assert_eq!(table.free_count(), 0);
        assert_eq!(table.busy_count(), 64);
    }

    #[test]
    fn alloc_returns_lowest_free_block() {
        let mut table = BlockAllocationTable::new(16);
        for _ in 0..6 {
            table.alloc();
        }
        table.free(4);
        table.free(2);

        assert_eq!(table.alloc(), Some(2));
        assert_eq!(table.alloc(), Some(4));
        assert_eq!(table.alloc(), Some(6));
    }

    #[test]
    fn free_resets_link_and_ignores_out_of_range() {
        let mut table = BlockAllocationTable::new(8);
        let a = table.alloc().unwrap();
        let b = table.alloc().unwrap();
        table.set_next(a, Some(b));

        table.free(a);
        assert!(!table.is_busy(a));
        assert_eq!(table.next(a), None);

        table.free(100);
        assert_eq!(table.free_count(), 7);
        assert!(!table.is_busy(100));
        assert_eq!(table.next(100), None);
    }

    #[test]
    fn double_free_does_not_inflate_free_count() {
        let mut table = BlockAllocationTable::new(8);
        let a = table.alloc().unwrap();
        table.free(a);
        table.free(a);
        assert_eq!(table.free_count(), 8);
    }

    #[test]
    fn set_next_on_free_block_is_ignored() {
        let mut table = BlockAllocationTable::new(8);
        table.set_next(3, Some(1));
        assert_eq!(table.next(3), None);
    }

    #[test]
    fn chain_follows_links_until_end() {
        let mut table = BlockAllocationTable::new(16);
        let a = table.alloc().unwrap();
        let b = table.alloc().unwrap();
        let c = table.alloc().unwrap();
        table.set_next(a, Some(c));
        table.set_next(c, Some(b));

        assert_eq!(table.chain(a), vec![0, 2, 1]);
        assert_eq!(table.chain(9), Vec::<BlockId>::new());
    }

    #[test]
    fn chain_terminates_on_cycle() {
        let mut table = BlockAllocationTable::new(4);
        let a = table.alloc().unwrap();
        let b = table.alloc().unwrap();
        table.set_next(a, Some(b));
        table.set_next(b, Some(a));

        assert_eq!(table.chain(a).len(), 4);
    }

    #[test]
    fn bytes_round_trip_keeps_busy_pattern_and_links() {
        let mut table = BlockAllocationTable::new(32);
        for _ in 0..5 {
            table.alloc();
        }
        table.set_next(1, Some(3));
        table.free(2);

        let bytes = table.to_bytes().unwrap();
        assert_eq!(bytes.len(), 32 * FAT_ENTRY_SIZE);

        let restored = BlockAllocationTable::from_bytes(&bytes, 32).unwrap();
        assert_eq!(restored, table);
        assert_eq!(restored.free_count(), 28);
    }

    #[test]
    fn from_bytes_rejects_linked_free_block() {
        let table = BlockAllocationTable::new(4);
        let mut bytes = table.to_bytes().unwrap();
        // 0 号块：busy = 0，next = 1
        bytes[2] = 1;
        bytes[3] = 0;

        assert!(matches!(
            BlockAllocationTable::from_bytes(&bytes, 4),
            Err(FileSystemError::CorruptState(_))
        ));
    }

    #[test]
    fn from_bytes_rejects_out_of_range_link() {
        let mut table = BlockAllocationTable::new(4);
        table.alloc();
        let mut bytes = table.to_bytes().unwrap();
        bytes[2] = 9;
        bytes[3] = 0;

        assert!(matches!(
            BlockAllocationTable::from_bytes(&bytes, 4),
            Err(FileSystemError::CorruptState(_))
        ));
    }
}
