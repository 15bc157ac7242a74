use std::fmt;

use crate::fs::{allocation_table::BlockId, directory::DirectoryEntry};

/// 一个目录项连同它占用的块链
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainedEntry {
    pub entry: DirectoryEntry,
    pub blocks: Vec<BlockId>,
}

/// dumpe2fs 的汇总信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsSummary {
    pub block_count: u32,
    pub block_size: u32,
    pub free_blocks: u32,
    pub occupied_blocks: u32,
    pub file_count: usize,
    pub directory_count: usize,
    pub entries: Vec<ChainedEntry>,
}

impl fmt::Display for FsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Filesystem Summary:")?;
        writeln!(f, "Block count: {}", self.block_count)?;
        writeln!(f, "Block size: {} bytes", self.block_size)?;
        writeln!(f, "Free blocks: {}", self.free_blocks)?;
        writeln!(f, "Occupied blocks: {}", self.occupied_blocks)?;
        writeln!(f, "Number of files: {}", self.file_count)?;
        writeln!(f, "Number of directories: {}", self.directory_count)?;
        writeln!(f, "Occupied blocks and file names:")?;

        for chained in &self.entries {
            let kind = if chained.entry.is_directory() {
                "Directory"
            } else {
                "File"
            };
            let blocks: Vec<String> = chained.blocks.iter().map(|b| b.to_string()).collect();
            writeln!(f, "{}: {} at blocks [{}]", kind, chained.entry.name(), blocks.join(", "))?;
            writeln!(f, "    {}", chained.entry)?;
        }
        Ok(())
    }
}

/// 一个目录块里实际保存的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPage {
    pub directory: DirectoryEntry,
    pub records: Vec<DirectoryEntry>,
}

impl fmt::Display for DirectoryPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Directory: {} at block {}",
            self.directory.name(),
            self.directory.first_block()
        )?;
        for record in &self.records {
            writeln!(f, "    {}", record)?;
        }
        Ok(())
    }
}

/// 一个已占用块的原始内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDump {
    pub block: BlockId,
    pub data: Vec<u8>,
}

impl fmt::Display for BlockDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 末尾的 0 不打印
        let end = self
            .data
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        writeln!(f, "Block {}:", self.block)?;
        write!(f, "{}", String::from_utf8_lossy(&self.data[..end]))
    }
}
