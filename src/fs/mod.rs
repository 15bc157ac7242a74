use std::path::Path;

use log::{debug, info, warn};

use crate::fs::{
    allocation_table::{BlockAllocationTable, BlockId},
    config::{ROOT_BLOCK, ROOT_NAME, TOTAL_BLOCKS},
    directory::{Attributes, DirectoryEntry, EntryList, PermissionDelta},
    error::{FileSystemError, Result},
    path::{leaf_name, parent_name},
    report::{BlockDump, ChainedEntry, DirectoryPage, FsSummary},
    super_block::SuperBlock,
    volume::VolumeStore,
};

pub mod allocation_table;
pub mod config;
pub mod directory;
pub mod error;
pub mod path;
pub mod report;
pub mod super_block;
pub mod timestamp;
pub mod volume;

#[cfg(test)]
mod tests;

/// 挂载后的文件系统。
///
/// 分配表和目录项表常驻内存，每次操作直接改块数据；元数据只在 `save` 时写回卷文件。
/// 操作失败时不回滚已经做过的修改。
#[derive(Debug)]
pub struct FileSystem {
    volume: VolumeStore,       // 卷文件
    super_block: SuperBlock,   // 卷头
    fat: BlockAllocationTable, // 块分配表
    entries: EntryList,        // 全卷目录项表
}

impl FileSystem {
    /// 新建卷：清空分配表，0 号块给根目录，立即保存
    pub fn format(path: impl AsRef<Path>, block_size: u32) -> Result<Self> {
        let volume = VolumeStore::create(path, block_size)?;
        let super_block = SuperBlock::new(block_size);
        let mut fat = BlockAllocationTable::new(TOTAL_BLOCKS);

        let root_block = fat.alloc().ok_or(FileSystemError::OutOfSpace)?;
        let mut root = DirectoryEntry::new(ROOT_NAME, root_block, 0, Attributes::DIRECTORY_DEFAULT)?;
        root.touch();
        volume.append_record(root_block, &root)?;

        let mut entries = EntryList::new();
        entries.push(root);

        let fs = Self {
            volume,
            super_block,
            fat,
            entries,
        };
        fs.save()?;
        info!(
            "formatted {} with {} blocks of {} bytes",
            fs.volume.path().display(),
            TOTAL_BLOCKS,
            block_size
        );
        Ok(fs)
    }

    pub fn mount(path: impl AsRef<Path>) -> Result<Self> {
        let (volume, super_block) = VolumeStore::open(path)?;
        let fat = volume.load_table()?;
        let entries = volume.load_entries()?;
        info!(
            "mounted {}: {} entries, {} free blocks",
            volume.path().display(),
            entries.len(),
            fat.free_count()
        );

        Ok(Self {
            volume,
            super_block,
            fat,
            entries,
        })
    }

    /// 卷文件存在就挂载，否则按给定块大小（KB）格式化
    pub fn open_or_format(path: impl AsRef<Path>, block_size_kb: f64) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            // 已有卷用卷头里的块大小，参数不参与
            Self::mount(path)
        } else {
            Self::format(path, SuperBlock::block_size_from_kb(block_size_kb)?)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.volume.save(&self.super_block, &self.fat, &self.entries)
    }

    pub fn block_size(&self) -> u32 {
        self.super_block.block_size
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn allocation_table(&self) -> &BlockAllocationTable {
        &self.fat
    }

    pub fn entries(&self) -> &EntryList {
        &self.entries
    }

    /// 按名字在全卷查找，第一个匹配的胜出
    pub fn find_entry(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.find(name).and_then(|index| self.entries.get(index))
    }

    pub fn make_directory(&mut self, path: &str) -> Result<()> {
        let leaf = leaf_of(path)?;
        DirectoryEntry::validate_name(leaf)?;
        let parent = self.parent_directory(path)?;

        if self.find_record_slot(parent.first_block(), leaf, None)?.is_some() {
            return Err(FileSystemError::AlreadyExists(leaf.to_string()));
        }

        let block = self.fat.alloc().ok_or(FileSystemError::OutOfSpace)?;
        let mut entry = DirectoryEntry::new(leaf, block, 0, Attributes::DIRECTORY_DEFAULT)?;
        entry.touch();

        if let Err(e) = self.append_to_directory(&parent, &entry) {
            self.fat.free(block);
            return Err(e);
        }

        // 新目录块：自己 + 父目录的副本
        self.volume.zero_block(block)?;
        self.volume.append_record(block, &entry)?;
        self.volume.append_record(block, &parent)?;
        self.entries.push(entry);

        info!("created directory {} at block {}", path, block);
        Ok(())
    }

    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        let leaf = leaf_of(path)?;
        let index = self
            .entries
            .find_directory(leaf)
            .ok_or_else(|| FileSystemError::NotFound(leaf.to_string()))?;
        let directory = self.entry_at(index)?.clone();

        // 只要有别的项的链接指向这个目录的块，就认为它非空
        let referenced = self.entries.iter().enumerate().any(|(i, entry)| {
            i != index && self.fat.next(entry.first_block()) == Some(directory.first_block())
        });
        if referenced {
            return Err(FileSystemError::DirectoryNotEmpty(leaf.to_string()));
        }

        match self.entries.find_directory(parent_name(path)) {
            Some(parent_index) => {
                let parent_block = self.entry_at(parent_index)?.first_block();
                match self.find_record_slot(parent_block, leaf, Some(directory.first_block()))? {
                    Some((block, slot, _)) => self.volume.clear_record(block, slot)?,
                    None => warn!("directory {} has no record in its parent", path),
                }
            }
            None => warn!("parent of {} is gone", path),
        }

        self.release_chain(directory.first_block())?;
        self.entries.remove(index);
        info!("removed directory {}", path);
        Ok(())
    }

    pub fn write_file(&mut self, path: &str, content: &[u8]) -> Result<()> {
        self.create_file(path, content, Attributes::FILE_DEFAULT, None)?;
        info!("wrote {} bytes to {}", content.len(), path);
        Ok(())
    }

    /// 把已有文件的内容复制成一个新文件。源文件需要写权限，目标名在全卷范围内不能重名。
    pub fn write_file_from_existing(&mut self, dest: &str, src: &str) -> Result<()> {
        let source = self.lookup_file(src)?;
        if !source.can_write() {
            return Err(FileSystemError::PermissionDenied(format!(
                "{} is not writable",
                source.name()
            )));
        }
        let content = self.read_content(&source)?;

        let dest_leaf = leaf_of(dest)?;
        if self.entries.find(dest_leaf).is_some() {
            return Err(FileSystemError::AlreadyExists(dest_leaf.to_string()));
        }

        self.create_file(dest, &content, Attributes::FILE_DEFAULT, None)?;
        info!("copied {} to {} ({} bytes)", src, dest, content.len());
        Ok(())
    }

    /// 读出文件内容并在 `dest` 处生成一份副本（已存在则先删掉），返回内容
    pub fn read_file(&mut self, path: &str, dest: &str, password: Option<&str>) -> Result<Vec<u8>> {
        let source = self.lookup_file(path)?;
        if !source.can_read() {
            return Err(FileSystemError::PermissionDenied(format!(
                "{} is not readable",
                source.name()
            )));
        }
        if !source.check_password(password) {
            return Err(FileSystemError::AuthenticationFailed(source.name()));
        }
        let content = self.read_content(&source)?;

        let dest_leaf = leaf_of(dest)?;
        if let Some(index) = self.entries.find_directory(parent_name(dest)) {
            let parent_block = self.entry_at(index)?.first_block();
            if self.find_record_slot(parent_block, dest_leaf, None)?.is_some() {
                self.delete_file(dest)?;
            }
        }

        self.create_file(dest, &content, Attributes::FILE_DEFAULT, None)?;
        info!("read {} bytes from {} into {}", content.len(), path, dest);
        Ok(content)
    }

    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let leaf = leaf_of(path)?;
        let parent = self.parent_directory(path)?;
        let (block, slot, record) = self
            .find_record_slot(parent.first_block(), leaf, None)?
            .ok_or_else(|| FileSystemError::NotFound(leaf.to_string()))?;
        if record.is_directory() {
            return Err(FileSystemError::IsADirectory(leaf.to_string()));
        }

        let index = self
            .entries
            .find_with_block(leaf, record.first_block())
            .or_else(|| self.entries.find(leaf))
            .ok_or_else(|| FileSystemError::NotFound(leaf.to_string()))?;
        let entry = self.entry_at(index)?.clone();

        self.volume.clear_record(block, slot)?;
        self.release_chain(entry.first_block())?;
        self.entries.remove(index);
        info!("deleted {}", path);
        Ok(())
    }

    /// 修改读写权限。文件会被删掉重建（密码随之清空），目录原地修改。
    pub fn change_mode(&mut self, path: &str, delta: PermissionDelta) -> Result<()> {
        let index = self.locate(path)?;
        let entry = self.entry_at(index)?.clone();
        let attributes = delta.apply(entry.attributes());

        if entry.is_directory() {
            self.update_in_place(index, path, |entry| {
                entry.set_attributes(attributes);
                Ok(())
            })?;
        } else {
            self.recreate(path, &entry, attributes, None)?;
        }
        info!("changed mode of {} to {}", path, attributes.permission_string());
        Ok(())
    }

    /// 设置密码。文件会被删掉重建（属性恢复为默认值），目录原地修改。
    pub fn add_password(&mut self, path: &str, password: &str) -> Result<()> {
        DirectoryEntry::validate_password(password)?;
        let index = self.locate(path)?;
        let entry = self.entry_at(index)?.clone();

        if entry.is_directory() {
            self.update_in_place(index, path, |entry| entry.set_password(password))?;
        } else {
            self.recreate(path, &entry, Attributes::FILE_DEFAULT, Some(password))?;
        }
        info!("set password on {}", path);
        Ok(())
    }

    /// 全卷所有目录项，目录在前
    pub fn list(&self) -> Vec<DirectoryEntry> {
        self.entries.list_sorted()
    }

    /// 目录块里保存的记录；路径没有任何段时列根目录
    pub fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let name = leaf_name(path).unwrap_or(ROOT_NAME);
        let index = self
            .entries
            .find_directory(name)
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))?;
        let directory = self.entry_at(index)?;
        self.directory_records(directory.first_block())
    }

    pub fn dump_summary(&self) -> FsSummary {
        let directory_count = self.entries.iter().filter(|e| e.is_directory()).count();
        FsSummary {
            block_count: self.fat.total_blocks(),
            block_size: self.block_size(),
            free_blocks: self.fat.free_count(),
            occupied_blocks: self.fat.busy_count(),
            file_count: self.entries.len() - directory_count,
            directory_count,
            entries: self
                .entries
                .iter()
                .map(|entry| ChainedEntry {
                    entry: entry.clone(),
                    blocks: self.fat.chain(entry.first_block()),
                })
                .collect(),
        }
    }

    pub fn directory_pages(&self) -> Result<Vec<DirectoryPage>> {
        self.entries
            .iter()
            .filter(|entry| entry.is_directory())
            .map(|directory| -> Result<DirectoryPage> {
                Ok(DirectoryPage {
                    directory: directory.clone(),
                    records: self.directory_records(directory.first_block())?,
                })
            })
            .collect()
    }

    /// 除根目录块以外所有已占用块的原始内容
    pub fn block_contents(&self) -> Result<Vec<BlockDump>> {
        self.fat
            .busy_blocks()
            .filter(|(block, _)| *block != ROOT_BLOCK)
            .map(|(block, _)| -> Result<BlockDump> {
                Ok(BlockDump {
                    block,
                    data: self.volume.read_block(block)?,
                })
            })
            .collect()
    }

    fn entry_at(&self, index: usize) -> Result<&DirectoryEntry> {
        self.entries
            .get(index)
            .ok_or_else(|| FileSystemError::CorruptState(format!("entry {} vanished", index)))
    }

    fn lookup(&self, path: &str) -> Result<DirectoryEntry> {
        let leaf = leaf_of(path)?;
        self.find_entry(leaf)
            .cloned()
            .ok_or_else(|| FileSystemError::NotFound(leaf.to_string()))
    }

    /// 按路径定位实体：优先取父目录块里那条记录对应的项，找不到时退回全卷按名字查找
    fn locate(&self, path: &str) -> Result<usize> {
        let leaf = leaf_of(path)?;
        if let Some(parent_index) = self.entries.find_directory(parent_name(path)) {
            let parent_block = self.entry_at(parent_index)?.first_block();
            if let Some((_, _, record)) = self.find_record_slot(parent_block, leaf, None)? {
                if let Some(index) = self.entries.find_with_block(leaf, record.first_block()) {
                    return Ok(index);
                }
            }
        }
        self.entries
            .find(leaf)
            .ok_or_else(|| FileSystemError::NotFound(leaf.to_string()))
    }

    fn lookup_file(&self, path: &str) -> Result<DirectoryEntry> {
        let entry = self.lookup(path)?;
        if entry.is_directory() {
            return Err(FileSystemError::IsADirectory(entry.name()));
        }
        Ok(entry)
    }

    fn parent_directory(&self, path: &str) -> Result<DirectoryEntry> {
        let name = parent_name(path);
        let index = self
            .entries
            .find_directory(name)
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))?;
        Ok(self.entry_at(index)?.clone())
    }

    fn directory_records(&self, first_block: BlockId) -> Result<Vec<DirectoryEntry>> {
        let mut records = Vec::new();
        for block in self.fat.chain(first_block) {
            records.extend(self.volume.read_records(block)?.into_iter().map(|(_, r)| r));
        }
        Ok(records)
    }

    /// 在目录块链中找名字匹配（可选再要求首块相同）的记录：(块号, 槽位, 记录)
    fn find_record_slot(
        &self,
        directory_block: BlockId,
        name: &str,
        first_block: Option<BlockId>,
    ) -> Result<Option<(BlockId, usize, DirectoryEntry)>> {
        for block in self.fat.chain(directory_block) {
            for (slot, record) in self.volume.read_records(block)? {
                // 目录块里自己那条记录不算子项
                if block == directory_block && record.first_block() == directory_block {
                    continue;
                }
                if record.matches(name) && first_block.map_or(true, |b| b == record.first_block()) {
                    return Ok(Some((block, slot, record)));
                }
            }
        }
        Ok(None)
    }

    fn append_to_directory(&self, parent: &DirectoryEntry, entry: &DirectoryEntry) -> Result<()> {
        match self.volume.append_record(parent.first_block(), entry)? {
            Some(slot) => {
                debug!("record {} -> block {} slot {}", entry.name(), parent.first_block(), slot);
                Ok(())
            }
            None => Err(FileSystemError::DirectoryFull(parent.name())),
        }
    }

    fn create_file(
        &mut self,
        path: &str,
        content: &[u8],
        attributes: Attributes,
        password: Option<&str>,
    ) -> Result<()> {
        let leaf = leaf_of(path)?;
        DirectoryEntry::validate_name(leaf)?;
        if let Some(password) = password {
            DirectoryEntry::validate_password(password)?;
        }
        let size = u32::try_from(content.len()).map_err(|_| {
            FileSystemError::InvalidArgument(format!("{} bytes is too large", content.len()))
        })?;

        let parent = self.parent_directory(path)?;
        if !parent.can_write() {
            return Err(FileSystemError::PermissionDenied(format!(
                "directory {} is not writable",
                parent.name()
            )));
        }
        if self.find_record_slot(parent.first_block(), leaf, None)?.is_some() {
            return Err(FileSystemError::AlreadyExists(leaf.to_string()));
        }

        let first = self.fat.alloc().ok_or(FileSystemError::OutOfSpace)?;
        let mut entry = DirectoryEntry::new(leaf, first, size, attributes)?;
        if let Some(password) = password {
            entry.set_password(password)?;
        }
        entry.touch();

        if let Err(e) = self.append_to_directory(&parent, &entry) {
            self.fat.free(first);
            return Err(e);
        }
        self.entries.push(entry);

        self.write_chain(first, content)
    }

    /// 从 `first` 开始按块写入，不够时继续分配并链接
    fn write_chain(&mut self, first: BlockId, content: &[u8]) -> Result<()> {
        let mut chunks = content.chunks(self.volume.block_size());
        self.volume.write_block(first, chunks.next().unwrap_or(&[]))?;

        let mut current = first;
        for chunk in chunks {
            let next = self.fat.alloc().ok_or(FileSystemError::OutOfSpace)?;
            self.fat.set_next(current, Some(next));
            self.volume.write_block(next, chunk)?;
            current = next;
        }
        Ok(())
    }

    /// 沿链读出内容：先按 size 截断，再在第一个 0 字节处截断
    fn read_content(&self, entry: &DirectoryEntry) -> Result<Vec<u8>> {
        let mut content = Vec::with_capacity(entry.size() as usize);
        for block in self.fat.chain(entry.first_block()) {
            content.extend_from_slice(&self.volume.read_block(block)?);
        }
        content.truncate(entry.size() as usize);
        if let Some(end) = content.iter().position(|&b| b == 0) {
            content.truncate(end);
        }
        Ok(content)
    }

    // 清零并释放整条链
    fn release_chain(&mut self, first: BlockId) -> Result<()> {
        for block in self.fat.chain(first) {
            self.volume.zero_block(block)?;
            self.fat.free(block);
        }
        debug!("released chain starting at block {}", first);
        Ok(())
    }

    // 文件删掉重建，新属性和新密码一起写入；`entry` 必须是 `path` 在父目录里的那一项
    fn recreate(
        &mut self,
        path: &str,
        entry: &DirectoryEntry,
        attributes: Attributes,
        password: Option<&str>,
    ) -> Result<()> {
        let parent = self.parent_directory(path)?;
        if !parent.can_write() {
            return Err(FileSystemError::PermissionDenied(format!(
                "directory {} is not writable",
                parent.name()
            )));
        }
        let content = self.read_content(entry)?;
        self.delete_file(path)?;
        self.create_file(path, &content, attributes, password)
    }

    /// 原地修改目录项：内存中的项、父目录块里的记录、目录自己块里的记录一起更新
    fn update_in_place<F>(&mut self, index: usize, path: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut DirectoryEntry) -> Result<()>,
    {
        let leaf = leaf_of(path)?;
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| FileSystemError::NotFound(leaf.to_string()))?;
        update(entry)?;
        entry.touch();
        let updated = entry.clone();

        match self.entries.find_directory(parent_name(path)) {
            Some(parent_index) => {
                let parent_block = self.entry_at(parent_index)?.first_block();
                if let Some((block, slot, _)) =
                    self.find_record_slot(parent_block, leaf, Some(updated.first_block()))?
                {
                    self.volume.write_record(block, slot, &updated)?;
                }
            }
            None => warn!("parent of {} is gone, only the entry table is updated", path),
        }

        let own = self
            .volume
            .read_records(updated.first_block())?
            .into_iter()
            .find(|(_, record)| record.first_block() == updated.first_block());
        if let Some((slot, _)) = own {
            self.volume.write_record(updated.first_block(), slot, &updated)?;
        }
        Ok(())
    }
}

fn leaf_of(path: &str) -> Result<&str> {
    leaf_name(path).ok_or_else(|| FileSystemError::InvalidPath(path.to_string()))
}
