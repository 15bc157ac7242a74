use std::{collections::HashMap, fmt, str::FromStr};

use bitflags::bitflags;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
    disk::BlockDevice,
    fs::{
        allocation_table::BlockId,
        config::{DIR_ENTRY_SIZE, TOTAL_BLOCKS},
        error::{FileSystemError, Result},
        timestamp,
    },
    utils::{current_time, from_fixed_bytes, to_fixed_bytes},
};

pub const NAME_LEN: usize = 8;
pub const EXTENSION_LEN: usize = 3;
pub const PASSWORD_LEN: usize = 10;

bitflags! {
    /// 目录项属性字节。
    ///
    /// 不做语义校验，任意组合的原始字节都会原样保留。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Attributes: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20; // 普通文件标记
        const _ = !0;
    }
}

impl Attributes {
    pub const DIRECTORY_DEFAULT: Self = Self::from_bits_retain(0x13);
    pub const FILE_DEFAULT: Self = Self::from_bits_retain(0x23);

    /// `rw` / `r-` / `-w` / `--`
    pub fn permission_string(&self) -> String {
        let read = if self.contains(Self::READ) { 'r' } else { '-' };
        let write = if self.contains(Self::WRITE) { 'w' } else { '-' };
        format!("{}{}", read, write)
    }
}

/// chmod 支持的权限增量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDelta {
    AddReadWrite,
    AddRead,
    AddWrite,
    RemoveReadWrite,
    RemoveRead,
    RemoveWrite,
}

impl PermissionDelta {
    pub fn apply(self, attributes: Attributes) -> Attributes {
        let rw = Attributes::READ | Attributes::WRITE;
        match self {
            Self::AddReadWrite => attributes | rw,
            Self::AddRead => attributes | Attributes::READ,
            Self::AddWrite => attributes | Attributes::WRITE,
            Self::RemoveReadWrite => attributes - rw,
            Self::RemoveRead => attributes - Attributes::READ,
            Self::RemoveWrite => attributes - Attributes::WRITE,
        }
    }
}

impl FromStr for PermissionDelta {
    type Err = FileSystemError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "+rw" => Ok(Self::AddReadWrite),
            "+r" => Ok(Self::AddRead),
            "+w" => Ok(Self::AddWrite),
            "-rw" => Ok(Self::RemoveReadWrite),
            "-r" => Ok(Self::RemoveRead),
            "-w" => Ok(Self::RemoveWrite),
            other => Err(FileSystemError::InvalidArgument(format!(
                "unknown permission change '{}' (expected +rw, +r, +w, -rw, -r or -w)",
                other
            ))),
        }
    }
}

// 落盘格式，bincode 定长编码后正好 DIR_ENTRY_SIZE 字节
#[derive(Serialize, Deserialize)]
struct RawDirEntry {
    name: [u8; NAME_LEN],
    extension: [u8; EXTENSION_LEN],
    attributes: u8,
    password: [u8; PASSWORD_LEN],
    time: u16,
    date: u16,
    first_block: u16,
    size: u32,
}

/// 把名字拆成 8 字节主名和 3 字节扩展名。
///
/// 最后一个 `.` 出现在前 8 个字节以内（含第 8 位）时才拆分，否则整串作为主名截断保存。
pub fn split_name(name: &str) -> ([u8; NAME_LEN], [u8; EXTENSION_LEN]) {
    let bytes = name.as_bytes();
    match name.rfind('.') {
        Some(dot) if dot <= NAME_LEN => (
            to_fixed_bytes(&bytes[..dot]),
            to_fixed_bytes(&bytes[dot + 1..]),
        ),
        _ => (to_fixed_bytes(bytes), [0; EXTENSION_LEN]),
    }
}

/// 一个文件或目录的定长元数据记录。
///
/// 扩展名会被保存和编码，但对外只暴露主名：按名字查找时，请求的名字先经过同样的
/// 拆分规则，再与主名逐字节比较，所以 `a.txt` 和 `a.md` 是同一个名字。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    name: [u8; NAME_LEN],
    extension: [u8; EXTENSION_LEN],
    attributes: Attributes,
    password: [u8; PASSWORD_LEN], // 明文，0 填充
    time: u16,
    date: u16,
    first_block: BlockId,
    size: u32,
}

impl DirectoryEntry {
    pub fn new(name: &str, first_block: BlockId, size: u32, attributes: Attributes) -> Result<Self> {
        Self::validate_name(name)?;
        let (stored, extension) = split_name(name);

        Ok(Self {
            name: stored,
            extension,
            attributes,
            password: [0; PASSWORD_LEN],
            time: 0,
            date: 0,
            first_block,
            size,
        })
    }

    /// 名字不能含 NUL，拆分后的主名也不能为空（比如 `.profile`）
    pub fn validate_name(name: &str) -> Result<()> {
        if name.contains('\0') || split_name(name).0[0] == 0 {
            return Err(FileSystemError::InvalidPath(name.to_string()));
        }
        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<()> {
        if password.len() > PASSWORD_LEN || password.contains('\0') {
            return Err(FileSystemError::InvalidArgument(format!(
                "password must be at most {} bytes without NUL",
                PASSWORD_LEN
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> String {
        from_fixed_bytes(&self.name)
    }

    /// 请求的名字（按存储规则规范化后）是否就是这一项
    pub fn matches(&self, name: &str) -> bool {
        split_name(name).0 == self.name
    }

    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    pub fn can_read(&self) -> bool {
        self.attributes.contains(Attributes::READ)
    }

    pub fn can_write(&self) -> bool {
        self.attributes.contains(Attributes::WRITE)
    }

    pub fn first_block(&self) -> BlockId {
        self.first_block
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn password(&self) -> String {
        from_fixed_bytes(&self.password)
    }

    pub fn has_password(&self) -> bool {
        self.password[0] != 0
    }

    pub fn set_password(&mut self, password: &str) -> Result<()> {
        Self::validate_password(password)?;
        self.password = to_fixed_bytes(password.as_bytes());
        Ok(())
    }

    /// 没设密码时任何输入都通过；设了密码时必须逐字节相等
    pub fn check_password(&self, given: Option<&str>) -> bool {
        if !self.has_password() {
            return true;
        }
        given.map_or(false, |given| given.as_bytes() == &self.password[..self.password_len()])
    }

    fn password_len(&self) -> usize {
        self.password
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(PASSWORD_LEN)
    }

    // 更新修改时间
    pub fn touch(&mut self) {
        self.set_modified(&current_time());
    }

    pub fn set_modified(&mut self, at: &NaiveDateTime) {
        self.time = timestamp::pack_time(at);
        self.date = timestamp::pack_date(at);
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        timestamp::unpack(self.time, self.date)
    }

    pub fn formatted_time(&self) -> String {
        timestamp::format_time(self.time)
    }

    pub fn formatted_date(&self) -> String {
        timestamp::format_date(self.date)
    }

    pub fn to_bytes(&self) -> Result<[u8; DIR_ENTRY_SIZE]> {
        let raw = RawDirEntry {
            name: self.name,
            extension: self.extension,
            attributes: self.attributes.bits(),
            password: self.password,
            time: self.time,
            date: self.date,
            first_block: self.first_block as u16,
            size: self.size,
        };
        let bytes = bincode::serialize(&raw)?;
        bytes.try_into().map_err(|bytes: Vec<u8>| {
            FileSystemError::CorruptState(format!(
                "directory record encoded to {} bytes",
                bytes.len()
            ))
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DIR_ENTRY_SIZE {
            return Err(FileSystemError::CorruptState(format!(
                "directory record truncated to {} bytes",
                bytes.len()
            )));
        }
        let raw: RawDirEntry = bincode::deserialize(&bytes[..DIR_ENTRY_SIZE])?;

        Ok(Self {
            name: raw.name,
            extension: raw.extension,
            attributes: Attributes::from_bits_retain(raw.attributes),
            password: raw.password,
            time: raw.time,
            date: raw.date,
            first_block: raw.first_block as BlockId,
            size: raw.size,
        })
    }

    /// 目录块中的空槽：主名首字节为 0
    pub fn is_free_slot(bytes: &[u8]) -> bool {
        bytes.first().map_or(true, |&b| b == 0)
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File Name: {}, Size: {}, First Block: {}, Attributes: {}, Password: {}, Last Modified: {} {}",
            self.name(),
            self.size,
            self.first_block,
            self.attributes.permission_string(),
            if self.has_password() { "Yes" } else { "No" },
            self.formatted_date(),
            self.formatted_time()
        )
    }
}

/// 全卷唯一的一张目录项表。
///
/// 不按目录划分：按名字查找扫描整张表，多个同名项时返回最靠前的那个。
#[derive(Debug, Clone, Default)]
pub struct EntryList {
    entries: Vec<DirectoryEntry>,
    index_map: HashMap<[u8; NAME_LEN], usize>, // 主名 -> 第一个同名项的下标
}

impl EntryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<DirectoryEntry>) -> Self {
        let mut list = Self {
            entries,
            index_map: HashMap::new(),
        };
        list.rebuild_index_map();
        list
    }

    pub fn rebuild_index_map(&mut self) {
        self.index_map.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.index_map.entry(entry.name).or_insert(i);
        }
    }

    pub fn push(&mut self, entry: DirectoryEntry) {
        self.index_map.entry(entry.name).or_insert(self.entries.len());
        self.entries.push(entry);
    }

    pub fn remove(&mut self, index: usize) -> DirectoryEntry {
        let entry = self.entries.remove(index);
        self.rebuild_index_map();
        entry
    }

    /// 第一个名字匹配的项
    pub fn find(&self, name: &str) -> Option<usize> {
        self.index_map.get(&split_name(name).0).copied()
    }

    /// 名字匹配且首块相同的项，用来在同名项中定位目录块里那一条记录对应的实体
    pub fn find_with_block(&self, name: &str, first_block: BlockId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.matches(name) && entry.first_block == first_block)
    }

    /// 第一个名字匹配且带目录位的项
    pub fn find_directory(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.matches(name) && entry.is_directory())
    }

    pub fn get(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 目录在前，同类按名字排序
    pub fn list_sorted(&self) -> Vec<DirectoryEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| match (a.is_directory(), b.is_directory()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        entries
    }

    // 从磁盘加载：u32 条数 + 定长记录
    pub fn load(disk: &dyn BlockDevice, offset: u64) -> Result<Self> {
        let mut count_bytes = [0u8; 4];
        disk.read_at(offset, &mut count_bytes)?;
        let count = u32::from_le_bytes(count_bytes);
        if count > TOTAL_BLOCKS {
            return Err(FileSystemError::CorruptState(format!(
                "entry count {} exceeds block count {}",
                count, TOTAL_BLOCKS
            )));
        }

        let mut bytes = vec![0u8; count as usize * DIR_ENTRY_SIZE];
        disk.read_at(offset + 4, &mut bytes)?;
        let entries = bytes
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(DirectoryEntry::from_bytes)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_entries(entries))
    }

    // 写回磁盘，覆盖之前保存的内容
    pub fn sync(&self, disk: &dyn BlockDevice, offset: u64) -> Result<()> {
        let mut bytes = Vec::with_capacity(4 + self.entries.len() * DIR_ENTRY_SIZE);
        bytes.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.to_bytes()?);
        }
        disk.write_at(offset, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn file(name: &str, block: BlockId) -> DirectoryEntry {
        DirectoryEntry::new(name, block, 0, Attributes::FILE_DEFAULT).unwrap()
    }

    #[test]
    fn record_is_exactly_32_bytes() {
        let entry = file("a.txt", 7);
        assert_eq!(entry.to_bytes().unwrap().len(), DIR_ENTRY_SIZE);
    }

    #[test]
    fn name_split_keeps_extension_hidden() {
        let entry = file("notes.txt", 1);
        assert_eq!(entry.name(), "notes");

        let bytes = entry.to_bytes().unwrap();
        assert_eq!(&bytes[..5], b"notes");
        assert_eq!(&bytes[8..11], b"txt");
    }

    #[test]
    fn name_split_uses_last_dot_within_eight_bytes() {
        assert_eq!(split_name("a.b.c").0, to_fixed_bytes::<8>(b"a.b"));
        assert_eq!(split_name("a.b.c").1, to_fixed_bytes::<3>(b"c"));
        // 点在第 8 位：仍然拆分
        assert_eq!(split_name("abcdefgh.md").0, *b"abcdefgh");
        // 点在第 9 位之后：整串截断作为主名
        assert_eq!(split_name("abcdefghi.md").0, *b"abcdefgh");
        assert_eq!(split_name("abcdefghi.md").1, [0; 3]);
        assert_eq!(split_name("archive.tar.gz"), (*b"archive.", [0; 3]));
    }

    #[test]
    fn long_names_are_truncated() {
        let entry = file("verylongname", 1);
        assert_eq!(entry.name(), "verylong");
        assert!(entry.matches("verylongname"));
        assert!(entry.matches("verylong"));
    }

    #[test]
    fn matching_ignores_extension() {
        let entry = file("a.txt", 1);
        assert!(entry.matches("a.txt"));
        assert!(entry.matches("a.md"));
        assert!(entry.matches("a"));
        assert!(!entry.matches("ab"));
    }

    #[test]
    fn empty_stored_name_is_rejected() {
        assert!(matches!(
            DirectoryEntry::new(".profile", 1, 0, Attributes::FILE_DEFAULT),
            Err(FileSystemError::InvalidPath(_))
        ));
        assert!(DirectoryEntry::new("", 1, 0, Attributes::FILE_DEFAULT).is_err());
    }

    #[test]
    fn bytes_round_trip_preserves_every_field() {
        let mut entry = DirectoryEntry::new("data.bin", 4095, 123_456, Attributes::from_bits_retain(0xA5)).unwrap();
        entry.set_password("secret").unwrap();
        entry.set_modified(
            &NaiveDate::from_ymd_opt(2023, 11, 2)
                .unwrap()
                .and_hms_opt(8, 30, 44)
                .unwrap(),
        );

        let decoded = DirectoryEntry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.attributes().bits(), 0xA5);
        assert_eq!(decoded.first_block(), 4095);
        assert_eq!(decoded.formatted_date(), "2023-11-02");
        assert_eq!(decoded.formatted_time(), "08:30:44");
    }

    #[test]
    fn password_check_is_plain_comparison() {
        let mut entry = file("a", 1);
        assert!(entry.check_password(None));
        assert!(entry.check_password(Some("anything")));

        entry.set_password("pw").unwrap();
        assert!(entry.has_password());
        assert!(entry.check_password(Some("pw")));
        assert!(!entry.check_password(Some("pw2")));
        assert!(!entry.check_password(Some("p")));
        assert!(!entry.check_password(None));

        entry.set_password("0123456789").unwrap();
        assert!(entry.check_password(Some("0123456789")));
        assert!(entry.set_password("0123456789a").is_err());
    }

    #[test]
    fn permission_delta_parsing_and_application() {
        let attrs = Attributes::FILE_DEFAULT;
        let delta: PermissionDelta = "-w".parse().unwrap();
        assert_eq!(delta.apply(attrs).bits(), 0x21);
        assert_eq!(PermissionDelta::RemoveReadWrite.apply(attrs).bits(), 0x20);
        assert_eq!(
            PermissionDelta::AddReadWrite
                .apply(Attributes::from_bits_retain(0x20))
                .bits(),
            0x23
        );
        assert!("rw".parse::<PermissionDelta>().is_err());
    }

    #[test]
    fn permission_string_reflects_bits() {
        assert_eq!(Attributes::FILE_DEFAULT.permission_string(), "rw");
        assert_eq!(Attributes::from_bits_retain(0x11).permission_string(), "r-");
        assert_eq!(Attributes::from_bits_retain(0x22).permission_string(), "-w");
        assert_eq!(Attributes::DIRECTORY.permission_string(), "--");
    }

    #[test]
    fn free_slot_detection() {
        assert!(DirectoryEntry::is_free_slot(&[0u8; DIR_ENTRY_SIZE]));
        assert!(!DirectoryEntry::is_free_slot(&file("x", 0).to_bytes().unwrap()));
    }

    #[test]
    fn entry_list_returns_first_match() {
        let mut list = EntryList::new();
        list.push(file("dup", 1));
        list.push(file("other", 2));
        list.push(DirectoryEntry::new("dup", 3, 0, Attributes::DIRECTORY_DEFAULT).unwrap());

        assert_eq!(list.find("dup"), Some(0));
        assert_eq!(list.find_directory("dup"), Some(2));
        assert_eq!(list.find("missing"), None);

        list.remove(0);
        assert_eq!(list.find("dup"), Some(1));
        assert_eq!(list.find("other"), Some(0));
    }

    #[test]
    fn list_sorted_puts_directories_first() {
        let list = EntryList::from_entries(vec![
            file("b", 1),
            DirectoryEntry::new("z", 2, 0, Attributes::DIRECTORY_DEFAULT).unwrap(),
            file("a", 3),
        ]);
        let names: Vec<_> = list.list_sorted().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["z", "a", "b"]);
    }
}
