/// 文件系统标识与魔数，写在卷头里
pub const FS_TYPE: &str = "MiniFAT";
pub const FS_MAGIC: u64 = 0x4D46_4154_3132_0001;
pub const FS_VERSION: u32 = 1;

/// 卷中块的总数，整个卷生命周期内固定
pub const TOTAL_BLOCKS: u32 = 4096;

/// 卷头区域大小，位于块数据区之前，不与 0 号块重叠
pub const HEADER_SIZE: u64 = 512;

// 每个目录项固定 32 字节
pub const DIR_ENTRY_SIZE: usize = 32;

// 分配表每项 4 字节：busy(1) + reserved(1) + next(2)
pub const FAT_ENTRY_SIZE: usize = 4;

// next 字段中表示“没有下一块”的值
pub const FAT_END_OF_CHAIN: u16 = 0xFFFF;

// 块大小范围（字节），且必须是目录项大小的整数倍
pub const MIN_BLOCK_SIZE: usize = 512;
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

pub const DEFAULT_BLOCK_SIZE_KB: f64 = 1.0;

/// 根目录的名字，同时也是缺省的父目录名
pub const ROOT_NAME: &str = "/";

// 根目录固定占用的块
pub const ROOT_BLOCK: u32 = 0;
