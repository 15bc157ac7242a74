use std::io::Result;

/// 按字节偏移访问的后备存储。
///
/// 块号到偏移的换算由上层的卷布局负责，这里只负责把字节读写到正确位置。
pub trait BlockDevice: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;
    /// 后备存储当前长度（字节）
    fn len(&self) -> Result<u64>;
}
