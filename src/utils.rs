use chrono::{Local, NaiveDateTime};
use uuid::Uuid;

/// 当前本地时间，目录项的修改时间以本地时间打包
pub fn current_time() -> NaiveDateTime {
    Local::now().naive_local()
}

/// 生成一个随机唯一 ID
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// 把字符串截断/补零到定长字节数组
pub fn to_fixed_bytes<const N: usize>(text: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let len = text.len().min(N);
    out[..len].copy_from_slice(&text[..len]);
    out
}

/// 定长字节数组在第一个 0 处截断后转成字符串
pub fn from_fixed_bytes(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
