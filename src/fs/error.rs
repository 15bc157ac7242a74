use std::fmt;

/// 文件系统错误类型
///
/// 所有操作失败都通过它返回，调用方决定是打印还是继续向上传递。
#[derive(Debug)]
pub enum FileSystemError {
    Io(std::io::Error),           // 底层 I/O 错误
    NotFound(String),             // 文件或目录不存在，带名字
    PermissionDenied(String),     // 缺少读/写权限位
    AlreadyExists(String),        // 同名项已存在
    AuthenticationFailed(String), // 密码不匹配
    OutOfSpace,                   // 分配表已满
    DirectoryFull(String),        // 目录块里没有空槽
    DirectoryNotEmpty(String),    // 目录非空
    IsADirectory(String),         // 需要文件却给了目录
    InvalidPath(String),          // 路径非法
    InvalidArgument(String),      // 权限增量、密码等参数非法
    InvalidBlockSize(f64),        // 块大小（KB）不可用
    CorruptState(String),         // 卷内容损坏
}

impl From<std::io::Error> for FileSystemError {
    fn from(e: std::io::Error) -> Self {
        FileSystemError::Io(e)
    }
}

impl From<bincode::Error> for FileSystemError {
    fn from(e: bincode::Error) -> Self {
        FileSystemError::CorruptState(format!("encoding error: {}", e))
    }
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Disk I/O error: {}", e),
            Self::NotFound(name) => write!(f, "File or directory not found: {}", name),
            Self::PermissionDenied(what) => write!(f, "Permission denied: {}", what),
            Self::AlreadyExists(name) => write!(f, "File or directory already exists: {}", name),
            Self::AuthenticationFailed(name) => write!(f, "Password is incorrect for: {}", name),
            Self::OutOfSpace => write!(f, "No space left on volume"),
            Self::DirectoryFull(name) => {
                write!(f, "No space left in directory block of: {}", name)
            }
            Self::DirectoryNotEmpty(name) => write!(f, "Directory is not empty: {}", name),
            Self::IsADirectory(name) => write!(f, "Expected a file, found a directory: {}", name),
            Self::InvalidPath(path) => write!(f, "Invalid path: {}", path),
            Self::InvalidArgument(desc) => write!(f, "Invalid argument: {}", desc),
            Self::InvalidBlockSize(kb) => write!(f, "Unsupported block size: {} KB", kb),
            Self::CorruptState(desc) => write!(f, "File system corrupted: {}", desc),
        }
    }
}

// 支持链式错误，方便追踪底层原因
impl std::error::Error for FileSystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FileSystemError>;
