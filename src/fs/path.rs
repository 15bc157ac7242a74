//! 单段名字解析：路径只用来取出最后一段（名字）和倒数第二段（父目录名）。

use crate::fs::config::ROOT_NAME;

/// 按 `/` 切分，丢弃空段
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// 最后一段；`/` 或空串返回 None
pub fn leaf_name(path: &str) -> Option<&str> {
    split_path(path).last().copied()
}

/// 倒数第二段，不足两段时为根目录名
pub fn parent_name(path: &str) -> &str {
    let parts = split_path(path);
    if parts.len() < 2 {
        return ROOT_NAME;
    }
    parts[parts.len() - 2]
}

/// 把相对路径接到当前目录后面；绝对路径原样返回。`..` 回到上一级。
pub fn join(current: &str, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }

    let mut parts = split_path(current);
    for part in split_path(path) {
        match part {
            "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}
