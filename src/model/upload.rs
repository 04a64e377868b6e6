//! 上传中的乐观行与服务端列表合并，以及拖拽移动的目标计算

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::tree::{find_item_in_tree, get_parent, join_path, FileCategory, FileEntry};

/// 上传中的条目，按路径索引，保持开始上传的顺序
pub type UploadingMap = IndexMap<String, FileEntry>;

/// 上传进度回调给出的一条记录
#[derive(Debug, Clone, PartialEq)]
pub struct UploadingFile {
    pub name: String,
    pub size: u64,
    /// 0–100
    pub progress: f32,
    /// 目标目录
    pub dir: String,
}

/// 把上传中的文件转换成与列表条目同形的行，键为 `dir/name`
pub fn uploading_file_to_row(file: &UploadingFile) -> FileEntry {
    let modified = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    FileEntry {
        path: join_path(&file.dir, &file.name),
        name: file.name.clone(),
        category: FileCategory::guess(&file.name),
        is_dir: false,
        size: file.size,
        modified,
        children: None,
        progress: Some(file.progress.clamp(0.0, 100.0)),
    }
}

/// 合并服务端列表与上传中的条目
///
/// 每一层的顺序：目录（子节点递归合并）→ 父路径为本层的上传条目 → 普通文件。
/// 本层已有同路径的服务端条目时不再注入上传条目，上传完成后重新拉取列表即自然"转正"。
pub fn merge_rows(canonical: &[FileEntry], parent_path: &str, uploading: &UploadingMap) -> Vec<FileEntry> {
    let present: HashSet<&str> = canonical.iter().map(|e| e.path.as_str()).collect();
    let mut merged = Vec::with_capacity(canonical.len());

    for dir in canonical.iter().filter(|e| e.is_dir) {
        let mut entry = dir.clone();
        if let Some(children) = &dir.children {
            entry.children = Some(merge_rows(children, &dir.path, uploading));
        }
        merged.push(entry);
    }

    merged.extend(
        uploading
            .iter()
            .filter(|(path, _)| get_parent(path) == parent_path && !present.contains(path.as_str()))
            .map(|(_, row)| row.clone()),
    );

    merged.extend(canonical.iter().filter(|e| !e.is_dir).cloned());
    merged
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MoveError {
    #[error("源条目不存在: {0}")]
    SourceNotFound(String),
    #[error("目标不是目录: {0}")]
    NotADirectory(String),
    #[error("不能移动到自身或其子目录: {0}")]
    IntoItself(String),
    #[error("已在目标目录中: {0}")]
    SameLocation(String),
    #[error("目标目录已存在同名条目: {0}")]
    NameCollision(String),
    #[error("上传中的条目不能移动: {0}")]
    Uploading(String),
}

/// 计算把 `source` 拖到 `target_dir` 后的新路径（空串表示根目录）
pub fn plan_move(tree: &[FileEntry], source: &str, target_dir: &str) -> Result<String, MoveError> {
    let entry = find_item_in_tree(source, tree).ok_or_else(|| MoveError::SourceNotFound(source.to_string()))?;
    if entry.is_uploading() {
        return Err(MoveError::Uploading(source.to_string()));
    }

    let siblings: &[FileEntry] = if target_dir.is_empty() {
        tree
    } else {
        let target = find_item_in_tree(target_dir, tree)
            .ok_or_else(|| MoveError::NotADirectory(target_dir.to_string()))?;
        if !target.is_dir {
            return Err(MoveError::NotADirectory(target_dir.to_string()));
        }
        target.children.as_deref().unwrap_or(&[])
    };

    if target_dir == source || target_dir.starts_with(&format!("{}/", source)) {
        return Err(MoveError::IntoItself(source.to_string()));
    }
    if get_parent(source) == target_dir {
        return Err(MoveError::SameLocation(source.to_string()));
    }

    let destination = join_path(target_dir, &entry.name);
    if siblings.iter().any(|s| s.path == destination) {
        return Err(MoveError::NameCollision(destination));
    }
    Ok(destination)
}
