//! 文件树模型：展开集合、扁平化（供虚拟列表渲染）、查找与面包屑
//!
//! 节点以 `path` 为唯一键；`children` 字段存在（哪怕为空）即视为可展开。
//! 遍历全部使用显式栈，深层目录不会耗尽调用栈。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// 文件类别（与服务端列表响应中的 `type` 对应）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Directory,
    Image,
    Video,
    Audio,
    Text,
    Loadable,
    #[default]
    #[serde(other)]
    Other,
}

impl FileCategory {
    /// 按扩展名猜测类别（上传中的条目还没有服务端给出的类别）
    pub fn guess(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" => Self::Image,
            "mp4" | "mkv" | "avi" | "mov" | "webm" => Self::Video,
            "mp3" | "wav" | "ogg" | "flac" | "m4a" => Self::Audio,
            "txt" | "md" | "json" | "yaml" | "yml" | "toml" | "py" | "log" | "csv" | "ini" => Self::Text,
            "onnx" | "tflite" | "pt" | "hef" | "blob" => Self::Loadable,
            _ => Self::Other,
        }
    }
}

/// 文件或目录条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub category: FileCategory,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
    /// unix 秒
    #[serde(default)]
    pub modified: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileEntry>>,
    /// 0–100，仅上传进行中存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
}

impl FileEntry {
    pub fn file(path: &str, size: u64) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            path: path.to_string(),
            category: FileCategory::guess(&name),
            name,
            is_dir: false,
            size,
            modified: 0.0,
            children: None,
            progress: None,
        }
    }

    pub fn directory(path: &str, children: Option<Vec<FileEntry>>) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            path: path.to_string(),
            name,
            category: FileCategory::Directory,
            is_dir: true,
            size: 0,
            modified: 0.0,
            children,
            progress: None,
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.progress.is_some()
    }
}

/// 可参与展开/扁平化的树节点：提供唯一键与可选的子节点列表
pub trait TreeItem: Sized {
    fn key(&self) -> &str;
    fn children(&self) -> Option<&[Self]>;
}

impl TreeItem for FileEntry {
    fn key(&self) -> &str {
        &self.path
    }

    fn children(&self) -> Option<&[Self]> {
        self.children.as_deref()
    }
}

/// 所有可展开节点的键（用于"全部展开"）
pub fn get_expandable_ids<T: TreeItem>(nodes: &[T]) -> HashSet<String> {
    let mut ids = HashSet::new();
    let mut stack: Vec<&T> = nodes.iter().collect();
    while let Some(node) = stack.pop() {
        if let Some(children) = node.children() {
            ids.insert(node.key().to_string());
            stack.extend(children.iter());
        }
    }
    ids
}

/// 扁平化后的一行：节点引用 + 深度（缩进）
#[derive(Debug)]
pub struct FlatRow<'a, T> {
    pub node: &'a T,
    pub depth: usize,
}

impl<T> Clone for FlatRow<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FlatRow<'_, T> {}

/// 先序遍历，只下钻已展开的节点；结果顺序即虚拟列表的渲染顺序
pub fn flatten_expanded_tree<'a, T: TreeItem>(
    nodes: &'a [T],
    expanded: &HashSet<String>,
) -> Vec<FlatRow<'a, T>> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut stack: Vec<FlatRow<'a, T>> = nodes
        .iter()
        .rev()
        .map(|node| FlatRow { node, depth: 0 })
        .collect();
    while let Some(row) = stack.pop() {
        out.push(row);
        if let Some(children) = row.node.children() {
            if expanded.contains(row.node.key()) {
                stack.extend(children.iter().rev().map(|node| FlatRow {
                    node,
                    depth: row.depth + 1,
                }));
            }
        }
    }
    out
}

/// 深度优先查找第一个键匹配的节点，与展开状态无关
pub fn find_item_in_tree<'a, T: TreeItem>(key: &str, nodes: &'a [T]) -> Option<&'a T> {
    let mut stack: Vec<&'a T> = nodes.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.key() == key {
            return Some(node);
        }
        if let Some(children) = node.children() {
            stack.extend(children.iter().rev());
        }
    }
    None
}

/// 树中节点总数
pub fn count_nodes<T: TreeItem>(nodes: &[T]) -> usize {
    let mut count = 0;
    let mut stack: Vec<&T> = nodes.iter().collect();
    while let Some(node) = stack.pop() {
        count += 1;
        if let Some(children) = node.children() {
            stack.extend(children.iter());
        }
    }
    count
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub label: String,
    pub value: String,
}

/// `a/b/c` → `a`、`a/b`、`a/b/c` 三段；空段（如开头的 `/`）跳过，
/// `value` 是原始路径截至该段的前缀，开头的 `/` 会保留在前缀里
pub fn to_breadcrumbs(path: &str) -> Vec<Breadcrumb> {
    let mut crumbs = Vec::new();
    let mut offset = 0;
    for segment in path.split('/') {
        let end = offset + segment.len();
        if !segment.is_empty() {
            crumbs.push(Breadcrumb {
                label: segment.to_string(),
                value: path[..end].to_string(),
            });
        }
        offset = end + 1;
    }
    crumbs
}

/// 父路径：最后一个 `/` 之前的部分；没有 `/` 时为空串（根级）
pub fn get_parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// 拼接目录与名称；根目录（空串）下直接使用名称
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// 展开状态集合（按节点路径）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedNodes(HashSet<String>);

impl ExpandedNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand(&mut self, key: &str) {
        self.0.insert(key.to_string());
    }

    pub fn collapse(&mut self, key: &str) {
        self.0.remove(key);
    }

    /// 切换后返回新的展开状态
    pub fn toggle(&mut self, key: &str) -> bool {
        if self.0.remove(key) {
            false
        } else {
            self.0.insert(key.to_string());
            true
        }
    }

    pub fn is_expanded(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn expand_all<T: TreeItem>(&mut self, nodes: &[T]) {
        self.0.extend(get_expandable_ids(nodes));
    }

    pub fn collapse_all(&mut self) {
        self.0.clear();
    }

    /// 展开 `path` 的所有祖先目录，使该节点在扁平列表中可见
    pub fn reveal(&mut self, path: &str) {
        let mut parent = get_parent(path);
        while !parent.is_empty() {
            self.0.insert(parent.to_string());
            parent = get_parent(parent);
        }
    }

    /// 丢弃树中已不存在的键
    pub fn retain_existing<T: TreeItem>(&mut self, nodes: &[T]) {
        let existing = get_expandable_ids(nodes);
        self.0.retain(|key| existing.contains(key));
    }

    pub fn as_set(&self) -> &HashSet<String> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
