//! 文件列表的行视图：扁平化结果 → 虚拟列表一行所需的全部展示字段

use serde::Serialize;

use crate::model::explorer::ExplorerState;
use crate::model::tree::{ExpandedNodes, FileCategory, FileEntry, FlatRow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    /// 节点路径（唯一键）
    pub path: String,
    pub name: String,
    pub category: FileCategory,
    /// 缩进层级
    pub depth: usize,
    /// 带 `children` 字段即可展开（哪怕为空）
    pub expandable: bool,
    pub expanded: bool,
    /// 已加载的子节点数
    pub children: usize,
    /// 大小或上传进度的简短描述
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
}

impl RowView {
    pub fn from_row(row: FlatRow<'_, FileEntry>, expanded: &ExpandedNodes) -> Self {
        let node = row.node;
        let detail = match node.progress {
            Some(p) => format!("上传中 {:.0}%", p),
            None if node.is_dir => match &node.children {
                Some(children) => format!("{} 项", children.len()),
                None => String::new(),
            },
            None => format_size(node.size),
        };
        Self {
            path: node.path.clone(),
            name: node.name.clone(),
            category: node.category,
            depth: row.depth,
            expandable: node.children.is_some(),
            expanded: expanded.is_expanded(&node.path),
            children: node.children.as_ref().map_or(0, Vec::len),
            detail,
            progress: node.progress,
        }
    }
}

/// 当前可见的全部行，顺序即渲染顺序
pub fn visible_row_views(state: &ExplorerState) -> Vec<RowView> {
    state
        .visible_rows()
        .into_iter()
        .map(|row| RowView::from_row(row, state.expanded()))
        .collect()
}

/// 1024 进制，保留一位小数
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::listing::ListingResponse;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_row_views() {
        let mut state = ExplorerState::default();
        state.apply_listing(ListingResponse {
            data: vec![
                FileEntry::directory("cfg", Some(vec![FileEntry::file("cfg/a.json", 2048)])),
                FileEntry::directory("lazy", None),
            ],
            dir: None,
            root_dir: String::new(),
        });
        state.toggle("cfg");
        let key = state.start_upload("b.bin", 10, "cfg");
        assert!(state.update_upload_progress(&key, 42.4));

        let rows = visible_row_views(&state);
        let summary: Vec<(&str, usize, &str)> = rows
            .iter()
            .map(|r| (r.path.as_str(), r.depth, r.detail.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("cfg", 0, "2 项"),
                ("cfg/b.bin", 1, "上传中 42%"),
                ("cfg/a.json", 1, "2.0 KB"),
                ("lazy", 0, ""),
            ]
        );
        assert!(rows[0].expandable && rows[0].expanded);
        assert!(!rows[3].expandable, "未加载子节点的目录不可展开");
        assert_eq!(rows[1].progress, Some(42.4));
    }
}
