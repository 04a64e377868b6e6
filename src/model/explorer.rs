//! ExplorerState：文件浏览器的状态与派生视图
//!
//! 服务端列表 + 上传中的乐观行 → 合并树 → 按展开集合扁平化为渲染行。

use std::path::Path;

use crate::model::error::PanelError;
use crate::model::listing::ListingResponse;
use crate::model::tree::{
    find_item_in_tree, flatten_expanded_tree, get_parent, to_breadcrumbs, Breadcrumb, ExpandedNodes,
    FileEntry, FlatRow,
};
use crate::model::upload::{merge_rows, plan_move, uploading_file_to_row, MoveError, UploadingFile, UploadingMap};
use crate::utils::fs::read_typed;

#[derive(Debug, Clone, Default)]
pub struct ExplorerState {
    root_dir: String,
    dir: String,
    canonical: Vec<FileEntry>,
    uploading: UploadingMap,
    expanded: ExpandedNodes,
    selected: Option<String>,
    merged: Vec<FileEntry>,
}

impl ExplorerState {
    /// 从保存的列表响应文件加载
    pub fn load_listing_file(&mut self, p: &Path) -> Result<(), PanelError> {
        let response: ListingResponse = read_typed(p)?;
        self.apply_listing(response);
        Ok(())
    }

    /// 应用一次（重新）拉取的列表
    ///
    /// 已在服务端列表中出现的上传条目被移除；展开集合中消失的目录被丢弃，
    /// 选中节点的祖先目录重新展开。
    pub fn apply_listing(&mut self, response: ListingResponse) {
        self.dir = response.current_dir().to_string();
        self.root_dir = response.root_dir;
        self.canonical = response.data;

        let canonical = &self.canonical;
        let before = self.uploading.len();
        self.uploading
            .retain(|path, _| find_item_in_tree(path, canonical).is_none());
        let graduated = before - self.uploading.len();

        self.expanded.retain_existing(&self.canonical);
        if let Some(selected) = &self.selected {
            self.expanded.reveal(selected);
        }
        self.rebuild();
        tracing::info!(
            "列表已更新: 目录 {}，{} 个条目，{} 个上传完成转正",
            self.dir,
            self.canonical.len(),
            graduated
        );
    }

    fn rebuild(&mut self) {
        self.merged = merge_rows(&self.canonical, &self.dir, &self.uploading);
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    pub fn current_dir(&self) -> &str {
        &self.dir
    }

    /// 合并后的树
    pub fn tree(&self) -> &[FileEntry] {
        &self.merged
    }

    pub fn expanded(&self) -> &ExpandedNodes {
        &self.expanded
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn uploading(&self) -> &UploadingMap {
        &self.uploading
    }

    /// 虚拟列表要渲染的行
    pub fn visible_rows(&self) -> Vec<FlatRow<'_, FileEntry>> {
        flatten_expanded_tree(&self.merged, self.expanded.as_set())
    }

    pub fn find(&self, path: &str) -> Option<&FileEntry> {
        find_item_in_tree(path, &self.merged)
    }

    pub fn toggle(&mut self, path: &str) -> bool {
        let expanded = self.expanded.toggle(path);
        tracing::debug!("节点{}: {}", if expanded { "展开" } else { "折叠" }, path);
        expanded
    }

    /// 展开目录；已展开时保持不变
    pub fn expand(&mut self, path: &str) {
        self.expanded.expand(path);
    }

    pub fn expand_all(&mut self) {
        self.expanded.expand_all(&self.merged);
    }

    pub fn collapse_all(&mut self) {
        self.expanded.collapse_all();
    }

    /// 选中节点并展开其祖先
    pub fn select(&mut self, path: &str) {
        self.expanded.reveal(path);
        self.selected = Some(path.to_string());
    }

    /// 当前选中节点（没有时为当前目录）的面包屑
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let path = match self.selected.as_deref().and_then(|p| self.find(p)) {
            Some(entry) if entry.is_dir => entry.path.as_str(),
            Some(entry) => get_parent(&entry.path),
            None => self.dir.as_str(),
        };
        to_breadcrumbs(path)
    }

    /// 开始上传：插入进度为 0 的乐观行，返回其路径键
    pub fn start_upload(&mut self, name: &str, size: u64, dir: &str) -> String {
        let row = uploading_file_to_row(&UploadingFile {
            name: name.to_string(),
            size,
            progress: 0.0,
            dir: dir.to_string(),
        });
        let key = row.path.clone();
        self.uploading.insert(key.clone(), row);
        self.expanded.reveal(&key);
        self.rebuild();
        tracing::info!("开始上传: {}", key);
        key
    }

    /// 更新上传进度；条目已不存在（完成或取消）时返回 false
    pub fn update_upload_progress(&mut self, key: &str, progress: f32) -> bool {
        let Some(row) = self.uploading.get_mut(key) else {
            return false;
        };
        row.progress = Some(progress.clamp(0.0, 100.0));
        self.rebuild();
        true
    }

    /// 上传结束（成功）：移除乐观行，等待下一次列表拉取展示服务端条目
    pub fn finish_upload(&mut self, key: &str) -> bool {
        let removed = self.uploading.shift_remove(key).is_some();
        if removed {
            self.rebuild();
            tracing::info!("上传完成: {}", key);
        }
        removed
    }

    pub fn cancel_upload(&mut self, key: &str) -> bool {
        let removed = self.uploading.shift_remove(key).is_some();
        if removed {
            self.rebuild();
            tracing::warn!("上传已取消: {}", key);
        }
        removed
    }

    /// 拖拽移动的目标路径
    pub fn plan_move(&self, source: &str, target_dir: &str) -> Result<String, MoveError> {
        plan_move(&self.merged, source, target_dir)
    }
}
