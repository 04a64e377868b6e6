//! 模型文档：按路径读写 + 分支选择侧表
//!
//! 路径以段序列表示，对外转换为 RFC 9535 规范化 JSONPath（`$['a'][0]`），
//! 通过 jsonpath-rust 的 `reference`/`reference_mut` 精确寻址。
//! 联合字段选中的分支不再写进模型本身，而是按路径记录在 `BranchSelections` 中。

use std::collections::HashMap;
use std::fmt;

use jsonpath_rust::query::queryable::Queryable;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::model::error::PanelError;

/// 旧格式中嵌在对象里的分支选择键
pub const OPTION_SELECTED_KEY: &str = "_optionSelected";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// 模型中的字段路径（根为空路径）
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// 解析 `a.b.0.c` 形式；纯数字段视为数组下标
    pub fn parse_dotted(raw: &str) -> Self {
        Self(
            raw.split('.')
                .filter(|s| !s.is_empty())
                .map(|s| match s.parse::<usize>() {
                    Ok(i) => PathSegment::Index(i),
                    Err(_) => PathSegment::Key(s.to_string()),
                })
                .collect(),
        )
    }

    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.to_string()));
        Self(segments)
    }

    pub fn index(&self, i: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(i));
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// 规范化 JSONPath：`$['motors'][0]['pin']`
    pub fn to_json_path(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.0 {
            match segment {
                PathSegment::Key(k) => {
                    out.push_str("['");
                    out.push_str(&k.replace('\\', "\\\\").replace('\'', "\\'"));
                    out.push_str("']");
                }
                PathSegment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|s| match s {
                PathSegment::Key(k) => k.clone(),
                PathSegment::Index(i) => i.to_string(),
            })
            .collect();
        write!(f, "{}", parts.join("."))
    }
}

/// 序列化为点分形式，与 `parse_dotted` 对应
impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 按路径读取
pub fn get_value<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    if path.is_root() {
        return Some(root);
    }
    root.reference(path.to_json_path())
}

pub fn get_value_mut<'a>(root: &'a mut Value, path: &FieldPath) -> Option<&'a mut Value> {
    if path.is_root() {
        return Some(root);
    }
    root.reference_mut(path.to_json_path())
}

/// 按路径写入：父节点必须存在；对象缺失的键会被创建，数组允许在末尾追加
pub fn set_value(root: &mut Value, path: &FieldPath, value: Value) -> Result<(), PanelError> {
    let (Some(parent_path), Some(last)) = (path.parent(), path.last()) else {
        *root = value;
        return Ok(());
    };
    let parent = get_value_mut(root, &parent_path)
        .ok_or_else(|| PanelError::Path(format!("父路径不存在: {}", parent_path.to_json_path())))?;
    match (parent, last) {
        (Value::Object(map), PathSegment::Key(key)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (Value::Array(list), PathSegment::Index(i)) if *i < list.len() => {
            list[*i] = value;
            Ok(())
        }
        (Value::Array(list), PathSegment::Index(i)) if *i == list.len() => {
            list.push(value);
            Ok(())
        }
        _ => Err(PanelError::Path(format!("路径不可更新: {}", path.to_json_path()))),
    }
}

/// 按路径删除并返回被删除的值；对象删除保持其余键的顺序
pub fn remove_value(root: &mut Value, path: &FieldPath) -> Option<Value> {
    let parent = get_value_mut(root, &path.parent()?)?;
    match (parent, path.last()?) {
        (Value::Object(map), PathSegment::Key(key)) => map.shift_remove(key),
        (Value::Array(list), PathSegment::Index(i)) if *i < list.len() => Some(list.remove(*i)),
        _ => None,
    }
}

/// 联合字段的分支选择侧表（路径 → 分支下标）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchSelections {
    by_path: HashMap<FieldPath, usize>,
}

impl BranchSelections {
    pub fn get(&self, path: &FieldPath) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    pub fn set(&mut self, path: FieldPath, index: usize) {
        self.by_path.insert(path, index);
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// 清除 `path` 以下（不含自身）的所有记录，分支切换后子树已被重建
    pub fn clear_below(&mut self, path: &FieldPath) {
        self.by_path
            .retain(|p, _| !(p.starts_with(path) && p.segments().len() > path.segments().len()));
    }

    /// 删除数组元素后，同一数组中后续元素的记录下标前移
    pub fn remove_index(&mut self, list_path: &FieldPath, removed: usize) {
        let depth = list_path.segments().len();
        let old = std::mem::take(&mut self.by_path);
        for (path, option) in old {
            if !path.starts_with(list_path) || path.segments().len() <= depth {
                self.by_path.insert(path, option);
                continue;
            }
            match path.segments()[depth] {
                PathSegment::Index(i) if i == removed => {}
                PathSegment::Index(i) if i > removed => {
                    let mut segments = path.segments().to_vec();
                    segments[depth] = PathSegment::Index(i - 1);
                    self.by_path.insert(FieldPath::from_segments(segments), option);
                }
                _ => {
                    self.by_path.insert(path, option);
                }
            }
        }
    }

    /// 把模型中旧格式的 `_optionSelected` 提到侧表中，并从模型里删除
    pub fn extract_from(model: &mut Value) -> Self {
        let mut selections = Self::default();
        let mut stack: Vec<(FieldPath, &mut Value)> = vec![(FieldPath::root(), model)];
        while let Some((path, value)) = stack.pop() {
            match value {
                Value::Object(map) => {
                    if let Some(raw) = map.shift_remove(OPTION_SELECTED_KEY) {
                        match raw.as_u64() {
                            Some(index) => selections.set(path.clone(), index as usize),
                            None => tracing::warn!("忽略非法的分支选择 {}: {}", path, raw),
                        }
                    }
                    for (key, child) in map.iter_mut() {
                        stack.push((path.child(key), child));
                    }
                }
                Value::Array(list) => {
                    for (i, child) in list.iter_mut().enumerate() {
                        stack.push((path.index(i), child));
                    }
                }
                _ => {}
            }
        }
        selections
    }

    /// 按旧格式把选择写回模型（仅写入对象节点）
    pub fn embed_into(&self, model: &mut Value) {
        for (path, option) in &self.by_path {
            if let Some(Value::Object(map)) = get_value_mut(model, path) {
                map.insert(OPTION_SELECTED_KEY.to_string(), Value::from(*option as u64));
            }
        }
    }
}
