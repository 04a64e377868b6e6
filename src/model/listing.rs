//! 目录列表请求/响应的边界类型
//!
//! HTTP 传输由外部负责，这里只描述报文形状，方便视图层与文件加载共用。

use serde::{Deserialize, Serialize};

use crate::model::tree::FileEntry;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeFilter {
    pub match_mode: String,
    #[serde(default)]
    pub value: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFilters {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<TypeFilter>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// 列表请求：`dir` 与 `root_dir` 二选一
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<ListingFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<Ordering>,
}

impl ListingRequest {
    pub fn for_dir(dir: &str) -> Self {
        Self {
            dir: Some(dir.to_string()),
            ..Self::default()
        }
    }

    pub fn for_root(root_dir: &str) -> Self {
        Self {
            root_dir: Some(root_dir.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingResponse {
    #[serde(default)]
    pub data: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default)]
    pub root_dir: String,
}

impl ListingResponse {
    /// 本次列表所在目录：有 `dir` 用 `dir`，否则是根目录
    pub fn current_dir(&self) -> &str {
        self.dir.as_deref().unwrap_or(&self.root_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let mut request = ListingRequest::for_dir("media");
        request.search = Some(SearchQuery {
            value: "cam".into(),
            field: Some("name".into()),
        });
        request.filters = Some(ListingFilters {
            file_type: Some(TypeFilter {
                match_mode: "in".into(),
                value: vec!["image".into()],
            }),
        });
        request.ordering = Some(Ordering {
            field: "modified".into(),
            direction: SortDirection::Desc,
        });

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "dir": "media",
                "search": {"value": "cam", "field": "name"},
                "filters": {"type": {"match_mode": "in", "value": ["image"]}},
                "ordering": {"field": "modified", "direction": "desc"}
            })
        );
        assert_eq!(
            serde_json::to_value(ListingRequest::for_root("/data")).unwrap(),
            json!({"root_dir": "/data"})
        );
    }

    #[test]
    fn test_response_variants() {
        let with_dir: ListingResponse = serde_json::from_value(json!({
            "data": [{"path": "/data/a", "name": "a", "type": "directory", "is_dir": true, "children": []}],
            "dir": "/data",
            "root_dir": "/data"
        }))
        .expect("带 dir 的响应应该可解析");
        assert_eq!(with_dir.current_dir(), "/data");
        assert_eq!(with_dir.data[0].children, Some(vec![]));

        let root_only: ListingResponse =
            serde_json::from_value(json!({"data": [], "root_dir": "/srv"})).expect("只带 root_dir 的响应应该可解析");
        assert_eq!(root_only.current_dir(), "/srv");
    }
}
