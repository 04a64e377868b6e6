//! 性能基准模块
//!
//! 覆盖热路径：大目录树的扁平化、上传行合并、整表单校验。
//! 深层目录树用于确认遍历不依赖调用栈深度。

use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::model::schema::SchemaDefs;
use crate::model::tree::{count_nodes, flatten_expanded_tree, get_expandable_ids, FileEntry};
use crate::model::upload::{merge_rows, uploading_file_to_row, UploadingFile, UploadingMap};
use crate::model::validation::validate_all;

/// 性能测试结果
#[derive(Debug, Serialize)]
pub struct PerformanceResult {
    pub operation: String,
    pub duration_ms: u128,
    pub success: bool,
    pub details: String,
}

impl PerformanceResult {
    pub fn new(operation: &str, duration_ms: u128, success: bool, details: &str) -> Self {
        Self {
            operation: operation.to_string(),
            duration_ms,
            success,
            details: details.to_string(),
        }
    }
}

/// 单链深层目录：`d0/d1/.../d{depth-1}/leaf.txt`，自底向上构建
pub fn generate_deep_tree(depth: usize) -> Vec<FileEntry> {
    let mut prefix = String::new();
    let mut paths = Vec::with_capacity(depth);
    for level in 0..depth {
        if level > 0 {
            prefix.push('/');
        }
        prefix.push_str(&format!("d{}", level));
        paths.push(prefix.clone());
    }

    let leaf_path = match paths.last() {
        Some(last) => format!("{}/leaf.txt", last),
        None => "leaf.txt".to_string(),
    };
    let mut level_nodes = vec![FileEntry::file(&leaf_path, 1)];
    for path in paths.iter().rev() {
        level_nodes = vec![FileEntry::directory(path, Some(level_nodes))];
    }
    level_nodes
}

/// 宽目录树：`dirs` 个目录，每个含 `files_per_dir` 个文件
pub fn generate_wide_tree(dirs: usize, files_per_dir: usize) -> Vec<FileEntry> {
    (0..dirs)
        .map(|d| {
            let dir = format!("dir_{}", d);
            let files = (0..files_per_dir)
                .map(|f| FileEntry::file(&format!("{}/file_{}.txt", dir, f), f as u64))
                .collect();
            FileEntry::directory(&dir, Some(files))
        })
        .collect()
}

/// 含 `count` 个对象元素的表单 schema 与模型，每个元素带范围约束
pub fn generate_large_form(count: usize) -> (Value, Value) {
    let schema = json!({
        "type": "object",
        "properties": {
            "channels": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "gain": {"type": "number", "minimum": 0, "maximum": 10},
                        "address": {"type": "hex"}
                    }
                }
            }
        }
    });
    let channels: Vec<Value> = (0..count)
        .map(|i| {
            let mut obj = Map::new();
            obj.insert("name".into(), json!(format!("通道_{}", i)));
            obj.insert("gain".into(), json!((i % 12) as f64));
            obj.insert("address".into(), json!(format!("0x{:x}", i)));
            Value::Object(obj)
        })
        .collect();
    (schema, json!({ "channels": channels }))
}

/// 全部展开后扁平化
pub fn benchmark_flatten(tree: &[FileEntry]) -> PerformanceResult {
    let start = Instant::now();
    let expanded = get_expandable_ids(tree);
    let rows = flatten_expanded_tree(tree, &expanded);
    let duration = start.elapsed();

    let total = count_nodes(tree);
    PerformanceResult::new(
        "目录树扁平化",
        duration.as_millis(),
        rows.len() == total,
        &format!("扁平化了 {} 行（共 {} 个节点）", rows.len(), total),
    )
}

/// 向每个目录注入一个上传行后合并
pub fn benchmark_merge(tree: &[FileEntry]) -> PerformanceResult {
    let uploading: UploadingMap = tree
        .iter()
        .filter(|e| e.is_dir)
        .map(|dir| {
            let row = uploading_file_to_row(&UploadingFile {
                name: "upload.bin".to_string(),
                size: 1,
                progress: 50.0,
                dir: dir.path.clone(),
            });
            (row.path.clone(), row)
        })
        .collect();

    let start = Instant::now();
    let merged = merge_rows(tree, "", &uploading);
    let duration = start.elapsed();

    let added = count_nodes(&merged) - count_nodes(tree);
    PerformanceResult::new(
        "上传行合并",
        duration.as_millis(),
        added == uploading.len(),
        &format!("注入了 {} 个上传行", added),
    )
}

/// 整表单校验；`expect_errors` 为预期的错误条数
pub fn benchmark_validation(schema: &Value, model: &Value, expect_errors: usize) -> PerformanceResult {
    let defs = SchemaDefs::from_schema(schema);
    let start = Instant::now();
    let errors = validate_all(schema, model, &defs);
    let duration = start.elapsed();

    let found = errors.as_ref().map_or(0, |e| e.count());
    PerformanceResult::new(
        "表单校验",
        duration.as_millis(),
        found == expect_errors,
        &format!("发现 {} 条错误", found),
    )
}

/// 运行综合性能测试
pub fn run_performance_suite() -> Vec<PerformanceResult> {
    let mut results = Vec::new();

    for (dirs, files) in [(10, 100), (100, 100), (300, 300)] {
        tracing::info!("测试规模：{} 个目录，每个 {} 个文件", dirs, files);
        let tree = generate_wide_tree(dirs, files);
        results.push(benchmark_flatten(&tree));
        results.push(benchmark_merge(&tree));
    }

    let deep = generate_deep_tree(1_000);
    results.push(benchmark_flatten(&deep));

    for count in [100, 1_000, 10_000] {
        let (schema, model) = generate_large_form(count);
        // gain 取 i % 12，其中 11 超出上限
        let over_limit = (0..count).filter(|i| i % 12 == 11).count();
        results.push(benchmark_validation(&schema, &model, over_limit));
    }

    for r in &results {
        tracing::info!("{}: {}ms ({})", r.operation, r.duration_ms, r.details);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_trees() {
        let deep = generate_deep_tree(3);
        assert_eq!(count_nodes(&deep), 4);
        assert_eq!(deep[0].path, "d0");
        let expanded = get_expandable_ids(&deep);
        let rows = flatten_expanded_tree(&deep, &expanded);
        assert_eq!(rows[3].node.path, "d0/d1/d2/leaf.txt");
        assert_eq!(rows[3].depth, 3);

        let wide = generate_wide_tree(4, 5);
        assert_eq!(count_nodes(&wide), 24);
    }

    #[test]
    fn test_deep_tree_traversal() {
        let deep = generate_deep_tree(1_000);
        let result = benchmark_flatten(&deep);
        assert!(result.success, "{}", result.details);
        assert!(result.duration_ms < 1000); // 应该在1秒内完成
    }

    #[test]
    fn test_performance_benchmarks() {
        let tree = generate_wide_tree(20, 50);
        let flatten = benchmark_flatten(&tree);
        assert!(flatten.success);
        assert!(flatten.duration_ms < 1000);

        let merge = benchmark_merge(&tree);
        assert!(merge.success, "{}", merge.details);

        let (schema, model) = generate_large_form(24);
        let validation = benchmark_validation(&schema, &model, 2);
        assert!(validation.success, "{}", validation.details);
    }
}
