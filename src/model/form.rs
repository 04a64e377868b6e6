//! FormSession：一次表单会话的 schema、模型与分支选择
//!
//! schema 在会话内只读；所有修改都落在模型上，联合字段的选择记录在侧表中。

use std::path::Path;

use serde_json::Value;

use crate::model::defaults::{carry_shared, fill_defaults, fresh_value, resolve_new_list_item};
use crate::model::document::{
    get_value, get_value_mut, remove_value, set_value, BranchSelections, FieldPath, PathSegment,
};
use crate::model::error::PanelError;
use crate::model::schema::{
    alternatives, is_null_branch, items, properties, resolve_ref_recursive, resolved, schema_type,
    SchemaDefs,
};
use crate::model::union::{choose_branch, type_matches};
use crate::model::validation::{validate_with_selections, ErrorTree};
use crate::utils::fs::{read_json_file, write_json_file};

#[derive(Debug, Clone)]
pub struct FormSession {
    schema: Value,
    defs: SchemaDefs,
    model: Value,
    selections: BranchSelections,
    errors: Option<ErrorTree>,
}

impl FormSession {
    /// 模型中旧格式的 `_optionSelected` 会被移入侧表
    pub fn new(schema: Value, mut model: Value) -> Self {
        let defs = SchemaDefs::from_schema(&schema);
        let selections = BranchSelections::extract_from(&mut model);
        tracing::debug!("表单会话: {} 个定义，{} 个已选分支", defs.len(), selections.len());
        Self {
            schema,
            defs,
            model,
            selections,
            errors: None,
        }
    }

    /// 从文件加载 schema 与模型
    pub fn load_files(schema_path: &Path, model_path: &Path) -> Result<Self, PanelError> {
        let schema = read_json_file(schema_path)?;
        let model = read_json_file(model_path)?;
        tracing::info!(
            "表单已加载: schema={} model={}",
            schema_path.display(),
            model_path.display()
        );
        Ok(Self::new(schema, model))
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn defs(&self) -> &SchemaDefs {
        &self.defs
    }

    pub fn model(&self) -> &Value {
        &self.model
    }

    pub fn selections(&self) -> &BranchSelections {
        &self.selections
    }

    /// 最近一次校验的结果
    pub fn errors(&self) -> Option<&ErrorTree> {
        self.errors.as_ref()
    }

    pub fn get_value(&self, path: &FieldPath) -> Option<&Value> {
        get_value(&self.model, path)
    }

    pub fn set_value(&mut self, path: &FieldPath, value: Value) -> Result<(), PanelError> {
        set_value(&mut self.model, path, value)
    }

    /// 联合节点落到当前分支；非联合原样返回
    fn settle<'a>(&'a self, node: &'a Value, path: &FieldPath) -> &'a Value {
        let data = self.get_value(path).unwrap_or(&Value::Null);
        choose_branch(node, data, path, &self.defs, &self.selections)
            .map(|(_, branch)| branch)
            .unwrap_or(node)
    }

    /// `path` 处声明的 schema（浅解析引用；联合字段返回联合节点本身）
    pub fn schema_at(&self, path: &FieldPath) -> Option<&Value> {
        let mut node = resolved(&self.schema, &self.defs);
        let mut prefix = FieldPath::root();
        for segment in path.segments() {
            let container = self.settle(node, &prefix);
            node = match segment {
                PathSegment::Key(key) => {
                    prefix = prefix.child(key);
                    resolved(properties(container)?.get(key)?, &self.defs)
                }
                PathSegment::Index(i) => {
                    prefix = prefix.index(*i);
                    resolved(items(container)?, &self.defs)
                }
            };
        }
        Some(node)
    }

    /// 联合字段当前生效的分支（显式选择优先，否则推断）
    pub fn selected_branch(&self, path: &FieldPath) -> Option<usize> {
        let node = self.schema_at(path)?;
        let data = self.get_value(path).unwrap_or(&Value::Null);
        choose_branch(node, data, path, &self.defs, &self.selections).map(|(index, _)| index)
    }

    /// 切换联合字段的分支：记录选择，并按新分支重建该字段的值
    pub fn select_branch(&mut self, path: &FieldPath, index: usize) -> Result<(), PanelError> {
        let branch = {
            let node = self
                .schema_at(path)
                .ok_or_else(|| PanelError::Schema(format!("路径没有对应的 schema: {}", path)))?;
            let alts = alternatives(node)
                .ok_or_else(|| PanelError::Schema(format!("字段不是联合类型: {}", path)))?;
            let alt = alts
                .get(index)
                .ok_or_else(|| PanelError::Schema(format!("分支下标越界: {} ({} 个分支)", index, alts.len())))?;
            resolve_ref_recursive(alt, &self.defs)
        };

        let current = self.get_value(path).cloned().unwrap_or(Value::Null);
        let next = if properties(&branch).is_some() {
            let mut value = carry_shared(&current, &branch);
            fill_defaults(&mut value, &branch);
            value
        } else if is_null_branch(&branch, &self.defs) {
            Value::Null
        } else if !current.is_null() && schema_type(&branch).is_some_and(|ty| type_matches(ty, &current)) {
            current
        } else {
            fresh_value(&branch)
        };

        set_value(&mut self.model, path, next)?;
        self.selections.clear_below(path);
        self.selections.set(path.clone(), index);
        tracing::info!("字段 {} 切换到分支 {}", path, index);
        Ok(())
    }

    /// 向数组字段追加新元素，返回新元素下标
    pub fn append_item(&mut self, list_path: &FieldPath, option: Option<usize>) -> Result<usize, PanelError> {
        let items_schema = {
            let node = self
                .schema_at(list_path)
                .ok_or_else(|| PanelError::Schema(format!("路径没有对应的 schema: {}", list_path)))?;
            items(self.settle(node, list_path))
                .cloned()
                .ok_or_else(|| PanelError::Schema(format!("字段不是数组: {}", list_path)))?
        };
        let item = resolve_new_list_item(&items_schema, &self.defs, option);

        if self.get_value(list_path).map_or(true, Value::is_null) {
            set_value(&mut self.model, list_path, Value::Array(Vec::new()))?;
        }
        let list = get_value_mut(&mut self.model, list_path)
            .and_then(Value::as_array_mut)
            .ok_or_else(|| PanelError::Path(format!("模型中的值不是数组: {}", list_path)))?;
        let index = list.len();
        list.push(item.value);

        if let Some(option) = item.option {
            self.selections.set(list_path.index(index), option);
        }
        tracing::debug!("数组 {} 追加元素 #{}", list_path, index);
        Ok(index)
    }

    /// 删除数组元素，后续元素的分支选择随之前移
    pub fn remove_item(&mut self, list_path: &FieldPath, index: usize) -> Result<Value, PanelError> {
        let removed = remove_value(&mut self.model, &list_path.index(index))
            .ok_or_else(|| PanelError::Path(format!("数组元素不存在: {}.{}", list_path, index)))?;
        self.selections.remove_index(list_path, index);
        Ok(removed)
    }

    /// 按根 schema 就地补齐缺失字段（已有值保留，会剪掉未声明的字段）
    pub fn apply_defaults(&mut self) {
        let root = resolve_ref_recursive(&self.schema, &self.defs);
        fill_defaults(&mut self.model, &root);
    }

    /// 整树校验并缓存结果
    pub fn validate(&mut self) -> Option<&ErrorTree> {
        self.errors = validate_with_selections(&self.schema, &self.model, &self.defs, &self.selections);
        match &self.errors {
            Some(tree) => tracing::info!("校验完成: {} 处错误", tree.count()),
            None => tracing::info!("校验通过"),
        }
        self.errors.as_ref()
    }

    /// 导出模型；分支选择以旧格式的 `_optionSelected` 嵌回
    pub fn export_model(&self) -> Value {
        let mut model = self.model.clone();
        self.selections.embed_into(&mut model);
        model
    }

    pub fn save_model(&self, path: &Path) -> Result<(), PanelError> {
        write_json_file(path, &self.export_model())?;
        tracing::info!("模型已保存到: {}", path.display());
        Ok(())
    }
}
