//! 字段计划：按 schema 形状决定每个字段用哪种编辑器
//!
//! 对 `(schema, model, path)` 递归求出一棵 `FieldPlan`，视图层按 `FieldView`
//! 的标签分派到具体控件。分派顺序：引用 → 对象 → 数组 → 枚举 → 基础类型 → 联合。

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::model::document::{get_value, BranchSelections, FieldPath};
use crate::model::form::FormSession;
use crate::model::schema::{
    alternatives, def_name, description, enum_values, field_label, is_null_branch, items, map_enum_options,
    properties, ref_target, required_keys, resolved, schema_type, title, title_case, EnumOption, SchemaDefs,
    SchemaType,
};
use crate::model::union::{choose_branch, values_equal};
use crate::model::validation::ErrorTree;

/// 基础类型字段的编辑器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Integer,
    Toggle,
    Hex,
    StringOrNumber,
    Pin,
}

impl FieldKind {
    /// `null`、`object`、`array` 没有对应的编辑器
    pub fn for_type(ty: SchemaType) -> Option<Self> {
        match ty {
            SchemaType::String => Some(Self::Text),
            SchemaType::Number => Some(Self::Number),
            SchemaType::Integer => Some(Self::Integer),
            SchemaType::Boolean => Some(Self::Toggle),
            SchemaType::Hex => Some(Self::Hex),
            SchemaType::StringOrNumber => Some(Self::StringOrNumber),
            SchemaType::Pin => Some(Self::Pin),
            SchemaType::Object | SchemaType::Array | SchemaType::Null => None,
        }
    }
}

/// 联合选择器中的一项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchOption {
    pub index: usize,
    pub label: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum FieldView {
    /// 每个声明的属性一个子字段，按声明顺序
    Object { fields: Vec<FieldPlan> },
    /// 模型中每个元素一项；`add_options` 为追加按钮可选的分支（元素不是联合时为空）
    List {
        items: Vec<FieldPlan>,
        add_options: Vec<BranchOption>,
    },
    Choice {
        options: Vec<EnumOption>,
        selected: Option<usize>,
    },
    Primitive { kind: FieldKind, value: Value },
    Union {
        options: Vec<BranchOption>,
        selected: usize,
        show_selector: bool,
        branch: Box<FieldPlan>,
    },
    /// `const` 字段，只读展示
    Constant { value: Value },
    /// 选中了 null 分支，或 schema 本身就是 `type: "null"`
    Empty,
    Unsupported { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPlan {
    pub path: FieldPath,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    /// 最近一次校验落在该字段上的消息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub view: FieldView,
}

impl FieldPlan {
    /// 以根 schema 为起点构建整棵计划
    pub fn build(
        schema: &Value,
        model: &Value,
        defs: &SchemaDefs,
        selections: &BranchSelections,
        errors: Option<&ErrorTree>,
    ) -> Self {
        let mut builder = PlanBuilder {
            model,
            defs,
            selections,
            errors,
            expanding: Vec::new(),
        };
        builder.build(schema, FieldPath::root(), "", false)
    }

    pub fn for_session(session: &FormSession) -> Self {
        Self::build(
            session.schema(),
            session.model(),
            session.defs(),
            session.selections(),
            session.errors(),
        )
    }

    /// 按路径查找子计划；联合字段返回选中分支的计划
    pub fn find(&self, path: &FieldPath) -> Option<&FieldPlan> {
        let mut stack = vec![self];
        while let Some(plan) = stack.pop() {
            if &plan.path == path {
                match &plan.view {
                    FieldView::Union { branch, .. } => stack.push(branch),
                    _ => return Some(plan),
                }
                continue;
            }
            if !path.starts_with(&plan.path) {
                continue;
            }
            match &plan.view {
                FieldView::Object { fields } => stack.extend(fields.iter()),
                FieldView::List { items, .. } => stack.extend(items.iter()),
                FieldView::Union { branch, .. } => stack.push(branch),
                _ => {}
            }
        }
        None
    }
}

struct PlanBuilder<'a> {
    model: &'a Value,
    defs: &'a SchemaDefs,
    selections: &'a BranchSelections,
    errors: Option<&'a ErrorTree>,
    /// 当前路径上正在展开的定义名
    expanding: Vec<String>,
}

impl<'a> PlanBuilder<'a> {
    fn build(&mut self, schema: &'a Value, path: FieldPath, key: &str, required: bool) -> FieldPlan {
        let data = get_value(self.model, &path);
        let def = ref_target(schema).and_then(def_name).map(str::to_string);

        // 自引用的定义只在模型里还有数据时继续展开
        if let Some(name) = &def {
            if self.expanding.contains(name) && data.map_or(true, Value::is_null) {
                tracing::debug!("字段 {} 的定义 {} 已在展开中，停止递归", path, name);
                return self.plan(
                    schema,
                    path,
                    key,
                    required,
                    FieldView::Unsupported {
                        reason: format!("递归引用: {}", name),
                    },
                );
            }
        }

        let pushed = def.is_some();
        if let Some(name) = def {
            self.expanding.push(name);
        }
        let node = resolved(schema, self.defs);
        let view = self.view(node, &path, key, required, data);
        if pushed {
            self.expanding.pop();
        }
        self.plan(node, path, key, required, view)
    }

    fn plan(&self, node: &Value, path: FieldPath, key: &str, required: bool, view: FieldView) -> FieldPlan {
        let error = self
            .errors
            .and_then(|tree| tree.at(&path))
            .and_then(ErrorTree::as_message)
            .map(str::to_string);
        FieldPlan {
            label: field_label(node, key),
            description: description(node).map(str::to_string),
            required,
            error,
            path,
            view,
        }
    }

    fn view(
        &mut self,
        node: &'a Value,
        path: &FieldPath,
        key: &str,
        required: bool,
        data: Option<&Value>,
    ) -> FieldView {
        if let Some(props) = properties(node) {
            let required_set: HashSet<&str> = required_keys(node).collect();
            let fields = props
                .iter()
                .map(|(name, child)| self.build(child, path.child(name), name, required_set.contains(name.as_str())))
                .collect();
            return FieldView::Object { fields };
        }

        if let (Some(SchemaType::Array), Some(item_schema)) = (schema_type(node), items(node)) {
            let len = data.and_then(Value::as_array).map_or(0, Vec::len);
            let items = (0..len)
                .map(|i| self.build(item_schema, path.index(i), &format!("{} {}", key, i + 1), false))
                .collect();
            let add_options = alternatives(resolved(item_schema, self.defs))
                .map(|alts| self.branch_options(alts))
                .unwrap_or_default()
                .into_iter()
                .filter(|o| !o.nullable)
                .collect();
            return FieldView::List { items, add_options };
        }

        if enum_values(node).is_some() {
            let options = map_enum_options(node);
            let selected = data.and_then(|d| options.iter().position(|o| values_equal(&o.value, d)));
            return FieldView::Choice { options, selected };
        }

        if let Some(kind) = schema_type(node).and_then(FieldKind::for_type) {
            return FieldView::Primitive {
                kind,
                value: data.cloned().unwrap_or(Value::Null),
            };
        }

        if let Some(alts) = alternatives(node) {
            let current = data.unwrap_or(&Value::Null);
            let Some((selected, branch_node)) = choose_branch(node, current, path, self.defs, self.selections)
            else {
                return FieldView::Unsupported {
                    reason: "联合没有可选分支".to_string(),
                };
            };
            let options = self.branch_options(alts);
            let show_selector = options.iter().filter(|o| !o.nullable).count() > 1;
            let branch = if is_null_branch(branch_node, self.defs) {
                self.plan(branch_node, path.clone(), key, required, FieldView::Empty)
            } else {
                self.build(&alts[selected], path.clone(), key, required)
            };
            return FieldView::Union {
                options,
                selected,
                show_selector,
                branch: Box::new(branch),
            };
        }

        if let Some(value) = node.get("const") {
            return FieldView::Constant { value: value.clone() };
        }

        if schema_type(node) == Some(SchemaType::Null) {
            return FieldView::Empty;
        }

        tracing::warn!("字段 {} 的 schema 没有可用的编辑器", path);
        FieldView::Unsupported {
            reason: match schema_type(node) {
                Some(ty) => format!("不支持的类型: {}", ty.as_str()),
                None => "缺少类型声明".to_string(),
            },
        }
    }

    fn branch_options(&self, alts: &[Value]) -> Vec<BranchOption> {
        alts.iter()
            .enumerate()
            .map(|(index, alt)| {
                let node = resolved(alt, self.defs);
                let nullable = is_null_branch(alt, self.defs);
                let label = if nullable {
                    "None".to_string()
                } else if let Some(t) = title(node) {
                    title_case(t)
                } else if let Some(name) = ref_target(alt).and_then(def_name) {
                    title_case(name)
                } else if let Some(ty) = schema_type(node) {
                    title_case(ty.as_str())
                } else {
                    format!("Option {}", index + 1)
                };
                BranchOption { index, label, nullable }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan_for(schema: &Value, model: &Value) -> FieldPlan {
        let defs = SchemaDefs::from_schema(schema);
        FieldPlan::build(schema, model, &defs, &BranchSelections::default(), None)
    }

    fn labels(fields: &[FieldPlan]) -> Vec<&str> {
        fields.iter().map(|f| f.label.as_str()).collect()
    }

    #[test]
    fn test_object_fields_follow_declaration_order() {
        let schema = json!({
            "type": "object",
            "required": ["wifi_ssid"],
            "properties": {
                "wifi_ssid": {"type": "string"},
                "maxSpeed": {"type": "number", "title": "top_speed"},
                "enabled": {"type": "boolean"},
                "mode": {"type": "string", "enum": ["auto", "manual"]}
            }
        });
        let plan = plan_for(&schema, &json!({"mode": "manual"}));

        let FieldView::Object { fields } = &plan.view else {
            panic!("根节点应为对象视图: {:?}", plan.view);
        };
        assert_eq!(labels(fields), vec!["Wifi Ssid", "Top Speed", "Enabled", "Mode"]);
        assert!(fields[0].required && !fields[1].required);
        assert_eq!(
            fields[0].view,
            FieldView::Primitive {
                kind: FieldKind::Text,
                value: Value::Null
            }
        );
        assert!(matches!(fields[2].view, FieldView::Primitive { kind: FieldKind::Toggle, .. }));
        assert!(matches!(fields[3].view, FieldView::Choice { selected: Some(1), .. }), "枚举优先于基础类型");
    }

    #[test]
    fn test_union_selector_visibility() {
        let schema = json!({
            "type": "object",
            "properties": {
                "camera": {"anyOf": [{"type": "string"}, {"type": "null"}]},
                "target": {"anyOf": [{"type": "integer"}, {"type": "string"}, {"type": "null"}]}
            }
        });
        let plan = plan_for(&schema, &json!({"camera": null, "target": "x"}));

        let camera = plan.find(&FieldPath::parse_dotted("camera")).expect("camera 应该存在");
        assert_eq!(camera.view, FieldView::Empty, "null 数据落到 null 分支");

        let FieldView::Object { fields } = &plan.view else {
            panic!("根节点应为对象视图");
        };
        match &fields[0].view {
            FieldView::Union { show_selector, selected, .. } => {
                assert!(!show_selector, "只有一个非 null 分支时不显示选择器");
                assert_eq!(*selected, 1);
            }
            other => panic!("camera 应为联合视图: {:?}", other),
        }
        match &fields[1].view {
            FieldView::Union {
                show_selector,
                selected,
                options,
                branch,
            } => {
                assert!(show_selector);
                assert_eq!(*selected, 1);
                assert_eq!(options[2].label, "None");
                assert!(matches!(branch.view, FieldView::Primitive { kind: FieldKind::Text, .. }));
            }
            other => panic!("target 应为联合视图: {:?}", other),
        }
    }

    #[test]
    fn test_list_items_follow_model_and_selection() {
        let schema = json!({
            "$defs": {
                "Servo": {"type": "object", "properties": {"kind": {"const": "servo"}, "pin": {"type": "pin"}}},
                "Stepper": {"type": "object", "title": "Step Motor", "properties": {"kind": {"const": "stepper"}, "steps": {"type": "integer"}}}
            },
            "type": "object",
            "properties": {
                "motors": {
                    "type": "array",
                    "items": {"anyOf": [{"$ref": "#/$defs/Servo"}, {"$ref": "#/$defs/Stepper"}]}
                }
            }
        });
        let mut session = FormSession::new(
            schema,
            json!({"motors": [{"kind": "servo", "pin": 3}, {"kind": "servo", "_optionSelected": 1}]}),
        );
        let plan = FieldPlan::for_session(&session);

        let motors = plan.find(&FieldPath::parse_dotted("motors")).expect("motors 应该存在");
        let FieldView::List { items, add_options } = &motors.view else {
            panic!("motors 应为列表视图: {:?}", motors.view);
        };
        assert_eq!(items.len(), 2);
        assert_eq!(
            add_options.iter().map(|o| o.label.as_str()).collect::<Vec<_>>(),
            vec!["Servo", "Step Motor"]
        );
        assert!(matches!(items[0].view, FieldView::Union { selected: 0, .. }));
        assert!(matches!(items[1].view, FieldView::Union { selected: 1, .. }), "侧表中的选择优先于推断");

        let kind = plan.find(&FieldPath::parse_dotted("motors.1.kind")).expect("kind 应该存在");
        assert_eq!(kind.view, FieldView::Constant { value: json!("stepper") });

        let pin = plan.find(&FieldPath::parse_dotted("motors.0.pin")).expect("pin 应该存在");
        assert_eq!(
            pin.view,
            FieldView::Primitive {
                kind: FieldKind::Pin,
                value: json!(3)
            }
        );

        session
            .set_value(&FieldPath::parse_dotted("motors.0.pin"), json!(true))
            .expect("写入应该成功");
        session.validate();
        let plan = FieldPlan::for_session(&session);
        let pin = plan.find(&FieldPath::parse_dotted("motors.0.pin")).expect("pin 应该存在");
        assert_eq!(pin.error.as_deref(), Some("Invalid type: expected pin"));
    }

    #[test]
    fn test_recursive_definition_stops_without_data() {
        let schema = json!({
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "next": {"$ref": "#/$defs/Node"}
                    }
                }
            },
            "$ref": "#/$defs/Node"
        });
        let plan = plan_for(&schema, &json!({"name": "a", "next": {"name": "b"}}));

        let second = plan.find(&FieldPath::parse_dotted("next.name")).expect("第二层应该展开");
        assert!(matches!(second.view, FieldView::Primitive { kind: FieldKind::Text, .. }));
        let third = plan.find(&FieldPath::parse_dotted("next.next")).expect("第三层应该存在");
        assert!(matches!(third.view, FieldView::Unsupported { .. }));
    }

    #[test]
    fn test_unknown_type_and_serialization() {
        let schema = json!({"type": "object", "properties": {"blob": {"type": "binary"}}});
        let plan = plan_for(&schema, &json!({}));
        let blob = plan.find(&FieldPath::parse_dotted("blob")).expect("blob 应该存在");
        assert!(matches!(blob.view, FieldView::Unsupported { .. }));

        let json = serde_json::to_value(&plan).expect("序列化应该成功");
        assert_eq!(json["view"], "object");
        assert_eq!(json["fields"][0]["path"], "blob");
        assert_eq!(json["fields"][0]["view"], "unsupported");
    }
}
