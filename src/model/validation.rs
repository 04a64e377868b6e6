//! 整树校验
//!
//! 校验从不返回 `Err`：全部问题都以数据形式落在 `ErrorTree` 上，
//! 形状与模型一致（叶子为消息字符串，对象/数组为嵌套树）。无错误时为 `None`。

use std::cmp::Ordering;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::document::{BranchSelections, FieldPath, PathSegment};
use crate::model::schema::{
    alternatives, enum_values, is_nullable_union, items, properties, required_keys, resolved,
    schema_type, SchemaDefs, SchemaType,
};
use crate::model::union::{choose_branch, is_whole_number, type_matches, values_equal};

pub const MSG_REQUIRED: &str = "Required";
pub const MSG_EXPECTED_ARRAY: &str = "Expected an array.";
pub const MSG_INVALID_HEX: &str = "Invalid hex number!";

/// 联合嵌套联合时最多下钻的层数
const MAX_UNION_NESTING: usize = 16;

fn hex_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]+$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorTree {
    Message(String),
    Object(IndexMap<String, ErrorTree>),
    Array(Vec<Option<ErrorTree>>),
}

impl ErrorTree {
    pub fn as_message(&self) -> Option<&str> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    /// 取某个字段路径下的错误子树
    pub fn at(&self, path: &FieldPath) -> Option<&ErrorTree> {
        let mut current = self;
        for segment in path.segments() {
            current = match (current, segment) {
                (Self::Object(map), PathSegment::Key(key)) => map.get(key)?,
                (Self::Array(list), PathSegment::Index(i)) => list.get(*i)?.as_ref()?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// 展平成 (路径, 消息) 列表，按模型顺序
    pub fn messages(&self) -> Vec<(FieldPath, &str)> {
        let mut out = Vec::new();
        let mut stack = vec![(FieldPath::root(), self)];
        while let Some((path, node)) = stack.pop() {
            match node {
                Self::Message(m) => out.push((path, m.as_str())),
                Self::Object(map) => {
                    for (key, child) in map.iter().rev() {
                        stack.push((path.child(key), child));
                    }
                }
                Self::Array(list) => {
                    for (i, child) in list.iter().enumerate().rev() {
                        if let Some(child) = child {
                            stack.push((path.index(i), child));
                        }
                    }
                }
            }
        }
        out
    }

    pub fn count(&self) -> usize {
        self.messages().len()
    }
}

/// 跨字段规则的比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    NotEq,
    In,
    NotIn,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: RuleOperator,
    /// 以 `$` 开头的字符串引用同级字段
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleOutcome {
    pub field: String,
    pub message: String,
}

/// 条件全部成立时，把消息挂到 `then.field`
#[derive(Debug, Clone, Deserialize)]
pub struct CrossFieldRule {
    #[serde(default, alias = "if")]
    pub conditions: Vec<RuleCondition>,
    pub then: RuleOutcome,
}

impl RuleCondition {
    fn holds(&self, siblings: &Map<String, Value>) -> bool {
        let left = siblings.get(&self.field).unwrap_or(&Value::Null);
        let right = match &self.value {
            Value::String(s) if s.starts_with('$') => siblings.get(&s[1..]).unwrap_or(&Value::Null),
            other => other,
        };
        match self.operator {
            RuleOperator::Gt => compare(left, right) == Some(Ordering::Greater),
            RuleOperator::Ge => matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)),
            RuleOperator::Lt => compare(left, right) == Some(Ordering::Less),
            RuleOperator::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
            RuleOperator::Eq => values_equal(left, right),
            RuleOperator::NotEq => !values_equal(left, right),
            RuleOperator::In => right
                .as_array()
                .is_some_and(|list| list.iter().any(|v| values_equal(v, left))),
            RuleOperator::NotIn => right
                .as_array()
                .is_some_and(|list| !list.iter().any(|v| values_equal(v, left))),
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// 读取节点上的跨字段规则；无法解析的规则跳过
pub fn cross_field_rules(node: &Value) -> Vec<CrossFieldRule> {
    node.get("cross_field_validation")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|raw| match serde_json::from_value(raw.clone()) {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::warn!("跳过无法解析的跨字段规则: {}", e);
                None
            }
        })
        .collect()
}

/// 整树校验，联合分支全部按数据推断
pub fn validate_all(schema: &Value, model: &Value, defs: &SchemaDefs) -> Option<ErrorTree> {
    validate_with_selections(schema, model, defs, &BranchSelections::default())
}

/// 整树校验，联合分支优先采用侧表中记录的选择
pub fn validate_with_selections(
    schema: &Value,
    model: &Value,
    defs: &SchemaDefs,
    selections: &BranchSelections,
) -> Option<ErrorTree> {
    let walker = Walker { defs, selections };
    walker.validate(schema, model, &FieldPath::root())
}

struct Walker<'a> {
    defs: &'a SchemaDefs,
    selections: &'a BranchSelections,
}

impl<'a> Walker<'a> {
    fn validate(&self, raw: &'a Value, model: &Value, path: &FieldPath) -> Option<ErrorTree> {
        let defs = self.defs;
        let no_selections = BranchSelections::default();
        let mut effective = resolved(raw, defs);
        let mut depth = 0;
        while alternatives(effective).is_some() && depth < MAX_UNION_NESTING {
            if model.is_null() && is_nullable_union(effective, defs) {
                return None;
            }
            let selections = if depth == 0 { self.selections } else { &no_selections };
            match choose_branch(effective, model, path, defs, selections) {
                Some((_, branch)) => effective = branch,
                None => break,
            }
            depth += 1;
        }

        let is_object =
            properties(effective).is_some() || schema_type(effective) == Some(SchemaType::Object);
        if is_object {
            return self.validate_object(effective, model, path);
        }

        let is_array = items(effective).is_some() || schema_type(effective) == Some(SchemaType::Array);
        if is_array {
            let Some(list) = model.as_array() else {
                return Some(ErrorTree::Message(MSG_EXPECTED_ARRAY.to_string()));
            };
            let item_schema = items(effective)?;
            let results: Vec<Option<ErrorTree>> = list
                .iter()
                .enumerate()
                .map(|(i, item)| self.validate(item_schema, item, &path.index(i)))
                .collect();
            return results
                .iter()
                .any(Option::is_some)
                .then_some(ErrorTree::Array(results));
        }

        validate_simple_type(raw, effective, model, defs).map(ErrorTree::Message)
    }

    fn validate_object(&self, schema: &'a Value, model: &Value, path: &FieldPath) -> Option<ErrorTree> {
        let empty = Map::new();
        let obj = model.as_object().unwrap_or(&empty);
        let mut errors: IndexMap<String, ErrorTree> = IndexMap::new();

        // 跨字段规则先写，后续的直接校验覆盖同名键
        for rule in cross_field_rules(schema) {
            if rule.conditions.iter().all(|c| c.holds(obj)) {
                errors.insert(rule.then.field.clone(), ErrorTree::Message(rule.then.message.clone()));
            }
        }

        let mut missing = Vec::new();
        for key in required_keys(schema) {
            if obj.get(key).map_or(true, Value::is_null) {
                errors.insert(key.to_string(), ErrorTree::Message(MSG_REQUIRED.to_string()));
                missing.push(key);
            }
        }

        if let Some(props) = properties(schema) {
            let null = Value::Null;
            for (key, prop) in props {
                if missing.contains(&key.as_str()) {
                    continue;
                }
                // 缺失与 null 同样按空值校验
                let child_model = obj.get(key).unwrap_or(&null);
                if let Some(child) = self.validate(prop, child_model, &path.child(key)) {
                    errors.insert(key.clone(), child);
                }
            }
        }

        (!errors.is_empty()).then_some(ErrorTree::Object(errors))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// 叶子字段校验：类型 → 数值范围 → pattern → enum，违规子句用空格拼接
///
/// 原始 schema 是含 null 分支的联合且值为 `null` 时，无论选中分支是什么都视为合法。
pub fn validate_simple_type(
    raw: &Value,
    effective: &Value,
    model: &Value,
    defs: &SchemaDefs,
) -> Option<String> {
    if model.is_null() && is_nullable_union(raw, defs) {
        return None;
    }

    if let Some(ty) = schema_type(effective) {
        let type_ok = match ty {
            SchemaType::String => !is_blank(model) && model.is_string(),
            SchemaType::StringOrNumber | SchemaType::Pin => {
                model.is_number() || (model.is_string() && !is_blank(model))
            }
            SchemaType::Hex => {
                model.is_number() || model.as_str().is_some_and(|s| hex_regex().is_match(s))
            }
            SchemaType::Integer => is_whole_number(model),
            other => type_matches(other, model),
        };
        if !type_ok {
            let message = if is_blank(model) {
                MSG_REQUIRED.to_string()
            } else if ty == SchemaType::Hex {
                MSG_INVALID_HEX.to_string()
            } else {
                format!("Invalid type: expected {}", ty.as_str())
            };
            return Some(message);
        }
    }

    let mut clauses: Vec<String> = Vec::new();

    if let Some(n) = numeric_value(model) {
        let bound = |key: &str| effective.get(key).filter(|b| b.is_number());
        if let Some(b) = bound("minimum").filter(|b| b.as_f64().is_some_and(|min| n < min)) {
            clauses.push(format!("Must be >= {}.", b));
        }
        if let Some(b) = bound("maximum").filter(|b| b.as_f64().is_some_and(|max| n > max)) {
            clauses.push(format!("Must be <= {}.", b));
        }
        if let Some(b) = bound("exclusiveMinimum").filter(|b| b.as_f64().is_some_and(|min| n <= min)) {
            clauses.push(format!("Must be > {}.", b));
        }
        if let Some(b) = bound("exclusiveMaximum").filter(|b| b.as_f64().is_some_and(|max| n >= max)) {
            clauses.push(format!("Must be < {}.", b));
        }
    }

    if let (Some(s), Some(pattern)) = (model.as_str(), effective.get("pattern").and_then(Value::as_str)) {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(s) => clauses.push(format!("Does not match pattern {}.", pattern)),
            Ok(_) => {}
            Err(e) => tracing::warn!("忽略无效的 pattern {}: {}", pattern, e),
        }
    }

    if let Some(allowed) = enum_values(effective) {
        if !allowed.iter().any(|v| values_equal(v, model)) {
            let listed: Vec<String> = allowed
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            clauses.push(format!("Must be one of: {}.", listed.join(", ")));
        }
    }

    (!clauses.is_empty()).then(|| clauses.join(" "))
}

/// 参与范围检查的数值；十六进制字符串按其数值计算
fn numeric_value(model: &Value) -> Option<f64> {
    match model {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .strip_prefix("0x")
            .and_then(|digits| u64::from_str_radix(digits, 16).ok())
            .map(|v| v as f64),
        _ => None,
    }
}
