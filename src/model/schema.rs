//! Schema 访问与 `$ref` 解析
//!
//! Schema 节点保持为 `serde_json::Value`（与模型同构，方便整体加载），
//! 这里提供按字段读取的类型化访问器，以及基于 `$defs` 字典的浅解析/递归解析。
//! 递归解析带循环保护：同一条展开路径上再次遇到的定义原样返回未解析的引用。

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `$ref` 唯一支持的前缀
pub const DEFS_PREFIX: &str = "#/$defs/";

/// 出现在这些键下的值是单个子 schema（`items` 也可能是元组形式的数组）
const SINGLE_SCHEMA_KEYS: &[&str] = &[
    "items",
    "not",
    "if",
    "then",
    "else",
    "contains",
    "propertyNames",
    "additionalProperties",
];

/// 这些键下是 schema 列表
const SCHEMA_LIST_KEYS: &[&str] = &["anyOf", "oneOf", "allOf", "prefixItems"];

/// 这些键下是 名称→schema 映射
const SCHEMA_MAP_KEYS: &[&str] = &["properties", "patternProperties", "dependentSchemas"];

/// Schema 声明的类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    StringOrNumber,
    Pin,
    Hex,
    Null,
}

impl SchemaType {
    pub fn parse(s: &str) -> Option<Self> {
        let ty = match s {
            "object" => Self::Object,
            "array" => Self::Array,
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "string_or_number" => Self::StringOrNumber,
            "pin" => Self::Pin,
            "hex" => Self::Hex,
            "null" => Self::Null,
            _ => return None,
        };
        Some(ty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::StringOrNumber => "string_or_number",
            Self::Pin => "pin",
            Self::Hex => "hex",
            Self::Null => "null",
        }
    }
}

/// 读取节点的 `type`。数组形式（`["string", "null"]`）取第一个非 null 的类型
pub fn schema_type(node: &Value) -> Option<SchemaType> {
    match node.get("type")? {
        Value::String(s) => SchemaType::parse(s),
        Value::Array(types) => {
            let mut parsed = types.iter().filter_map(Value::as_str).filter_map(SchemaType::parse);
            let first = parsed.next()?;
            if first == SchemaType::Null {
                parsed.next().or(Some(first))
            } else {
                Some(first)
            }
        }
        _ => None,
    }
}

pub fn properties(node: &Value) -> Option<&Map<String, Value>> {
    node.get("properties").and_then(Value::as_object)
}

pub fn items(node: &Value) -> Option<&Value> {
    node.get("items").filter(|v| v.is_object())
}

/// `anyOf` 与 `oneOf` 语义等价，都按可辨识联合处理
pub fn alternatives(node: &Value) -> Option<&Vec<Value>> {
    node.get("anyOf")
        .or_else(|| node.get("oneOf"))
        .and_then(Value::as_array)
}

pub fn ref_target(node: &Value) -> Option<&str> {
    node.get("$ref").and_then(Value::as_str)
}

/// `#/$defs/Foo` → `Foo`
pub fn def_name(reference: &str) -> Option<&str> {
    reference.strip_prefix(DEFS_PREFIX).filter(|name| !name.is_empty())
}

pub fn required_keys(node: &Value) -> impl Iterator<Item = &str> {
    node.get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

pub fn enum_values(node: &Value) -> Option<&Vec<Value>> {
    node.get("enum").and_then(Value::as_array)
}

pub fn title(node: &Value) -> Option<&str> {
    node.get("title").and_then(Value::as_str)
}

pub fn description(node: &Value) -> Option<&str> {
    node.get("description").and_then(Value::as_str)
}

pub fn is_shared(node: &Value) -> bool {
    node.get("shared").and_then(Value::as_bool).unwrap_or(false)
}

/// 判别器：按 `propertyName` 的值查 `mapping` 得到目标 `$ref`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discriminator {
    pub property_name: String,
    #[serde(default)]
    pub mapping: HashMap<String, String>,
}

pub fn discriminator(node: &Value) -> Option<Discriminator> {
    let raw = node.get("discriminator")?;
    match serde_json::from_value(raw.clone()) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!("忽略无法解析的 discriminator: {}", e);
            None
        }
    }
}

/// `$defs` 字典：按定义名寻址的 schema 集合
#[derive(Debug, Clone, Default)]
pub struct SchemaDefs {
    defs: Map<String, Value>,
}

impl SchemaDefs {
    pub fn new(defs: Map<String, Value>) -> Self {
        Self { defs }
    }

    /// 从根 schema 的 `$defs` 字段读取；缺失时为空字典
    pub fn from_schema(root: &Value) -> Self {
        let defs = root
            .get("$defs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self { defs }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.defs.get(name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// 浅解析一层 `$ref`
///
/// - 非引用节点返回 `None`，调用方用 `resolved` 回退到原节点
/// - `#/$defs/<key>` 在字典中存在时返回定义本身
/// - 定义缺失时返回原节点（不报错，表单按原样降级）
pub fn resolve_ref<'a>(node: &'a Value, defs: &'a SchemaDefs) -> Option<&'a Value> {
    let reference = ref_target(node)?;
    let name = def_name(reference)?;
    match defs.get(name) {
        Some(def) => Some(def),
        None => {
            tracing::debug!("未找到引用定义 {}，按原节点处理", reference);
            Some(node)
        }
    }
}

/// 沿引用链解析到第一个非引用节点；链上出现循环时停在循环入口
pub fn resolved<'a>(node: &'a Value, defs: &'a SchemaDefs) -> &'a Value {
    let mut current = node;
    let mut seen: HashSet<&str> = HashSet::new();
    while let Some(reference) = ref_target(current) {
        if !seen.insert(reference) {
            tracing::warn!("引用链存在循环: {}", reference);
            break;
        }
        match resolve_ref(current, defs) {
            Some(next) if !std::ptr::eq(next, current) => current = next,
            _ => break,
        }
    }
    current
}

/// 递归解析所有携带子 schema 的字段
///
/// 引用节点的显式字段覆盖定义中的同名字段，解析成功后去掉 `$ref`。
/// 同一展开路径上重复出现的定义不再展开，原样保留引用节点。
pub fn resolve_ref_recursive(node: &Value, defs: &SchemaDefs) -> Value {
    let mut expanding = HashSet::new();
    resolve_inner(node, defs, &mut expanding)
}

fn resolve_inner(node: &Value, defs: &SchemaDefs, expanding: &mut HashSet<String>) -> Value {
    let Value::Object(map) = node else {
        return node.clone();
    };

    if let Some(name) = ref_target(node).and_then(def_name) {
        if let Some(def) = defs.get(name) {
            if expanding.contains(name) {
                tracing::warn!("检测到循环引用 {}{}，保留未解析的引用", DEFS_PREFIX, name);
                return node.clone();
            }
            let mut merged = def.as_object().cloned().unwrap_or_default();
            for (key, value) in map {
                if key != "$ref" {
                    merged.insert(key.clone(), value.clone());
                }
            }
            expanding.insert(name.to_string());
            let out = resolve_inner(&Value::Object(merged), defs, expanding);
            expanding.remove(name);
            return out;
        }
    }

    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let k = key.as_str();
        let resolved_value = if SCHEMA_MAP_KEYS.contains(&k) {
            match value {
                Value::Object(children) => Value::Object(
                    children
                        .iter()
                        .map(|(name, child)| (name.clone(), resolve_inner(child, defs, expanding)))
                        .collect(),
                ),
                other => other.clone(),
            }
        } else if SCHEMA_LIST_KEYS.contains(&k) {
            resolve_list(value, defs, expanding)
        } else if SINGLE_SCHEMA_KEYS.contains(&k) {
            match value {
                // 元组形式的 items
                Value::Array(_) => resolve_list(value, defs, expanding),
                other => resolve_inner(other, defs, expanding),
            }
        } else {
            value.clone()
        };
        out.insert(key.clone(), resolved_value);
    }
    Value::Object(out)
}

fn resolve_list(value: &Value, defs: &SchemaDefs, expanding: &mut HashSet<String>) -> Value {
    match value {
        Value::Array(list) => Value::Array(
            list.iter()
                .map(|child| resolve_inner(child, defs, expanding))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// 单选控件的选项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumOption {
    pub label: String,
    pub value: Value,
}

pub fn map_enum_options(node: &Value) -> Vec<EnumOption> {
    enum_values(node)
        .map(|values| {
            values
                .iter()
                .map(|value| EnumOption {
                    label: match value {
                        Value::String(s) => s.clone(),
                        Value::Null => "None".to_string(),
                        other => other.to_string(),
                    },
                    value: value.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// 联合的候选分支（每个分支浅解析一层引用）
pub fn map_effective_any_of<'a>(node: &'a Value, defs: &'a SchemaDefs) -> Vec<&'a Value> {
    alternatives(node)
        .map(|alts| alts.iter().map(|alt| resolved(alt, defs)).collect())
        .unwrap_or_default()
}

/// 分支是否为 `type: "null"`
pub fn is_null_branch(node: &Value, defs: &SchemaDefs) -> bool {
    schema_type(resolved(node, defs)) == Some(SchemaType::Null)
}

/// 联合中含 null 分支，即字段可空
pub fn is_nullable_union(node: &Value, defs: &SchemaDefs) -> bool {
    alternatives(resolved(node, defs))
        .is_some_and(|alts| alts.iter().any(|alt| is_null_branch(alt, defs)))
}

/// `wifi_ssid` / `maxSpeed` → `Wifi Ssid` / `Max Speed`
pub fn title_case(raw: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in raw.chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 字段标签：schema 的 `title` 优先，否则用属性名
pub fn field_label(schema: &Value, key: &str) -> String {
    title_case(title(schema).unwrap_or(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defs_of(root: &Value) -> SchemaDefs {
        SchemaDefs::from_schema(root)
    }

    #[test]
    fn test_resolve_ref_hits_defs() {
        let root = json!({"$defs": {"Port": {"type": "integer", "minimum": 1}}});
        let defs = defs_of(&root);
        let node = json!({"$ref": "#/$defs/Port"});

        let resolved_node = resolve_ref(&node, &defs).expect("应该解析到定义");
        assert_eq!(resolved_node["type"], "integer");
    }

    #[test]
    fn test_resolve_ref_missing_def_returns_node() {
        let defs = SchemaDefs::default();
        let node = json!({"$ref": "#/$defs/Nope"});

        let out = resolve_ref(&node, &defs).expect("缺失定义时回退原节点");
        assert_eq!(out, &node);
    }

    #[test]
    fn test_resolve_ref_non_ref_is_none() {
        let defs = SchemaDefs::default();
        assert!(resolve_ref(&json!({"type": "string"}), &defs).is_none());
        assert!(resolve_ref(&json!({"$ref": "other.json#/x"}), &defs).is_none());
    }

    #[test]
    fn test_resolve_ref_is_idempotent() {
        let root = json!({"$defs": {"Name": {"type": "string"}}});
        let defs = defs_of(&root);
        let node = json!({"$ref": "#/$defs/Name"});

        let once = resolve_ref_recursive(&node, &defs);
        assert!(once.get("$ref").is_none(), "解析结果不应携带 $ref");
        assert!(resolve_ref(&once, &defs).is_none());
        assert_eq!(resolve_ref_recursive(&once, &defs), once);
    }

    #[test]
    fn test_recursive_merge_ref_fields_win() {
        let root = json!({"$defs": {
            "Speed": {"type": "number", "title": "Speed", "maximum": 5}
        }});
        let defs = defs_of(&root);
        let node = json!({
            "type": "object",
            "properties": {
                "speed": {"$ref": "#/$defs/Speed", "title": "Max speed"}
            }
        });

        let out = resolve_ref_recursive(&node, &defs);
        let speed = &out["properties"]["speed"];
        assert_eq!(speed["title"], "Max speed", "引用节点自身字段优先");
        assert_eq!(speed["maximum"], 5);
        assert!(speed.get("$ref").is_none());
    }

    #[test]
    fn test_recursive_walks_all_schema_fields() {
        let root = json!({"$defs": {"S": {"type": "string"}}});
        let defs = defs_of(&root);
        let node = json!({
            "items": {"$ref": "#/$defs/S"},
            "anyOf": [{"$ref": "#/$defs/S"}, {"type": "null"}],
            "not": {"$ref": "#/$defs/S"},
            "additionalProperties": {"$ref": "#/$defs/S"},
            "patternProperties": {"^x": {"$ref": "#/$defs/S"}},
            "dependentSchemas": {"a": {"$ref": "#/$defs/S"}}
        });

        let out = resolve_ref_recursive(&node, &defs);
        assert_eq!(out["items"]["type"], "string");
        assert_eq!(out["anyOf"][0]["type"], "string");
        assert_eq!(out["not"]["type"], "string");
        assert_eq!(out["additionalProperties"]["type"], "string");
        assert_eq!(out["patternProperties"]["^x"]["type"], "string");
        assert_eq!(out["dependentSchemas"]["a"]["type"], "string");
    }

    #[test]
    fn test_recursive_cycle_is_guarded() {
        let root = json!({"$defs": {
            "Node": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "child": {"$ref": "#/$defs/Node"}
                }
            }
        }});
        let defs = defs_of(&root);

        let out = resolve_ref_recursive(&json!({"$ref": "#/$defs/Node"}), &defs);
        assert_eq!(out["type"], "object");
        assert_eq!(
            out["properties"]["child"],
            json!({"$ref": "#/$defs/Node"}),
            "循环处保留未解析引用"
        );
    }

    #[test]
    fn test_resolved_follows_chain_and_stops_on_loop() {
        let root = json!({"$defs": {
            "A": {"$ref": "#/$defs/B"},
            "B": {"type": "boolean"},
            "X": {"$ref": "#/$defs/Y"},
            "Y": {"$ref": "#/$defs/X"}
        }});
        let defs = defs_of(&root);

        assert_eq!(resolved(&json!({"$ref": "#/$defs/A"}), &defs)["type"], "boolean");
        let entry = json!({"$ref": "#/$defs/X"});
        let looped = resolved(&entry, &defs);
        assert!(ref_target(looped).is_some(), "循环链停在入口");
    }

    #[test]
    fn test_schema_type_variants() {
        assert_eq!(schema_type(&json!({"type": "hex"})), Some(SchemaType::Hex));
        assert_eq!(
            schema_type(&json!({"type": ["null", "integer"]})),
            Some(SchemaType::Integer)
        );
        assert_eq!(schema_type(&json!({"anyOf": []})), None);
        assert_eq!(schema_type(&json!({"type": "mystery"})), None);
    }

    #[test]
    fn test_enum_options_and_labels() {
        let node = json!({"enum": ["auto", 2, null]});
        let options = map_enum_options(&node);
        let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["auto", "2", "None"]);
        assert_eq!(options[1].value, json!(2));
    }

    #[test]
    fn test_effective_any_of_and_nullable() {
        let root = json!({"$defs": {"Cam": {"type": "object", "title": "Camera"}}});
        let defs = defs_of(&root);
        let node = json!({"oneOf": [{"$ref": "#/$defs/Cam"}, {"type": "null"}]});

        let alts = map_effective_any_of(&node, &defs);
        assert_eq!(alts.len(), 2);
        assert_eq!(alts[0]["title"], "Camera");
        assert!(is_nullable_union(&node, &defs));
        assert!(!is_nullable_union(&json!({"anyOf": [{"type": "string"}]}), &defs));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("wifi_ssid"), "Wifi Ssid");
        assert_eq!(title_case("maxSpeed"), "Max Speed");
        assert_eq!(title_case("IP address"), "IP Address");
        assert_eq!(field_label(&json!({"title": "motor-left"}), "x"), "Motor Left");
        assert_eq!(field_label(&json!({}), "gpio_pin"), "Gpio Pin");
    }
}
