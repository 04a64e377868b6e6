//! 默认值生成与就地填充

use serde_json::{Map, Value};

use crate::model::schema::{
    alternatives, is_null_branch, is_shared, items, properties, resolve_ref_recursive, schema_type,
    SchemaDefs, SchemaType,
};

/// 按对象 schema 生成默认值
///
/// 每个属性：`const` 无条件优先；`extra` 中同名的标量值在类型与 schema 默认值一致时保留；
/// 其次取 `default`；对象类型递归生成；都没有时不写入该键。
/// 非对象 schema 返回 `const`/`default`，都没有时为 `null`。
pub fn make_defaults(schema: &Value, extra: Option<&Value>) -> Value {
    let Some(props) = properties(schema) else {
        return schema
            .get("const")
            .or_else(|| schema.get("default"))
            .cloned()
            .unwrap_or(Value::Null);
    };

    let mut out = Map::new();
    for (key, prop) in props {
        let carried = extra.and_then(|e| e.get(key));
        if let Some(constant) = prop.get("const") {
            out.insert(key.clone(), constant.clone());
        } else if let Some(kept) = carried.filter(|v| same_scalar_kind(v, prop.get("default"))) {
            out.insert(key.clone(), kept.clone());
        } else if let Some(default) = prop.get("default") {
            out.insert(key.clone(), default.clone());
        } else if schema_type(prop) == Some(SchemaType::Object) {
            out.insert(key.clone(), make_defaults(prop, carried));
        }
    }
    Value::Object(out)
}

fn same_scalar_kind(value: &Value, default: Option<&Value>) -> bool {
    matches!(
        (value, default),
        (Value::String(_), Some(Value::String(_)))
            | (Value::Number(_), Some(Value::Number(_)))
            | (Value::Bool(_), Some(Value::Bool(_)))
    )
}

/// 就地把 `target` 调整为 `schema` 描述的形状
///
/// - `const` 总是写入
/// - 缺失的键写入 `default`，没有默认值时写入 `null`（对象类型写入按其 schema 填充的新对象）
/// - 已有的值一律保留
/// - 递归进入嵌套对象
/// - 删除 schema 未声明的键
///
/// 非对象的 `target` 会先被替换成空对象。
pub fn fill_defaults(target: &mut Value, schema: &Value) {
    let Some(props) = properties(schema) else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(obj) = target else {
        return;
    };

    for (key, prop) in props {
        if let Some(constant) = prop.get("const") {
            obj.insert(key.clone(), constant.clone());
            continue;
        }
        if !obj.contains_key(key) {
            let fresh = match prop.get("default") {
                Some(default) => default.clone(),
                None if properties(prop).is_some() => Value::Object(Map::new()),
                None => Value::Null,
            };
            obj.insert(key.clone(), fresh);
        }

        if properties(prop).is_some() {
            if let Some(child) = obj.get_mut(key).filter(|v| v.is_object()) {
                fill_defaults(child, prop);
            }
        }
    }

    obj.retain(|key, _| props.contains_key(key));
}

/// 切换联合分支时从旧值带到新分支的字段：只有新分支标记了 `shared` 且旧值非空的属性
pub fn carry_shared(current: &Value, branch: &Value) -> Value {
    let mut out = Map::new();
    if let (Some(props), Some(obj)) = (properties(branch), current.as_object()) {
        for (key, prop) in props {
            match obj.get(key) {
                Some(value) if is_shared(prop) && !value.is_null() => {
                    out.insert(key.clone(), value.clone());
                }
                _ => {}
            }
        }
    }
    Value::Object(out)
}

/// 新建数组元素的结果：元素值与（联合时）选中的分支下标
#[derive(Debug, Clone, PartialEq)]
pub struct NewListItem {
    pub value: Value,
    pub option: Option<usize>,
}

/// 为数组追加按钮构造新元素
///
/// `items` 为联合时使用 `option` 指定的分支，未指定（或越界）时取第一个非 null 分支。
pub fn resolve_new_list_item(items_schema: &Value, defs: &SchemaDefs, option: Option<usize>) -> NewListItem {
    let schema = resolve_ref_recursive(items_schema, defs);
    match alternatives(&schema) {
        Some(alts) if !alts.is_empty() => {
            let index = option
                .filter(|i| *i < alts.len())
                .or_else(|| alts.iter().position(|alt| !is_null_branch(alt, defs)))
                .unwrap_or(0);
            NewListItem {
                value: fresh_value(&alts[index]),
                option: Some(index),
            }
        }
        _ => NewListItem {
            value: fresh_value(&schema),
            option: None,
        },
    }
}

/// 某个（已解析的）schema 的初始值
pub fn fresh_value(schema: &Value) -> Value {
    if let Some(constant) = schema.get("const") {
        return constant.clone();
    }
    if properties(schema).is_some() {
        let mut value = make_defaults(schema, None);
        fill_defaults(&mut value, schema);
        return value;
    }
    if let Some(default) = schema.get("default") {
        return default.clone();
    }
    if items(schema).is_some() || schema_type(schema) == Some(SchemaType::Array) {
        return Value::Array(Vec::new());
    }
    if schema_type(schema) == Some(SchemaType::Object) {
        return Value::Object(Map::new());
    }
    Value::Null
}
