//! anyOf / oneOf 分支探测
//!
//! 优先级：null 数据 → 判别器映射 → 启发式打分。打分是尽力而为，
//! 多个分支共享全部已给出的属性时可能选错，界面允许用户手动切换。

use serde_json::Value;

use crate::model::document::{BranchSelections, FieldPath};
use crate::model::schema::{
    alternatives, def_name, discriminator, properties, ref_target, resolved, schema_type, title,
    SchemaDefs, SchemaType,
};

/// 推断 `data` 最可能对应的分支下标；没有候选时返回 0
pub fn detect_candidate_index(
    data: &Value,
    alternatives: &[Value],
    parent_schema: &Value,
    defs: &SchemaDefs,
) -> usize {
    if data.is_null() {
        return alternatives
            .iter()
            .position(|alt| schema_type(resolved(alt, defs)) == Some(SchemaType::Null))
            .unwrap_or(0);
    }

    if let Some(index) = match_discriminator(data, alternatives, parent_schema, defs) {
        return index;
    }

    let mut best_index = 0;
    let mut best_score = 0usize;
    for (index, alt) in alternatives.iter().enumerate() {
        let branch = resolved(alt, defs);
        match score_branch(data, branch, defs) {
            Score::Exact => return index,
            Score::Points(points) if points > best_score => {
                best_score = points;
                best_index = index;
            }
            Score::Points(_) => {}
        }
    }
    best_index
}

enum Score {
    Exact,
    Points(usize),
}

fn score_branch(data: &Value, branch: &Value, defs: &SchemaDefs) -> Score {
    if branch.get("const").is_some_and(|c| values_equal(c, data)) {
        return Score::Exact;
    }

    let mut points = 0;
    if let (Some(props), Some(obj)) = (properties(branch), data.as_object()) {
        for (key, prop) in props {
            let Some(value) = obj.get(key) else {
                continue;
            };
            if resolved(prop, defs)
                .get("const")
                .is_some_and(|c| values_equal(c, value))
            {
                return Score::Exact;
            }
            points += 1;
        }
    }

    if schema_type(branch).is_some_and(|ty| type_matches(ty, data)) {
        points += 1;
    }
    Score::Points(points)
}

fn match_discriminator(
    data: &Value,
    alternatives: &[Value],
    parent_schema: &Value,
    defs: &SchemaDefs,
) -> Option<usize> {
    let disc = discriminator(parent_schema)?;
    let tag = match data.get(&disc.property_name)? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let target = disc.mapping.get(&tag)?;
    let target_name = def_name(target);

    alternatives.iter().position(|alt| {
        if ref_target(alt) == Some(target.as_str()) {
            return true;
        }
        let branch = resolved(alt, defs);
        let id = branch.get("$id").and_then(Value::as_str);
        id == Some(target.as_str())
            || (target_name.is_some() && (title(branch) == target_name || id == target_name))
    })
}

/// 数据的运行时类型是否与 schema 类型一致
pub fn type_matches(ty: SchemaType, data: &Value) -> bool {
    match ty {
        SchemaType::Integer => is_whole_number(data),
        SchemaType::Number => data.is_number(),
        SchemaType::String => data.is_string(),
        SchemaType::Boolean => data.is_boolean(),
        SchemaType::Object => data.is_object(),
        SchemaType::Array => data.is_array(),
        SchemaType::Null => data.is_null(),
        SchemaType::StringOrNumber | SchemaType::Pin | SchemaType::Hex => {
            data.is_string() || data.is_number()
        }
    }
}

pub fn is_whole_number(data: &Value) -> bool {
    match data {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        _ => false,
    }
}

/// 数值按大小比较（`1` 与 `1.0` 相等），其余按结构比较
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// 为 `path` 处的联合节点确定分支：侧表中的显式选择优先，否则推断。
/// 节点不是联合或没有候选时返回 `None`
pub fn choose_branch<'a>(
    node: &'a Value,
    data: &Value,
    path: &FieldPath,
    defs: &'a SchemaDefs,
    selections: &BranchSelections,
) -> Option<(usize, &'a Value)> {
    let alts = alternatives(node)?;
    if alts.is_empty() {
        return None;
    }
    let index = selections
        .get(path)
        .filter(|i| *i < alts.len())
        .unwrap_or_else(|| detect_candidate_index(data, alts, node, defs));
    Some((index, resolved(&alts[index], defs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alts_of(node: &Value) -> Vec<Value> {
        alternatives(node).cloned().unwrap_or_default()
    }

    #[test]
    fn test_null_picks_null_branch() {
        let node = json!({"anyOf": [{"type": "string"}, {"type": "null"}]});
        let defs = SchemaDefs::default();
        assert_eq!(detect_candidate_index(&Value::Null, &alts_of(&node), &node, &defs), 1);

        let no_null = json!({"anyOf": [{"type": "string"}, {"type": "integer"}]});
        assert_eq!(detect_candidate_index(&Value::Null, &alts_of(&no_null), &no_null, &defs), 0);
    }

    #[test]
    fn test_discriminator_beats_property_overlap() {
        let root = json!({"$defs": {
            "Cat": {"type": "object", "properties": {"kind": {}, "name": {}, "lives": {}}},
            "Dog": {"type": "object", "properties": {"bark": {}}}
        }});
        let defs = SchemaDefs::from_schema(&root);
        let parent = json!({
            "anyOf": [{"$ref": "#/$defs/Cat"}, {"$ref": "#/$defs/Dog"}],
            "discriminator": {"propertyName": "kind", "mapping": {"dog": "#/$defs/Dog"}}
        });
        let data = json!({"kind": "dog", "name": "rex", "lives": 1});

        assert_eq!(detect_candidate_index(&data, &alts_of(&parent), &parent, &defs), 1);
    }

    #[test]
    fn test_discriminator_matches_by_title() {
        let defs = SchemaDefs::default();
        let parent = json!({
            "oneOf": [
                {"title": "Usb", "type": "object"},
                {"title": "Csi", "type": "object"}
            ],
            "discriminator": {"propertyName": "bus", "mapping": {"csi": "#/$defs/Csi"}}
        });
        let data = json!({"bus": "csi"});
        assert_eq!(detect_candidate_index(&data, &alts_of(&parent), &parent, &defs), 1);
    }

    #[test]
    fn test_const_property_short_circuits() {
        let defs = SchemaDefs::default();
        let node = json!({"anyOf": [
            {"type": "object", "properties": {"a": {}, "b": {}, "c": {}}},
            {"type": "object", "properties": {"mode": {"const": "pwm"}}}
        ]});
        let data = json!({"a": 1, "b": 2, "c": 3, "mode": "pwm"});
        assert_eq!(detect_candidate_index(&data, &alts_of(&node), &node, &defs), 1);
    }

    #[test]
    fn test_property_overlap_scoring() {
        let defs = SchemaDefs::default();
        let node = json!({"anyOf": [
            {"type": "object", "properties": {"host": {}}},
            {"type": "object", "properties": {"host": {}, "port": {}}}
        ]});
        let data = json!({"host": "x", "port": 80});
        assert_eq!(detect_candidate_index(&data, &alts_of(&node), &node, &defs), 1);
    }

    #[test]
    fn test_primitive_type_scoring() {
        let defs = SchemaDefs::default();
        let node = json!({"anyOf": [{"type": "string"}, {"type": "integer"}, {"type": "number"}]});
        let alts = alts_of(&node);
        assert_eq!(detect_candidate_index(&json!("x"), &alts, &node, &defs), 0);
        assert_eq!(detect_candidate_index(&json!(3), &alts, &node, &defs), 1);
        assert_eq!(detect_candidate_index(&json!(3.5), &alts, &node, &defs), 2);
    }

    #[test]
    fn test_ties_go_to_first() {
        let defs = SchemaDefs::default();
        let node = json!({"anyOf": [
            {"type": "object", "properties": {"x": {}}},
            {"type": "object", "properties": {"x": {}}}
        ]});
        assert_eq!(detect_candidate_index(&json!({"x": 1}), &alts_of(&node), &node, &defs), 0);
        assert_eq!(detect_candidate_index(&json!(true), &[], &node, &defs), 0);
    }

    #[test]
    fn test_choose_branch_prefers_selection() {
        let defs = SchemaDefs::default();
        let node = json!({"anyOf": [{"type": "string"}, {"type": "integer"}]});
        let path = FieldPath::parse_dotted("value");
        let mut selections = BranchSelections::default();

        let (index, _) = choose_branch(&node, &json!(7), &path, &defs, &selections).unwrap();
        assert_eq!(index, 1);

        selections.set(path.clone(), 0);
        let (index, branch) = choose_branch(&node, &json!(7), &path, &defs, &selections).unwrap();
        assert_eq!(index, 0);
        assert_eq!(branch["type"], "string");

        selections.set(path.clone(), 9);
        let (index, _) = choose_branch(&node, &json!(7), &path, &defs, &selections).unwrap();
        assert_eq!(index, 1, "越界的选择被忽略");
    }

    #[test]
    fn test_whole_number() {
        assert!(is_whole_number(&json!(4)));
        assert!(is_whole_number(&json!(4.0)));
        assert!(!is_whole_number(&json!(4.5)));
        assert!(!is_whole_number(&json!("4")));
    }
}
