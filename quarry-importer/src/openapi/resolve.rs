//! Local `$ref` resolution with a depth bound

use serde_json::{Map, Value};

/// Nested `$ref` hops followed before a schema is cut off
pub const MAX_REF_DEPTH: usize = 3;

/// Look up a local reference such as `#/components/schemas/Pet`.
pub fn lookup<'a>(doc: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    doc.pointer(pointer)
}

/// Follow `$ref` on this node only, up to the depth bound.
pub fn deref<'a>(doc: &'a Value, node: &'a Value) -> &'a Value {
    let mut current = node;
    for _ in 0..MAX_REF_DEPTH {
        match current.get("$ref").and_then(Value::as_str) {
            Some(reference) => match lookup(doc, reference) {
                Some(target) => current = target,
                None => return current,
            },
            None => return current,
        }
    }
    current
}

/// Resolve a schema tree, inlining references.
///
/// Each `$ref` hop counts against [`MAX_REF_DEPTH`]; past the bound the
/// reference is replaced by an empty object schema, so self-referential
/// schemas terminate. `allOf` members are merged into one object schema.
pub fn resolve_schema(doc: &Value, schema: &Value) -> Value {
    resolve_at(doc, schema, 0)
}

fn resolve_at(doc: &Value, schema: &Value, depth: usize) -> Value {
    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        if depth >= MAX_REF_DEPTH {
            tracing::debug!("Reference depth exceeded at {}", reference);
            return Value::Object(Map::new());
        }
        return match lookup(doc, reference) {
            Some(target) => resolve_at(doc, target, depth + 1),
            None => {
                tracing::warn!("Unresolvable reference {}", reference);
                Value::Object(Map::new())
            }
        };
    }

    let Value::Object(map) = schema else {
        return schema.clone();
    };

    if let Some(Value::Array(members)) = map.get("allOf") {
        return merge_all_of(doc, map, members, depth);
    }

    let mut out = Map::new();
    for (key, value) in map {
        let resolved = match key.as_str() {
            "properties" => match value {
                Value::Object(props) => Value::Object(
                    props
                        .iter()
                        .map(|(name, prop)| (name.clone(), resolve_at(doc, prop, depth)))
                        .collect(),
                ),
                other => other.clone(),
            },
            "items" | "additionalProperties" => resolve_at(doc, value, depth),
            "oneOf" | "anyOf" => match value {
                Value::Array(options) => Value::Array(
                    options.iter().map(|o| resolve_at(doc, o, depth)).collect(),
                ),
                other => other.clone(),
            },
            _ => value.clone(),
        };
        out.insert(key.clone(), resolved);
    }
    Value::Object(out)
}

fn merge_all_of(doc: &Value, base: &Map<String, Value>, members: &[Value], depth: usize) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();

    for member in members {
        let resolved = resolve_at(doc, member, depth);
        if let Some(props) = resolved.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                properties.insert(name.clone(), prop.clone());
            }
        }
        if let Some(req) = resolved.get("required").and_then(Value::as_array) {
            required.extend(req.iter().cloned());
        }
    }

    let mut out: Map<String, Value> = base
        .iter()
        .filter(|(k, _)| k.as_str() != "allOf")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    out.insert("type".to_string(), Value::String("object".to_string()));
    out.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        out.insert("required".to_string(), Value::Array(required));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolves_nested_refs() {
        let doc = json!({
            "components": {"schemas": {
                "Pet": {"type": "object", "properties": {"owner": {"$ref": "#/components/schemas/Owner"}}},
                "Owner": {"type": "object", "properties": {"name": {"type": "string"}}}
            }}
        });
        let resolved = resolve_schema(&doc, &json!({"$ref": "#/components/schemas/Pet"}));
        assert_eq!(resolved["properties"]["owner"]["properties"]["name"]["type"], "string");
    }

    #[test]
    fn test_self_reference_terminates() {
        let doc = json!({
            "definitions": {
                "Node": {"type": "object", "properties": {
                    "id": {"type": "integer"},
                    "child": {"$ref": "#/definitions/Node"}
                }}
            }
        });
        let resolved = resolve_schema(&doc, &json!({"$ref": "#/definitions/Node"}));
        let level3 = &resolved["properties"]["child"]["properties"]["child"];
        assert_eq!(level3["properties"]["id"]["type"], "integer");
        assert_eq!(level3["properties"]["child"], json!({}));
    }

    #[test]
    fn test_all_of_merged() {
        let doc = json!({"components": {"schemas": {
            "Base": {"type": "object", "properties": {"id": {"type": "integer"}}, "required": ["id"]}
        }}});
        let resolved = resolve_schema(
            &doc,
            &json!({"allOf": [
                {"$ref": "#/components/schemas/Base"},
                {"properties": {"name": {"type": "string"}}}
            ]}),
        );
        assert_eq!(resolved["type"], "object");
        assert!(resolved["properties"].get("id").is_some());
        assert!(resolved["properties"].get("name").is_some());
        assert_eq!(resolved["required"], json!(["id"]));
    }

    #[test]
    fn test_missing_ref_is_empty() {
        let resolved = resolve_schema(&json!({}), &json!({"$ref": "#/components/schemas/Nope"}));
        assert_eq!(resolved, json!({}));
    }
}
