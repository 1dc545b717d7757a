use serde_json::{Map, Value};

/// Keywords whose value is a map of name -> subschema.
const SUBSCHEMA_MAPS: [&str; 5] = [
    "properties",
    "patternProperties",
    "dependentSchemas",
    "$defs",
    "definitions",
];

/// Keywords whose value is a single subschema (or, for `items`, possibly a list).
const SUBSCHEMAS: [&str; 11] = [
    "propertyNames",
    "additionalProperties",
    "unevaluatedProperties",
    "items",
    "contains",
    "additionalItems",
    "unevaluatedItems",
    "not",
    "if",
    "then",
    "else",
];

/// Keywords whose value is a list of subschemas.
const SUBSCHEMA_LISTS: [&str; 4] = ["prefixItems", "allOf", "anyOf", "oneOf"];

/// Keywords that only make sense on an object schema.
const OBJECT_KEYWORDS: [&str; 8] = [
    "properties",
    "patternProperties",
    "additionalProperties",
    "unevaluatedProperties",
    "required",
    "dependentRequired",
    "dependentSchemas",
    "propertyNames",
];

/// Mark every object schema in the tree as closed (`additionalProperties: false`)
/// unless it already says otherwise.
pub(crate) fn close_objects(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            if describes_object(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            for key in SUBSCHEMA_MAPS {
                if let Some(Value::Object(children)) = map.get_mut(key) {
                    children.values_mut().for_each(close_objects);
                }
            }
            for key in SUBSCHEMAS {
                if let Some(child) = map.get_mut(key) {
                    close_objects(child);
                }
            }
            for key in SUBSCHEMA_LISTS {
                if let Some(Value::Array(children)) = map.get_mut(key) {
                    children.iter_mut().for_each(close_objects);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn describes_object(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => OBJECT_KEYWORDS.iter().any(|keyword| map.contains_key(*keyword)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn closes_nested_and_composed_objects() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "inner": { "properties": { "v": { "type": "integer" } } }
            },
            "anyOf": [{ "type": ["object", "null"] }]
        });
        close_objects(&mut schema);

        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(
            schema["properties"]["inner"]["additionalProperties"],
            json!(false)
        );
        assert_eq!(schema["anyOf"][0]["additionalProperties"], json!(false));
    }

    #[test]
    fn leaves_explicit_additional_properties_alone() {
        let mut schema = json!({
            "type": "object",
            "additionalProperties": { "type": "string" }
        });
        close_objects(&mut schema);

        assert_eq!(schema["additionalProperties"], json!({ "type": "string" }));
    }

    #[test]
    fn ignores_scalar_schemas() {
        let mut schema = json!({ "type": "number" });
        close_objects(&mut schema);
        assert!(schema.get("additionalProperties").is_none());
    }
}
