use serde_json::Value as JsonValue;

/// Resolve a dotted path (`profile.email`) inside a document.
pub(crate) fn lookup<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// String id of a document (`_id`), if it has one.
pub(crate) fn document_id(doc: &JsonValue) -> Option<String> {
    match doc.get("_id")? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_walks_nested_objects() {
        let doc = json!({"a": {"b": {"c": 1}}, "x": [1, 2]});
        assert_eq!(lookup(&doc, "a.b.c"), Some(&json!(1)));
        assert_eq!(lookup(&doc, "x"), Some(&json!([1, 2])));
        assert!(lookup(&doc, "a.missing").is_none());
        assert!(lookup(&doc, "x.0").is_none());
    }

    #[test]
    fn numeric_ids_are_stringified() {
        assert_eq!(document_id(&json!({"_id": 7})).as_deref(), Some("7"));
        assert_eq!(document_id(&json!({"_id": "abc"})).as_deref(), Some("abc"));
        assert!(document_id(&json!({"id": "abc"})).is_none());
    }
}
