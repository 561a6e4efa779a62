//! JSON schema builders for MCP tools.

use serde_json::{Map, Value, json};

/// Build the schema describing the `ingest-files` tool input.
pub(crate) fn ingest_files_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        "paths".into(),
        string_array_schema(
            "Files to extract and store (PDF, image, DOCX, or plain text). Unsupported files are skipped.",
        ),
    );
    finalize_object_schema(properties, &["paths"])
}

/// Build the schema describing the `store-documents` tool input.
pub(crate) fn store_documents_input_schema() -> Map<String, Value> {
    let mut text_schema = Map::new();
    text_schema.insert("type".into(), Value::String("string".into()));

    let mut documents_schema = Map::new();
    documents_schema.insert("type".into(), Value::String("object".into()));
    documents_schema.insert(
        "description".into(),
        Value::String(
            "Map of source key to document text. Keys already stored are skipped, not updated."
                .into(),
        ),
    );
    documents_schema.insert("additionalProperties".into(), Value::Object(text_schema));

    let mut properties = Map::new();
    properties.insert("documents".into(), Value::Object(documents_schema));

    let mut schema = finalize_object_schema(properties, &["documents"]);
    schema.insert(
        "examples".into(),
        Value::Array(vec![json!({
            "documents": {
                "a.txt": "Contract penalty is $500.",
                "b.txt": "Quarterly revenue grew 4%."
            }
        })]),
    );
    schema
}

/// Build the schema describing the `answer-query` tool input.
pub(crate) fn answer_query_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("query".into(), string_schema("Question to answer"));

    let mut scope_schema = Map::new();
    scope_schema.insert("type".into(), Value::String("string".into()));
    scope_schema.insert(
        "description".into(),
        Value::String(
            "`store` answers from the most similar stored documents with citations; `session` answers once per session document."
                .into(),
        ),
    );
    scope_schema.insert(
        "enum".into(),
        Value::Array(
            ["store", "session"]
                .into_iter()
                .map(|variant| Value::String(variant.into()))
                .collect(),
        ),
    );
    scope_schema.insert("default".into(), Value::String("store".into()));
    properties.insert("scope".into(), Value::Object(scope_schema));

    finalize_object_schema(properties, &["query"])
}

/// Schema representing an empty object (used for parameterless tools).
pub(crate) fn empty_object_schema() -> Map<String, Value> {
    finalize_object_schema(Map::new(), &[])
}

fn string_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn string_array_schema(description: &str) -> Value {
    let mut item_schema = Map::new();
    item_schema.insert("type".into(), Value::String("string".into()));
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("array".into()));
    schema.insert("description".into(), Value::String(description.into()));
    schema.insert("items".into(), Value::Object(item_schema));
    schema.insert("minItems".into(), Value::Number(1.into()));
    Value::Object(schema)
}

fn finalize_object_schema(properties: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(
                required
                    .iter()
                    .map(|&key| Value::String(key.into()))
                    .collect(),
            ),
        );
    }
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_query_schema_requires_query_and_limits_scope() {
        let schema = answer_query_input_schema();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(
            schema["properties"]["scope"]["enum"],
            json!(["store", "session"])
        );
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn empty_schema_has_no_required_list() {
        let schema = empty_object_schema();
        assert!(!schema.contains_key("required"));
        assert_eq!(schema["type"], "object");
    }
}
