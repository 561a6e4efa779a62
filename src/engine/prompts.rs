//! Prompt templates used for answer and theme synthesis.

use serde_json::{Value, json};

/// Render the retrieval-augmented answer prompt.
pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant. Use the following context from documents to answer the question.\n\
         Respond with citations in the form \"source: filename\".\n\
         \n\
         Question: {question}\n\
         ============\n\
         Context: {context}\n\
         ============\n\
         Answer:"
    )
}

/// Render the prompt answering from a single document's full text.
pub fn single_document_prompt(question: &str, document_text: &str) -> String {
    format!(
        "You are an expert assistant. You have the full text of one document below.\n\
         Answer the question ONLY using this document's text.\n\
         \n\
         Provide a concise, accurate answer and include precise citations specifying page number, \
         paragraph, or sentence if possible.\n\
         \n\
         Document text:\n\
         {document_text}\n\
         \n\
         Question:\n\
         {question}\n\
         \n\
         Answer (include citations with page/paragraph/sentence references):"
    )
}

/// Render the theme-identification prompt over labelled excerpts.
pub fn theme_prompt(excerpts: &str) -> String {
    format!(
        "Analyze the following document excerpts and identify 3 to 5 key recurring themes or topics.\n\
         For each theme, provide a brief summary and list the file names of the documents that \
         support it, exactly as they appear before each excerpt.\n\
         \n\
         ============\n\
         {excerpts}\n\
         ============\n\
         Respond with JSON only, in this format:\n\
         {{\"themes\": [{{\"theme\": \"...\", \"summary\": \"...\", \"supporting_docs\": [\"filename1\", \"filename2\"]}}]}}"
    )
}

/// JSON schema constraining theme output when the provider supports structured responses.
pub fn theme_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "themes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "theme": { "type": "string" },
                        "summary": { "type": "string" },
                        "supporting_docs": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["theme", "summary", "supporting_docs"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["themes"],
        "additionalProperties": false
    })
}

/// Label each text with its source key and join with blank lines.
pub fn labelled_context<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    entries
        .into_iter()
        .map(|(key, text)| format!("{key}:\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}
