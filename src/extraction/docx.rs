use super::{ExtractionError, read_file};
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::OnceLock;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract the body text of a DOCX file, one line per paragraph.
pub(super) async fn extract(path: &Path) -> Result<String, ExtractionError> {
    let bytes = read_file(path).await?;
    tokio::task::spawn_blocking(move || {
        let xml = read_document_part(&bytes)?;
        Ok(document_xml_to_text(&xml))
    })
    .await
    .map_err(|error| ExtractionError::Docx(format!("task join error: {error}")))?
}

fn read_document_part(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| ExtractionError::Docx(format!("not a zip archive: {error}")))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|error| ExtractionError::Docx(format!("missing {DOCUMENT_PART}: {error}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|error| ExtractionError::Docx(format!("unreadable {DOCUMENT_PART}: {error}")))?;
    Ok(xml)
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|</w:p>|<w:tab/>|<w:br/>")
            .unwrap_or_else(|error| panic!("invalid DOCX token pattern: {error}"))
    })
}

fn document_xml_to_text(xml: &str) -> String {
    let mut text = String::new();
    for capture in token_pattern().captures_iter(xml) {
        match capture.get(1) {
            Some(run) => text.push_str(&unescape_xml(run.as_str())),
            None => match &capture[0] {
                "<w:tab/>" => text.push('\t'),
                _ => text.push('\n'),
            },
        }
    }
    text
}

fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&(?:#x([0-9A-Fa-f]+)|#([0-9]+)|(lt|gt|quot|apos|amp));")
            .unwrap_or_else(|error| panic!("invalid XML entity pattern: {error}"))
    })
}

/// Decode named and numeric entities in one pass; `&amp;#39;` stays `&#39;`.
fn unescape_xml(value: &str) -> String {
    entity_pattern()
        .replace_all(value, |capture: &regex::Captures<'_>| {
            let code_point = match (capture.get(1), capture.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (None, Some(decimal)) => decimal.as_str().parse::<u32>().ok(),
                (None, None) => {
                    return match &capture[3] {
                        "lt" => "<",
                        "gt" => ">",
                        "quot" => "\"",
                        "apos" => "'",
                        _ => "&",
                    }
                    .to_string();
                }
            };
            code_point
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| capture[0].to_string())
        })
        .into_owned()
}
