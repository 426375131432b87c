//! Format Detector (C2): classifies a trimmed, non-empty string as
//! structured object/array, a line-based table, or plain text.

use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedShape {
    StructuredObject(Json),
    StructuredArray(Json),
    Table(Vec<Vec<String>>),
    PlainText(String),
    Unknown,
}

/// Attempts a parse that tolerates a leading/trailing non-JSON fragment
/// around the first balanced `{...}`/`[...]` span — the "permissive"
/// second pass spec §4.2 calls for after strict parsing fails. Still
/// rejects bare scalars: only a mapping or sequence root counts as
/// structured.
fn permissive_structured_parse(input: &str) -> Option<Json> {
    let start = input.find(['{', '['])?;
    let opening = input.as_bytes()[start] as char;
    let closing = if opening == '{' { '}' } else { ']' };
    let end = input.rfind(closing)?;
    if end <= start {
        return None;
    }
    let candidate = &input[start..=end];
    let parsed: Json = serde_json::from_str(candidate).ok()?;
    match parsed {
        Json::Object(_) | Json::Array(_) => Some(parsed),
        _ => None,
    }
}

fn looks_tabular(input: &str) -> Option<Vec<Vec<String>>> {
    let lines: Vec<&str> = input.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 3 || !lines[0].contains(',') {
        return None;
    }
    let rows: Vec<Vec<String>> = lines
        .iter()
        .map(|line| line.split(',').map(|cell| cell.trim().to_string()).collect())
        .collect();
    let column_count = rows[0].len();
    if column_count < 2 || !rows.iter().all(|r| r.len() == column_count) {
        return None;
    }
    Some(rows)
}

/// Classifies `raw`. Callers are expected to have already trimmed the
/// input; an empty string returns `Unknown`.
pub fn classify(raw: &str) -> ParsedShape {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParsedShape::Unknown;
    }

    if let Some(first) = trimmed.chars().find(|c| !c.is_whitespace()) {
        if first == '{' || first == '[' {
            if let Ok(parsed) = serde_json::from_str::<Json>(trimmed) {
                return match parsed {
                    Json::Object(_) => ParsedShape::StructuredObject(parsed),
                    Json::Array(_) => ParsedShape::StructuredArray(parsed),
                    other => ParsedShape::PlainText(other.to_string()),
                };
            }
        }
    }

    if let Some(parsed) = permissive_structured_parse(trimmed) {
        return match parsed {
            Json::Object(_) => ParsedShape::StructuredObject(parsed),
            Json::Array(_) => ParsedShape::StructuredArray(parsed),
            _ => unreachable!("permissive_structured_parse only returns object/array"),
        };
    }

    if let Some(table) = looks_tabular(trimmed) {
        return ParsedShape::Table(table);
    }

    ParsedShape::PlainText(trimmed.to_string())
}
