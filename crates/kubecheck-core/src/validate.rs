//! Manifest validation: file bytes in, line-addressed annotations out.
//!
//! A manifest may hold several `---`-separated YAML documents. Each document
//! is checked on its own and every line number reported is absolute within
//! the file.
//!
//! Severity policy:
//! - unparsable content and schema violations are `failure`
//! - fields a schema marks `deprecated: true` are `warning`

use std::borrow::Cow;

use serde::Deserialize;
use serde_json::Value;

use crate::annotation::{Annotation, AnnotationLevel};
use crate::changeset::ChangedFile;
use crate::config::Schema;

/// Validate `bytes` for `file`, against `schema` when given.
///
/// Without a schema only well-formedness is checked.
pub fn validate(bytes: &[u8], file: &ChangedFile, schema: Option<&Schema>) -> Vec<Annotation> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            return vec![Annotation::failure(
                &file.path,
                &file.blob_url,
                1,
                "Invalid encoding",
                format!("{} is not valid UTF-8: {}", file.path, e),
            )]
        }
    };

    let documents = split_documents(text);
    let mut annotations = Vec::new();
    for (index, stream_doc) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let doc = documents.get(index);
        let first_line = doc.and_then(Document::first_content_line);

        let parsed = match serde_yaml::Value::deserialize(stream_doc) {
            Ok(parsed) => parsed,
            Err(e) => {
                let line = e
                    .location()
                    .map(|loc| loc.line())
                    .or(first_line)
                    .unwrap_or(1);
                annotations.push(Annotation::failure(
                    &file.path,
                    &file.blob_url,
                    line,
                    "Invalid YAML",
                    e.to_string(),
                ));
                // The stream cannot be resumed past a syntax error.
                break;
            }
        };
        if parsed.is_null() && first_line.is_none() {
            continue;
        }
        let first_line = first_line.unwrap_or(1);

        let Some(schema) = schema else {
            continue;
        };

        let instance = match serde_json::to_value(&parsed) {
            Ok(instance) => instance,
            Err(e) => {
                annotations.push(Annotation::failure(
                    &file.path,
                    &file.blob_url,
                    first_line,
                    "Unsupported YAML",
                    format!("document cannot be represented as JSON: {}", e),
                ));
                continue;
            }
        };
        let locate = |pointer: &str| {
            doc.and_then(|d| d.line_for_pointer(pointer))
                .unwrap_or(first_line)
        };

        for error in schema.validator().iter_errors(&instance) {
            let pointer = error.instance_path.to_string();
            annotations.push(Annotation::failure(
                &file.path,
                &file.blob_url,
                locate(&pointer),
                format!("Schema '{}' validation failed", schema.name),
                format!("{}: {}", display_pointer(&pointer), error),
            ));
        }

        let mut deprecated = Vec::new();
        collect_deprecated(&schema.document, &instance, String::new(), &mut deprecated);
        for pointer in deprecated {
            annotations.push(Annotation::new(
                &file.path,
                &file.blob_url,
                locate(&pointer),
                AnnotationLevel::Warning,
                "Deprecated field",
                format!(
                    "{} is deprecated by schema '{}'",
                    display_pointer(&pointer),
                    schema.name
                ),
            ));
        }
    }
    annotations
}

fn display_pointer(pointer: &str) -> &str {
    if pointer.is_empty() {
        "(root)"
    } else {
        pointer
    }
}

/// Walk `properties`/`items` of the schema alongside the instance and record
/// pointers of present fields whose subschema says `deprecated: true`.
fn collect_deprecated(schema: &Value, instance: &Value, pointer: String, out: &mut Vec<String>) {
    if let (Some(properties), Some(object)) = (
        schema.get("properties").and_then(Value::as_object),
        instance.as_object(),
    ) {
        for (key, subschema) in properties {
            let Some(child) = object.get(key) else {
                continue;
            };
            let child_pointer = format!("{}/{}", pointer, escape_segment(key));
            if subschema.get("deprecated") == Some(&Value::Bool(true)) {
                out.push(child_pointer.clone());
            }
            collect_deprecated(subschema, child, child_pointer, out);
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), instance.as_array()) {
        if items.is_object() {
            for (i, child) in array.iter().enumerate() {
                collect_deprecated(items, child, format!("{}/{}", pointer, i), out);
            }
        }
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

// ---------------------------------------------------------------------------
// Documents and line location
// ---------------------------------------------------------------------------

/// Line view of one YAML document of a multi-document file, used to map
/// JSON pointers back to source lines. Parsing is left to `serde_yaml`.
#[derive(Debug)]
struct Document<'a> {
    /// Absolute 1-based line of `lines[0]`.
    first_line: usize,
    /// Opened by a `---` marker rather than implied by content.
    explicit: bool,
    lines: Vec<Cow<'a, str>>,
}

impl<'a> Document<'a> {
    fn first_content_line(&self) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| indent_of(line).is_some())
            .map(|i| self.first_line + i)
    }

    /// Best-effort line of the node a JSON pointer addresses.
    ///
    /// Resolves segment by segment and returns the deepest line found, so a
    /// pointer into a flow mapping still lands on its parent key.
    fn line_for_pointer(&self, pointer: &str) -> Option<usize> {
        let lines: Vec<&str> = self.lines.iter().map(AsRef::as_ref).collect();
        let segments: Vec<String> = pointer
            .split('/')
            .skip(1)
            .map(unescape_segment)
            .collect();

        let mut scope = Scope::Block {
            start: 0,
            parent: None,
        };
        let mut hit = None;

        for segment in &segments {
            let found = match segment.parse::<usize>() {
                Ok(n) => find_item(&lines, &scope, n),
                Err(_) => find_key(&lines, &scope, segment),
            };
            let Some((index, next)) = found else {
                break;
            };
            hit = Some(index);
            scope = next;
        }

        hit.map(|i| self.first_line + i)
    }
}

/// Where the children of the last resolved node live.
#[derive(Debug, Clone, Copy)]
enum Scope {
    /// Lines from `start` indented deeper than `parent`.
    Block { start: usize, parent: Option<usize> },
    /// A sequence item: content starts on `line` after the dash at `dash`.
    Item { line: usize, dash: usize },
}

enum Marker<'a> {
    /// `---`, with whatever follows it on the same line.
    Start(&'a str),
    /// `...`
    End,
}

fn document_marker(line: &str) -> Option<Marker<'_>> {
    if line.trim_end() == "..." {
        return Some(Marker::End);
    }
    let rest = line.trim_end_matches('\r').strip_prefix("---")?;
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
        Some(Marker::Start(rest))
    } else {
        None
    }
}

/// Split `text` the way a YAML stream splits into documents.
///
/// Content after `---` stays on the marker line with the marker blanked out,
/// so columns and line numbers are unchanged. `%` directives before a
/// document are blanked. Segments that are neither explicit nor hold content
/// are not documents and are dropped.
fn split_documents(text: &str) -> Vec<Document<'_>> {
    let mut docs = Vec::new();
    let mut current = Document {
        first_line: 1,
        explicit: false,
        lines: Vec::new(),
    };

    for (i, line) in text.lines().enumerate() {
        match document_marker(line) {
            Some(Marker::Start(rest)) => {
                let first = if rest.trim().is_empty() {
                    Cow::Borrowed("")
                } else {
                    Cow::Owned(format!("   {}", rest))
                };
                docs.push(std::mem::replace(
                    &mut current,
                    Document {
                        first_line: i + 1,
                        explicit: true,
                        lines: vec![first],
                    },
                ));
            }
            Some(Marker::End) => {
                docs.push(std::mem::replace(
                    &mut current,
                    Document {
                        first_line: i + 2,
                        explicit: false,
                        lines: Vec::new(),
                    },
                ));
            }
            None if line.starts_with('%')
                && !current.explicit
                && current.first_content_line().is_none() =>
            {
                current.lines.push(Cow::Borrowed(""));
            }
            None => current.lines.push(Cow::Borrowed(line)),
        }
    }
    docs.push(current);
    docs.retain(|doc| doc.explicit || doc.first_content_line().is_some());
    docs
}

/// Indentation of a content line; `None` for blank and comment lines.
fn indent_of(line: &str) -> Option<usize> {
    let trimmed = line.trim_start_matches(' ');
    if trimmed.trim().is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(line.len() - trimmed.len())
}

/// Column and name of the mapping key on a line, looking through `- ` prefixes.
fn key_on_line(line: &str) -> Option<(usize, String)> {
    let mut rest = line.trim_start_matches(' ');
    let mut col = line.len() - rest.len();
    while let Some(after) = rest.strip_prefix("- ") {
        let trimmed = after.trim_start_matches(' ');
        col += 2 + (after.len() - trimmed.len());
        rest = trimmed;
    }

    let bytes = rest.as_bytes();
    let colon = bytes
        .iter()
        .enumerate()
        .position(|(i, b)| *b == b':' && (i + 1 == bytes.len() || bytes[i + 1] == b' '))?;
    let raw = rest[..colon].trim();
    let key = raw
        .strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(raw);
    if key.is_empty() {
        return None;
    }
    Some((col, key.to_string()))
}

fn find_key(lines: &[&str], scope: &Scope, key: &str) -> Option<(usize, Scope)> {
    let (start, parent, item_line) = match *scope {
        Scope::Block { start, parent } => (start, parent, None),
        Scope::Item { line, dash } => (line, Some(dash), Some(line)),
    };

    let mut child_col = None;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let Some(indent) = indent_of(line) else {
            continue;
        };
        if item_line != Some(i) {
            if let Some(parent) = parent {
                if indent <= parent {
                    break;
                }
            }
        }
        let Some((col, name)) = key_on_line(line) else {
            continue;
        };
        let expected = *child_col.get_or_insert(col);
        if col == expected && name == key {
            return Some((
                i,
                Scope::Block {
                    start: i + 1,
                    parent: Some(col),
                },
            ));
        }
    }
    None
}

fn find_item(lines: &[&str], scope: &Scope, n: usize) -> Option<(usize, Scope)> {
    // A sequence cannot start on the line of an item that owns it.
    let (start, parent) = match *scope {
        Scope::Block { start, parent } => (start, parent),
        Scope::Item { line, dash } => (line + 1, Some(dash)),
    };

    let mut dash_col = None;
    let mut count = 0;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let Some(indent) = indent_of(line) else {
            continue;
        };
        let trimmed = line.trim_start_matches(' ');
        let is_item = trimmed == "-" || trimmed.starts_with("- ");
        if let Some(parent) = parent {
            if indent < parent || (indent == parent && !is_item) {
                break;
            }
        }
        if !is_item {
            continue;
        }
        let col = *dash_col.get_or_insert(indent);
        if indent != col {
            continue;
        }
        if count == n {
            return Some((i, Scope::Item { line: i, dash: col }));
        }
        count += 1;
    }
    None
}
