//! Scripted patches.
//!
//! A script is a sequence of `;`-separated statements over the document,
//! which is addressed as `this`:
//!
//! ```text
//! this.Name = "value";          // JSON literal, 'single quoted' string,
//! this.Total = $amount;         // a parameter from the request's values
//! this.Copy = this.Original;    // or another path of the document
//! this.Count += 1;              // numeric add, or string append
//! this.Tags.push($tag);
//! delete this.Obsolete;
//! ```

use std::collections::BTreeMap;

use quiver_core::{CommandError, CommandResult, DocumentBody, ScriptedPatchRequest};
use regex::Regex;
use serde_json::{Map, Value};

use crate::patch::add_numbers;

const PATH: &str = r"[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*";

/// Run `patch.script` against `doc`.
pub fn run_script(doc: &mut DocumentBody, patch: &ScriptedPatchRequest) -> CommandResult<()> {
    let grammar = Grammar::new()?;
    for statement in split_statements(&patch.script) {
        grammar.execute(doc, statement, &patch.values)?;
    }
    Ok(())
}

struct Grammar {
    delete: Regex,
    push: Regex,
    assign: Regex,
}

impl Grammar {
    fn new() -> CommandResult<Self> {
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| CommandError::Script(e.to_string()))
        };
        Ok(Self {
            delete: compile(format!(r"^delete\s+this\.({PATH})$"))?,
            push: compile(format!(r"^this\.({PATH})\.push\((.+)\)$"))?,
            assign: compile(format!(r"^this\.({PATH})\s*(\+=|=)\s*(.+)$"))?,
        })
    }

    fn execute(
        &self,
        doc: &mut DocumentBody,
        statement: &str,
        values: &BTreeMap<String, Value>,
    ) -> CommandResult<()> {
        if let Some(caps) = self.delete.captures(statement) {
            remove_path(doc, &caps[1]);
            return Ok(());
        }

        if let Some(caps) = self.push.captures(statement) {
            let value = evaluate(doc, caps[2].trim(), values)?;
            let path = &caps[1];
            let mut items = match get_path(doc, path) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(other) => {
                    return Err(CommandError::Script(format!(
                        "cannot push to this.{path}, it is {other}"
                    )));
                }
            };
            items.push(value);
            return set_path(doc, path, Value::Array(items));
        }

        if let Some(caps) = self.assign.captures(statement) {
            let path = &caps[1];
            let value = evaluate(doc, caps[3].trim(), values)?;
            let value = if &caps[2] == "+=" {
                let current = get_path(doc, path).cloned().unwrap_or_default();
                append(&current, &value).ok_or_else(|| {
                    CommandError::Script(format!("cannot add {value} to this.{path} ({current})"))
                })?
            } else {
                value
            };
            return set_path(doc, path, value);
        }

        Err(CommandError::Script(format!("unrecognized statement: {statement}")))
    }
}

fn append(current: &Value, value: &Value) -> Option<Value> {
    match (current, value) {
        (Value::String(a), Value::String(b)) => Some(Value::String(format!("{a}{b}"))),
        (Value::String(a), other) => Some(Value::String(format!("{a}{other}"))),
        (Value::Null, Value::String(b)) => Some(Value::String(b.clone())),
        _ => add_numbers(current, value),
    }
}

fn evaluate(doc: &DocumentBody, expr: &str, values: &BTreeMap<String, Value>) -> CommandResult<Value> {
    if let Some(name) = expr.strip_prefix('$') {
        return values
            .get(name)
            .cloned()
            .ok_or_else(|| CommandError::Script(format!("no value supplied for ${name}")));
    }
    if let Some(path) = expr.strip_prefix("this.") {
        return Ok(get_path(doc, path).cloned().unwrap_or_default());
    }
    if let Some(inner) = expr
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Ok(Value::String(inner.to_string()));
    }
    serde_json::from_str(expr)
        .map_err(|e| CommandError::Script(format!("invalid expression '{expr}': {e}")))
}

/// Split on `;` outside string literals, dropping blank statements.
fn split_statements(script: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut begin = 0;

    for (i, c) in script.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == ';' => {
                statements.push(&script[begin..i]);
                begin = i + 1;
            }
            None => {}
        }
    }
    statements.push(&script[begin..]);

    statements
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_path<'a>(doc: &'a DocumentBody, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set `path`, creating intermediate objects. Fails when an intermediate
/// value exists and is not an object.
fn set_path(doc: &mut DocumentBody, path: &str, value: Value) -> CommandResult<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(CommandError::Script("empty path".into()));
    };

    let mut current: &mut Map<String, Value> = doc;
    for segment in parents {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(inner) => inner,
            other => {
                return Err(CommandError::Script(format!(
                    "cannot set this.{path}: '{segment}' is {other}"
                )));
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

fn remove_path(doc: &mut DocumentBody, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current: &mut Map<String, Value> = doc;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(Value::Object(inner)) => current = inner,
            _ => return,
        }
    }
    current.remove(*last);
}
