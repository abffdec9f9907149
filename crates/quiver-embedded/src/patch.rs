//! Declarative patch application.

use quiver_core::{CommandError, CommandResult, DocumentBody, PatchCommandType, PatchRequest};
use serde_json::{Map, Number, Value};

/// Apply `patches` to `doc` in order. The first failing patch aborts; the
/// caller discards the partially patched body.
pub fn apply_patches(doc: &mut DocumentBody, patches: &[PatchRequest]) -> CommandResult<()> {
    for patch in patches {
        apply_patch(doc, patch)?;
    }
    Ok(())
}

fn apply_patch(obj: &mut Map<String, Value>, patch: &PatchRequest) -> CommandResult<()> {
    if let Some(expected) = &patch.prev_val {
        let current = obj.get(&patch.name).cloned().unwrap_or_default();
        if &current != expected {
            return Err(CommandError::Patch(format!(
                "property '{}' was {current}, expected {expected}",
                patch.name
            )));
        }
    }

    match patch.kind {
        PatchCommandType::Set => {
            obj.insert(patch.name.clone(), required_value(patch)?.clone());
        }
        PatchCommandType::Unset => {
            obj.remove(&patch.name);
        }
        PatchCommandType::Add => {
            let value = required_value(patch)?.clone();
            array_mut(obj, &patch.name)?.push(value);
        }
        PatchCommandType::Insert => {
            let value = required_value(patch)?.clone();
            let position = required_position(patch)?;
            let array = array_mut(obj, &patch.name)?;
            if position > array.len() {
                return Err(CommandError::Patch(format!(
                    "cannot insert into '{}' at {position}, it has {} elements",
                    patch.name,
                    array.len()
                )));
            }
            array.insert(position, value);
        }
        PatchCommandType::Remove => {
            let name = patch.name.clone();
            let array = array_mut(obj, &name)?;
            match (patch.position, &patch.value) {
                (Some(position), _) if position < array.len() => {
                    array.remove(position);
                }
                (Some(position), _) => {
                    return Err(CommandError::Patch(format!(
                        "cannot remove '{name}'[{position}], it has {} elements",
                        array.len()
                    )));
                }
                (None, Some(value)) => array.retain(|item| item != value),
                (None, None) => {
                    return Err(CommandError::Patch(format!(
                        "remove from '{name}' needs a position or a value"
                    )));
                }
            }
        }
        PatchCommandType::Modify => match obj.get_mut(&patch.name) {
            Some(Value::Object(inner)) => apply_patches(inner, &patch.nested)?,
            _ => {
                return Err(CommandError::Patch(format!(
                    "cannot modify '{}', it is not an object",
                    patch.name
                )));
            }
        },
        PatchCommandType::Inc => {
            let by = required_value(patch)?;
            let current = obj.get(&patch.name).cloned().unwrap_or_default();
            let sum = add_numbers(&current, by).ok_or_else(|| {
                CommandError::Patch(format!(
                    "cannot increment '{}' ({current}) by {by}",
                    patch.name
                ))
            })?;
            obj.insert(patch.name.clone(), sum);
        }
        PatchCommandType::Copy => {
            let target = target_name(patch)?;
            let value = obj
                .get(&patch.name)
                .cloned()
                .ok_or_else(|| missing_property(&patch.name))?;
            obj.insert(target, value);
        }
        PatchCommandType::Rename => {
            let target = target_name(patch)?;
            let value = obj
                .remove(&patch.name)
                .ok_or_else(|| missing_property(&patch.name))?;
            obj.insert(target, value);
        }
    }
    Ok(())
}

/// Numeric sum; a missing (null) operand counts as zero. Integers stay
/// integers unless either side is fractional.
pub fn add_numbers(current: &Value, by: &Value) -> Option<Value> {
    if current.is_null() {
        return add_numbers(&Value::from(0), by);
    }
    match (current.as_i64(), by.as_i64()) {
        (Some(a), Some(b)) => Some(Value::from(a.checked_add(b)?)),
        _ => {
            let sum = current.as_f64()? + by.as_f64()?;
            Number::from_f64(sum).map(Value::Number)
        }
    }
}

fn array_mut<'a>(obj: &'a mut Map<String, Value>, name: &str) -> CommandResult<&'a mut Vec<Value>> {
    let slot = obj
        .entry(name.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => Ok(items),
        other => Err(CommandError::Patch(format!(
            "property '{name}' is not an array: {other}"
        ))),
    }
}

fn required_value(patch: &PatchRequest) -> CommandResult<&Value> {
    patch
        .value
        .as_ref()
        .ok_or_else(|| CommandError::Patch(format!("{:?} on '{}' needs a value", patch.kind, patch.name)))
}

fn required_position(patch: &PatchRequest) -> CommandResult<usize> {
    patch
        .position
        .ok_or_else(|| CommandError::Patch(format!("{:?} on '{}' needs a position", patch.kind, patch.name)))
}

fn target_name(patch: &PatchRequest) -> CommandResult<String> {
    match &patch.value {
        Some(Value::String(target)) => Ok(target.clone()),
        _ => Err(CommandError::Patch(format!(
            "{:?} on '{}' needs a target property name",
            patch.kind, patch.name
        ))),
    }
}

fn missing_property(name: &str) -> CommandError {
    CommandError::Patch(format!("property '{name}' does not exist"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> DocumentBody {
        value.as_object().cloned().unwrap()
    }

    fn patched(start: Value, patches: &[PatchRequest]) -> Value {
        let mut doc = body(start);
        apply_patches(&mut doc, patches).unwrap();
        Value::Object(doc)
    }

    #[test]
    fn set_and_unset() {
        let out = patched(
            json!({"Name": "old", "Gone": 1}),
            &[PatchRequest::set("Name", json!("new")), PatchRequest::unset("Gone")],
        );
        assert_eq!(out, json!({"Name": "new"}));
    }

    #[test]
    fn inc_creates_missing_counter() {
        let out = patched(json!({}), &[PatchRequest::inc("Hits", 2), PatchRequest::inc("Hits", 3)]);
        assert_eq!(out, json!({"Hits": 5}));
    }

    #[test]
    fn inc_with_fraction_becomes_float() {
        let out = patched(
            json!({"Price": 1}),
            &[PatchRequest {
                value: Some(json!(0.5)),
                ..PatchRequest::inc("Price", 0)
            }],
        );
        assert_eq!(out, json!({"Price": 1.5}));
    }

    #[test]
    fn array_operations() {
        let out = patched(
            json!({"Tags": ["a", "b", "a"]}),
            &[
                PatchRequest::add("Tags", json!("c")),
                PatchRequest::insert("Tags", 0, json!("z")),
                PatchRequest::remove_value("Tags", json!("a")),
                PatchRequest::remove_at("Tags", 1),
            ],
        );
        assert_eq!(out, json!({"Tags": ["z", "c"]}));
    }

    #[test]
    fn add_creates_missing_array() {
        let out = patched(json!({}), &[PatchRequest::add("Tags", json!(1))]);
        assert_eq!(out, json!({"Tags": [1]}));
    }

    #[test]
    fn copy_and_rename() {
        let out = patched(
            json!({"A": 1}),
            &[PatchRequest::copy("A", "B"), PatchRequest::rename("A", "C")],
        );
        assert_eq!(out, json!({"B": 1, "C": 1}));
    }

    #[test]
    fn modify_applies_nested_patches() {
        let out = patched(
            json!({"Address": {"City": "Oslo"}}),
            &[PatchRequest::modify(
                "Address",
                vec![PatchRequest::set("City", json!("Bergen"))],
            )],
        );
        assert_eq!(out, json!({"Address": {"City": "Bergen"}}));
    }

    #[test]
    fn prev_val_mismatch_fails() {
        let mut doc = body(json!({"Status": "open"}));
        let err = apply_patches(
            &mut doc,
            &[PatchRequest::set("Status", json!("closed")).with_prev_val(json!("draft"))],
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Patch(_)));
    }

    #[test]
    fn insert_out_of_range_fails() {
        let mut doc = body(json!({"Tags": []}));
        assert!(apply_patches(&mut doc, &[PatchRequest::insert("Tags", 2, json!(1))]).is_err());
    }

    #[test]
    fn add_to_non_array_fails() {
        let mut doc = body(json!({"Tags": "x"}));
        assert!(apply_patches(&mut doc, &[PatchRequest::add("Tags", json!(1))]).is_err());
    }
}
