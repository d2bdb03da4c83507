//! Structural validation of JSON request bodies

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Expected JSON type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    String,
    Object,
    Any,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Number => value.is_number(),
            FieldKind::String => value.is_string(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldKind::Number => "a number",
            FieldKind::String => "a string",
            FieldKind::Object => "an object",
            FieldKind::Any => "a value",
        }
    }
}

/// Describes one field of a request body
///
/// Object fields may carry nested descriptors that are checked recursively.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub fields: &'static [FieldDescriptor],
}

impl FieldDescriptor {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            fields: &[],
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            fields: &[],
        }
    }

    pub const fn object(
        name: &'static str,
        required: bool,
        fields: &'static [FieldDescriptor],
    ) -> Self {
        Self {
            name,
            kind: FieldKind::Object,
            required,
            fields,
        }
    }
}

/// Checks `value` against `fields`, returning one message per violation
///
/// An optional field that is present but `null` counts as absent.
pub fn check_shape(value: &Value, root: &str, fields: &[FieldDescriptor]) -> Vec<String> {
    let mut errors = Vec::new();
    match value.as_object() {
        Some(_) => check_fields(value, "", fields, &mut errors),
        None => errors.push(format!("'{}' must be an object", root)),
    }
    errors
}

fn check_fields(value: &Value, prefix: &str, fields: &[FieldDescriptor], errors: &mut Vec<String>) {
    for field in fields {
        let path = format!("{}{}", prefix, field.name);
        match value.get(field.name) {
            None => {
                if field.required {
                    errors.push(format!("'{}' property is missing", path));
                }
            }
            Some(Value::Null) if !field.required => {}
            Some(found) if !field.kind.matches(found) => {
                errors.push(format!(
                    "'{}' property must be {}",
                    path,
                    field.kind.describe()
                ));
            }
            Some(found) => {
                if !field.fields.is_empty() {
                    check_fields(found, &format!("{}.", path), field.fields, errors);
                }
            }
        }
    }
}

/// Checks the shape of `value` and deserializes it
pub fn parse<T: DeserializeOwned>(
    value: Value,
    root: &str,
    fields: &[FieldDescriptor],
) -> Result<T, Vec<String>> {
    let errors = check_shape(&value, root, fields);
    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(value).map_err(|e| vec![e.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const INNER: &[FieldDescriptor] = &[FieldDescriptor::required("name", FieldKind::String)];
    const FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::required("id", FieldKind::Number),
        FieldDescriptor::optional("tag", FieldKind::String),
        FieldDescriptor::object("inner", true, INNER),
    ];

    #[test]
    fn test_non_object_root() {
        let errors = check_shape(&json!([1, 2]), "Thing", FIELDS);
        assert_eq!(errors, vec!["'Thing' must be an object".to_string()]);
    }

    #[test]
    fn test_reports_every_violation_with_paths() {
        let errors = check_shape(&json!({"id": "7", "inner": {}}), "Thing", FIELDS);
        assert_eq!(
            errors,
            vec![
                "'id' property must be a number".to_string(),
                "'inner.name' property is missing".to_string(),
            ]
        );
    }

    #[test]
    fn test_null_optional_is_absent() {
        let errors = check_shape(
            &json!({"id": 1, "tag": null, "inner": {"name": "x"}}),
            "Thing",
            FIELDS,
        );
        assert!(errors.is_empty());

        let errors = check_shape(&json!({"id": null, "inner": {"name": "x"}}), "Thing", FIELDS);
        assert_eq!(errors, vec!["'id' property must be a number".to_string()]);
    }
}
