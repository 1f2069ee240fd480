// vpt-controllers/src/params.rs
// ============================================================================
// Module: Command Parameter Validation
// Description: Lightweight structural checks for a command's opaque `params`
//              map against the `CommandSpec.param_schema` a driver declares.
// Purpose: Catch malformed params at dispatch time with a stable
//          `ValidationError`, before they reach a driver's `execute`.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Actions and verifications carry `params` as an opaque map (§3); the only
//! structure the spec imposes is that some keys (`wait_time`, `timeout`) have
//! a known shape when present. `param_schema` here is deliberately not a full
//! JSON Schema implementation — it is a small set of field descriptors
//! (`required`, `type`) sufficient to reject obviously malformed commands
//! before a driver ever sees them, matching the registry's fail-closed
//! posture for untrusted external input.

use serde_json::Value;

/// One field descriptor inside a `param_schema` document.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Any,
}

impl FieldSpec {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), required: true, kind }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), required: false, kind }
    }
}

/// Validates `params` against `fields`. `params` must be a JSON object (an
/// empty object is valid when every field is optional).
///
/// # Errors
/// Returns a human-readable message naming the first missing or mistyped
/// field.
pub fn validate(fields: &[FieldSpec], params: &Value) -> Result<(), String> {
    let Value::Object(map) = params else {
        return Err("params must be a JSON object".to_string());
    };

    for field in fields {
        match map.get(field.name.as_str()) {
            Some(value) => {
                if !matches_kind(value, field.kind) {
                    return Err(format!("param \"{}\" has the wrong type", field.name));
                }
            }
            None if field.required => {
                return Err(format!("missing required param \"{}\"", field.name));
            }
            None => {}
        }
    }
    Ok(())
}

fn matches_kind(value: &Value, kind: FieldKind) -> bool {
    match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::Bool => value.is_boolean(),
        FieldKind::Any => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_params_with_all_required_fields_present() {
        let fields = vec![FieldSpec::required("key", FieldKind::String)];
        let params = serde_json::json!({"key": "OK"});
        assert!(validate(&fields, &params).is_ok());
    }

    #[test]
    fn rejects_missing_required_field() {
        let fields = vec![FieldSpec::required("key", FieldKind::String)];
        let params = serde_json::json!({});
        assert!(validate(&fields, &params).unwrap_err().contains("key"));
    }

    #[test]
    fn rejects_wrong_type() {
        let fields = vec![FieldSpec::required("key", FieldKind::String)];
        let params = serde_json::json!({"key": 1});
        assert!(validate(&fields, &params).is_err());
    }

    #[test]
    fn optional_field_absent_is_fine() {
        let fields = vec![FieldSpec::optional("wait_time", FieldKind::Number)];
        let params = serde_json::json!({});
        assert!(validate(&fields, &params).is_ok());
    }

    #[test]
    fn rejects_non_object_params() {
        let fields: Vec<FieldSpec> = vec![];
        let params = serde_json::json!([1, 2, 3]);
        assert!(validate(&fields, &params).is_err());
    }
}
