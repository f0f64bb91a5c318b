//! Argument schemas: registration-time checks and dispatch-time coercion.
//!
//! Only the subset of JSON schema the tools actually declare is understood:
//! an `object` with typed `properties` and a `required` list.

use serde_json::{Map, Number, Value};

// Floats in this range convert to i64 exactly, without saturating.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

const ALLOWED_TYPES: &[&str] = &["string", "number", "integer", "boolean", "object", "array"];

/// Check that a tool's declared schema is usable.
pub fn validate_schema(schema: &Value) -> Result<(), String> {
    let obj = schema
        .as_object()
        .ok_or_else(|| "schema must be a JSON object".to_string())?;

    if obj.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Err("schema type must be \"object\"".to_string());
    }

    let empty = Map::new();
    let properties = match obj.get("properties") {
        None => &empty,
        Some(Value::Object(props)) => props,
        Some(_) => return Err("`properties` must be an object".to_string()),
    };

    for (name, prop) in properties {
        let ty = prop
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| format!("property `{name}` has no type"))?;
        if !ALLOWED_TYPES.contains(&ty) {
            return Err(format!("property `{name}` has unsupported type `{ty}`"));
        }
    }

    for key in required_keys(schema) {
        if !properties.contains_key(key) {
            return Err(format!("required key `{key}` is not declared in properties"));
        }
    }
    Ok(())
}

fn required_keys(schema: &Value) -> impl Iterator<Item = &str> {
    schema
        .get("required")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|k| k.as_str())
}

/// Validate `args` against `schema`, returning the coerced arguments.
///
/// Every violation is collected so the model sees them all at once.
pub fn coerce_args(schema: &Value, args: &Map<String, Value>) -> Result<Map<String, Value>, Vec<String>> {
    let mut violations = Vec::new();
    let mut coerced = args.clone();

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, prop) in properties {
            let Some(value) = args.get(name) else {
                continue;
            };
            if value.is_null() {
                coerced.remove(name);
                continue;
            }
            let ty = prop.get("type").and_then(|t| t.as_str()).unwrap_or("string");
            match coerce_value(ty, value) {
                Some(v) => {
                    coerced.insert(name.clone(), v);
                }
                None => violations.push(format!(
                    "argument `{name}` must be {}, got {}",
                    article(ty),
                    describe(value)
                )),
            }
        }
    }

    for key in required_keys(schema) {
        match coerced.get(key) {
            None => violations.push(format!("missing required argument `{key}`")),
            Some(Value::String(s)) if s.is_empty() => {
                violations.push(format!("argument `{key}` must not be blank"));
            }
            Some(_) => {}
        }
    }

    if violations.is_empty() {
        Ok(coerced)
    } else {
        Err(violations)
    }
}

fn coerce_value(ty: &str, value: &Value) -> Option<Value> {
    match (ty, value) {
        ("string", Value::String(s)) => Some(Value::String(s.trim().to_string())),
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),

        ("number", Value::Number(_)) => Some(value.clone()),
        ("number", Value::String(s)) => {
            let parsed: f64 = s.trim().replace(',', ".").parse().ok()?;
            Number::from_f64(parsed).map(Value::Number)
        }

        ("integer", Value::Number(n)) => match n.as_i64() {
            Some(_) => Some(value.clone()),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(f))
                .map(|f| Value::from(f as i64)),
        },
        ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

        ("boolean", Value::Bool(_)) => Some(value.clone()),
        ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },

        ("object", Value::Object(_)) | ("array", Value::Array(_)) => Some(value.clone()),
        _ => None,
    }
}

fn article(ty: &str) -> String {
    match ty {
        "integer" | "object" | "array" => format!("an {ty}"),
        _ => format!("a {ty}"),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a non-numeric string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "nome": {"type": "string"},
                "whatsapp": {"type": "string"},
                "origem": {"type": "string"}
            },
            "required": ["nome", "whatsapp", "origem"]
        })
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rejects_required_key_missing_from_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"servico": {"type": "string"}},
            "required": ["servico", "preco"]
        });
        let err = validate_schema(&schema).unwrap_err();
        assert!(err.contains("preco"));
    }

    #[test]
    fn rejects_non_object_schema_and_unknown_types() {
        assert!(validate_schema(&json!({"type": "string"})).is_err());
        let schema = json!({"type": "object", "properties": {"x": {"type": "date"}}});
        assert!(validate_schema(&schema).is_err());
        assert!(validate_schema(&json!({"type": "object", "properties": {}})).is_ok());
    }

    #[test]
    fn numbers_become_strings_and_strings_are_trimmed() {
        let coerced = coerce_args(
            &lead_schema(),
            &args(json!({"nome": "  Ana Souza ", "whatsapp": 5511999990000i64, "origem": "WhatsApp"})),
        )
        .unwrap();
        assert_eq!(coerced["nome"], "Ana Souza");
        assert_eq!(coerced["whatsapp"], "5511999990000");
    }

    #[test]
    fn every_violation_is_reported() {
        let err = coerce_args(
            &lead_schema(),
            &args(json!({"nome": "   ", "origem": ["x"]})),
        )
        .unwrap_err();
        assert_eq!(err.len(), 3);
        assert!(err.iter().any(|v| v.contains("`nome` must not be blank")));
        assert!(err.iter().any(|v| v.contains("missing required argument `whatsapp`")));
        assert!(err.iter().any(|v| v.contains("`origem` must be a string")));
    }

    #[test]
    fn numeric_strings_parse_for_number_fields() {
        let schema = json!({
            "type": "object",
            "properties": {"valor": {"type": "number"}, "qtd": {"type": "integer"}},
            "required": ["valor"]
        });
        let coerced = coerce_args(&schema, &args(json!({"valor": "150,50", "qtd": "2"}))).unwrap();
        assert_eq!(coerced["valor"], json!(150.5));
        assert_eq!(coerced["qtd"], json!(2));

        let err = coerce_args(&schema, &args(json!({"valor": "caro"}))).unwrap_err();
        assert!(err[0].contains("`valor` must be a number"));
    }

    #[test]
    fn whole_floats_fit_integer_fields_but_huge_ones_do_not() {
        let schema = json!({
            "type": "object",
            "properties": {"qtd": {"type": "integer"}},
            "required": ["qtd"]
        });
        let coerced = coerce_args(&schema, &args(json!({"qtd": 3.0}))).unwrap();
        assert_eq!(coerced["qtd"], json!(3));

        let err = coerce_args(&schema, &args(json!({"qtd": 1e20}))).unwrap_err();
        assert!(err[0].contains("`qtd` must be an integer"));
    }

    #[test]
    fn null_required_argument_is_missing() {
        let err = coerce_args(
            &lead_schema(),
            &args(json!({"nome": null, "whatsapp": "1", "origem": "x"})),
        )
        .unwrap_err();
        assert_eq!(err, vec!["missing required argument `nome`".to_string()]);
    }
}
