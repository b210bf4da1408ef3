//! Providers shipped with the engine

use serde_json::Value;

use super::registry::{Capability, ProviderEntry, ProviderModule};

/// Package of the bundled providers
pub const BUILTIN_PACKAGE: &str = "stencil.builtin";

inventory::submit! {
    ProviderModule::new(BUILTIN_PACKAGE, "strings", Capability::Functions, &[
        ProviderEntry::Function("upper", upper),
        ProviderEntry::Function("lower", lower),
        ProviderEntry::Function("concat", concat),
        ProviderEntry::Function("default", default_value),
    ])
}

inventory::submit! {
    ProviderModule::new(BUILTIN_PACKAGE, "values", Capability::Methods, &[
        ProviderEntry::Function("length", length),
        ProviderEntry::Function("join", join),
    ])
}

inventory::submit! {
    ProviderModule::new(BUILTIN_PACKAGE, "text", Capability::Tags, &[
        ProviderEntry::Tag("trim", trim),
        ProviderEntry::Tag("repeat", repeat),
    ])
}

/// Text form of a value as it appears in output
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn first(args: &[Value], function: &str) -> Result<Value, String> {
    args.first()
        .cloned()
        .ok_or_else(|| format!("{function} expects at least one argument"))
}

fn upper(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(display(&first(args, "upper")?).to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(display(&first(args, "lower")?).to_lowercase()))
}

fn concat(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(args.iter().map(display).collect()))
}

fn default_value(args: &[Value]) -> Result<Value, String> {
    match args {
        [value, fallback, ..] => {
            let empty = match value {
                Value::Null => true,
                Value::String(text) => text.is_empty(),
                _ => false,
            };
            Ok(if empty { fallback.clone() } else { value.clone() })
        }
        _ => Err("default expects a value and a fallback".to_string()),
    }
}

fn length(args: &[Value]) -> Result<Value, String> {
    let len = match first(args, "length")? {
        Value::String(text) => text.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        other => return Err(format!("length is not defined for {other}")),
    };
    Ok(Value::from(len))
}

fn join(args: &[Value]) -> Result<Value, String> {
    let separator = args.get(1).map(display).unwrap_or_else(|| ", ".to_string());
    match first(args, "join")? {
        Value::Array(items) => Ok(Value::String(
            items.iter().map(display).collect::<Vec<_>>().join(&separator),
        )),
        other => Err(format!("join expects an array, got {other}")),
    }
}

fn trim(_args: &[Value], body: &str) -> Result<String, String> {
    Ok(body.trim().to_string())
}

/// Upper bound on the output of a single `repeat` block
const MAX_REPEAT_BYTES: usize = 1 << 20;

fn repeat(args: &[Value], body: &str) -> Result<String, String> {
    let count = args
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| "repeat expects a non-negative count".to_string())?;
    let total = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(body.len()))
        .filter(|total| *total <= MAX_REPEAT_BYTES)
        .ok_or_else(|| "repeat count too large".to_string())?;
    if total == 0 {
        return Ok(String::new());
    }
    Ok(body.repeat(count as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_functions() {
        assert_eq!(upper(&[json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(lower(&[json!("ABC")]).unwrap(), json!("abc"));
        assert_eq!(concat(&[json!("a"), json!(1), json!(null)]).unwrap(), json!("a1"));
        assert!(upper(&[]).is_err());
    }

    #[test]
    fn test_default_replaces_empty_values() {
        assert_eq!(default_value(&[json!(null), json!("x")]).unwrap(), json!("x"));
        assert_eq!(default_value(&[json!(""), json!("x")]).unwrap(), json!("x"));
        assert_eq!(default_value(&[json!(0), json!("x")]).unwrap(), json!(0));
    }

    #[test]
    fn test_value_methods() {
        assert_eq!(length(&[json!("héllo")]).unwrap(), json!(5));
        assert_eq!(length(&[json!([1, 2, 3])]).unwrap(), json!(3));
        assert!(length(&[json!(true)]).is_err());
        assert_eq!(join(&[json!(["a", "b"]), json!("-")]).unwrap(), json!("a-b"));
        assert_eq!(join(&[json!([1, 2])]).unwrap(), json!("1, 2"));
    }

    #[test]
    fn test_text_tags() {
        assert_eq!(trim(&[], "  hi \n").unwrap(), "hi");
        assert_eq!(repeat(&[json!(3)], "ab").unwrap(), "ababab");
        assert!(repeat(&[json!("x")], "ab").is_err());
    }

    #[test]
    fn test_repeat_rejects_oversized_output() {
        let err = repeat(&[json!(u64::MAX)], "ab").unwrap_err();
        assert_eq!(err, "repeat count too large");
        assert!(repeat(&[json!(MAX_REPEAT_BYTES + 1)], "a").is_err());
        assert_eq!(repeat(&[json!(u32::MAX)], "").unwrap(), "");
        assert_eq!(repeat(&[json!(MAX_REPEAT_BYTES)], "a").unwrap().len(), MAX_REPEAT_BYTES);
    }
}
