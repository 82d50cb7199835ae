//! Strict boolean coercion for the `success` flag.

use serde_json::Value;

/// Coerce a loosely typed outcome flag into a strict boolean.
///
/// `true`, `"true"` and `1` are true; `false`, `"false"`, `0`, `null` and a missing value are
/// false. Anything else follows JavaScript truthiness, so clients that send `"yes"` or `{}` get
/// the same answer they would in the browser.
pub fn normalize_success(raw: Option<&Value>) -> bool {
    match raw {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.as_str() {
            "true" => true,
            "false" => false,
            other => !other.is_empty(),
        },
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// What to actually write when the live schema may still mark `success` as required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessWrite {
    pub value: bool,
    /// The recorded value differs from the real outcome.
    pub degraded: bool,
}

/// A required bool rejects `false`, so the only writable value is `true`.
pub fn success_for_write(value: bool, live_required: bool) -> SuccessWrite {
    if live_required && !value {
        SuccessWrite {
            value: true,
            degraded: true,
        }
    } else {
        SuccessWrite { value, degraded: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_truthy_values() {
        assert!(normalize_success(Some(&json!(true))));
        assert!(normalize_success(Some(&json!("true"))));
        assert!(normalize_success(Some(&json!(1))));
    }

    #[test]
    fn test_canonical_falsy_values() {
        assert!(!normalize_success(Some(&json!(false))));
        assert!(!normalize_success(Some(&json!("false"))));
        assert!(!normalize_success(Some(&json!(0))));
        assert!(!normalize_success(Some(&Value::Null)));
        assert!(!normalize_success(None));
    }

    #[test]
    fn test_other_values_follow_truthiness() {
        assert!(normalize_success(Some(&json!("yes"))));
        assert!(normalize_success(Some(&json!("0"))));
        assert!(!normalize_success(Some(&json!(""))));
        assert!(normalize_success(Some(&json!(-2.5))));
        assert!(!normalize_success(Some(&json!(0.0))));
        assert!(normalize_success(Some(&json!([]))));
        assert!(normalize_success(Some(&json!({}))));
    }

    #[test]
    fn test_success_for_write() {
        assert_eq!(
            success_for_write(false, false),
            SuccessWrite {
                value: false,
                degraded: false
            }
        );
        assert_eq!(
            success_for_write(true, true),
            SuccessWrite {
                value: true,
                degraded: false
            }
        );
        assert_eq!(
            success_for_write(false, true),
            SuccessWrite {
                value: true,
                degraded: true
            }
        );
    }
}
