//! Field coercion from raw text tokens to typed values.
//!
//! Coercion never fails on bad data: an unparseable token becomes null (or
//! NaN for doubles) and the failure is written to the error log with the
//! field name. Only a missing declared type is an error.

use crate::constants::{BOOLEAN_TRUE_LITERAL, TIMESTAMP_FORMAT};
use crate::error::{PipelineError, Result};
use crate::schema::DeclaredType;
use chrono::NaiveDateTime;
use tracing::error;

/// A coerced field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i32),
    Double(f64),
    String(String),
    Timestamp(NaiveDateTime),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Integer(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

/// Coerce a raw token for `field` into its declared type.
///
/// Returns an error only when no declared type is supplied.
pub fn coerce(field: &str, raw: Option<&str>, declared: Option<&DeclaredType>) -> Result<Value> {
    let declared = declared.ok_or_else(|| {
        PipelineError::configuration(format!("Type not supplied for field '{}'", field))
    })?;
    Ok(coerce_declared(field, raw, declared))
}

/// Coerce a raw token for `field` into `declared`. Never fails.
pub fn coerce_declared(field: &str, raw: Option<&str>, declared: &DeclaredType) -> Value {
    match declared {
        DeclaredType::Double => coerce_double(field, raw),
        DeclaredType::String => match raw {
            None | Some("") => Value::Null,
            Some(s) => Value::String(s.to_string()),
        },
        DeclaredType::Integer => match raw {
            None => Value::Null,
            Some(s) => match s.parse::<i32>() {
                Ok(v) => Value::Integer(v),
                Err(e) => log_failure(field, s, e),
            },
        },
        DeclaredType::Timestamp => match raw {
            None => Value::Null,
            Some(s) => match NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
                Ok(v) => Value::Timestamp(v),
                Err(e) => log_failure(field, s, e),
            },
        },
        DeclaredType::Boolean => match raw {
            None => Value::Null,
            Some(s) => Value::Boolean(s == BOOLEAN_TRUE_LITERAL),
        },
        DeclaredType::Unrecognized(_) => Value::Null,
    }
}

fn coerce_double(field: &str, raw: Option<&str>) -> Value {
    // Doubles tolerate surrounding whitespace; integers do not
    let s = match raw.map(str::trim) {
        None | Some("") => return Value::Double(f64::NAN),
        Some(s) if s.eq_ignore_ascii_case("nan") => return Value::Double(f64::NAN),
        Some(s) => s,
    };
    match s.parse::<f64>() {
        Ok(v) => Value::Double(v),
        Err(e) => {
            log_failure(field, s, e);
            Value::Double(f64::NAN)
        }
    }
}

fn log_failure(field: &str, raw: &str, err: impl std::fmt::Display) -> Value {
    error!(field = field, raw = raw, error = %err, "Failed to coerce field value");
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn double(raw: Option<&str>) -> f64 {
        double_for("value", raw)
    }

    fn double_for(field: &str, raw: Option<&str>) -> f64 {
        coerce_declared(field, raw, &DeclaredType::Double)
            .as_f64()
            .expect("doubles always coerce to a number")
    }

    #[test]
    fn test_double_nan_policy() {
        assert!(double(None).is_nan());
        assert!(double(Some("")).is_nan());
        assert!(double(Some("NaN")).is_nan());
        assert!(double(Some("nan")).is_nan());
        assert!(double(Some("abc")).is_nan());
        assert_eq!(double(Some("12.5")), 12.5);
        assert_eq!(double(Some("-3")), -3.0);
    }

    #[test]
    fn test_double_trims_whitespace_but_integer_does_not() {
        assert_eq!(double(Some(" 12.5")), 12.5);
        assert_eq!(double(Some("7.25 \t")), 7.25);
        assert!(double(Some("  ")).is_nan());
        assert_eq!(
            coerce_declared("i", Some(" 7"), &DeclaredType::Integer),
            Value::Null
        );
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLog {
        type Writer = CapturedLog;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Run `f` with a subscriber that records every event as text
    fn logged(f: impl FnOnce()) -> String {
        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(log.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = log.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_unparseable_double_logs_error_with_field_name() {
        let output = logged(|| {
            assert!(double_for("pressure", Some("abc")).is_nan());
        });

        assert!(output.contains("ERROR"), "no error event in {:?}", output);
        assert!(output.contains("pressure"), "field name missing in {:?}", output);
        assert!(output.contains("abc"));
    }

    #[test]
    fn test_missing_doubles_are_not_logged() {
        let output = logged(|| {
            assert!(double_for("pressure", Some("NaN")).is_nan());
            assert!(double_for("pressure", Some("")).is_nan());
            assert!(double_for("pressure", None).is_nan());
        });

        assert!(output.is_empty(), "unexpected log output {:?}", output);
    }

    #[test]
    fn test_unparseable_timestamp_logs_error() {
        let output = logged(|| {
            coerce_declared("timestamp", Some("yesterday"), &DeclaredType::Timestamp);
        });

        assert!(output.contains("ERROR"));
        assert!(output.contains("timestamp"));
    }

    #[test]
    fn test_string_null_distinction() {
        assert_eq!(coerce_declared("s", None, &DeclaredType::String), Value::Null);
        assert_eq!(coerce_declared("s", Some(""), &DeclaredType::String), Value::Null);
        assert_eq!(
            coerce_declared("s", Some("x"), &DeclaredType::String),
            Value::String("x".to_string())
        );
    }

    #[test]
    fn test_boolean_literal() {
        let ty = DeclaredType::Boolean;
        assert_eq!(coerce_declared("b", Some("1"), &ty), Value::Boolean(true));
        assert_eq!(coerce_declared("b", Some("0"), &ty), Value::Boolean(false));
        assert_eq!(coerce_declared("b", Some("yes"), &ty), Value::Boolean(false));
        assert_eq!(coerce_declared("b", Some("true"), &ty), Value::Boolean(false));
    }

    #[test]
    fn test_integer_parsing() {
        let ty = DeclaredType::Integer;
        assert_eq!(coerce_declared("i", Some("42"), &ty), Value::Integer(42));
        assert_eq!(coerce_declared("i", Some("-7"), &ty), Value::Integer(-7));
        assert_eq!(coerce_declared("i", Some("4.2"), &ty), Value::Null);
        assert_eq!(coerce_declared("i", Some(""), &ty), Value::Null);
        assert_eq!(coerce_declared("i", None, &ty), Value::Null);
    }

    #[test]
    fn test_timestamp_parsing() {
        let ty = DeclaredType::Timestamp;
        let expected = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap();

        assert_eq!(
            coerce_declared("t", Some("2020-01-01 10:15:00"), &ty),
            Value::Timestamp(expected)
        );
        assert_eq!(coerce_declared("t", Some("2020-01-01T10:15:00"), &ty), Value::Null);
        assert_eq!(coerce_declared("t", Some("yesterday"), &ty), Value::Null);
    }

    #[test]
    fn test_unrecognized_type_is_silently_null() {
        let ty = DeclaredType::Unrecognized("decimal".to_string());
        assert_eq!(coerce_declared("u", Some("1.5"), &ty), Value::Null);
    }

    #[test]
    fn test_missing_declared_type_fails_fast() {
        match coerce("pressure", Some("1.0"), None).unwrap_err() {
            PipelineError::Configuration { message } => assert!(message.contains("pressure")),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_coercion_is_idempotent() {
        let cases = [
            (Some("1.25"), DeclaredType::Double),
            (Some("garbage"), DeclaredType::Double),
            (Some("17"), DeclaredType::Integer),
            (Some("x"), DeclaredType::String),
            (Some("2019-01-01 12:00:00"), DeclaredType::Timestamp),
            (Some("1"), DeclaredType::Boolean),
            (None, DeclaredType::String),
        ];

        for (raw, ty) in cases {
            let first = coerce("f", raw, Some(&ty)).unwrap();
            let second = coerce("f", raw, Some(&ty)).unwrap();
            match (&first, &second) {
                (Value::Double(a), Value::Double(b)) if a.is_nan() => assert!(b.is_nan()),
                _ => assert_eq!(first, second),
            }
        }
    }
}
