//! Trailing-argument conventions for timer calls.
//!
//! Dynamic callers pass the wait (and for throttle/debounce, an `immediate`
//! flag) at the end of the argument list. These helpers split them off.

use serde_json::Value;

use crate::core::Args;

/// True for numbers and for strings containing a digit.
#[must_use]
pub fn is_coercible_number(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.bytes().any(|b| b.is_ascii_digit()),
        _ => false,
    }
}

/// Read a wait in milliseconds.
///
/// Numbers are truncated, strings are read from their leading integer
/// (`"25ms"` is 25). Anything unreadable or negative is 0.
#[must_use]
pub fn coerce_wait(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(truncate))
            .unwrap_or(0),
        Value::String(s) => parse_leading_int(s),
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn truncate(f: f64) -> u64 {
    f.trunc() as u64
}

fn parse_leading_int(s: &str) -> u64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if negative || end == 0 {
        return 0;
    }
    digits[..end].parse().unwrap_or(u64::MAX)
}

/// Split a trailing wait off `args`; defaults to 0 when absent.
#[must_use]
pub fn split_timer_args(mut args: Args) -> (Args, u64) {
    let wait = match args.last() {
        Some(last) if is_coercible_number(last) => args.pop().map_or(0, |v| coerce_wait(&v)),
        _ => 0,
    };
    (args, wait)
}

/// Split `[.., wait]` or `[.., wait, immediate]` off `args`.
///
/// `immediate` is `None` when the caller did not pass a flag.
#[must_use]
pub fn split_debounce_args(mut args: Args) -> (Args, u64, Option<bool>) {
    let Some(last) = args.pop() else {
        return (args, 0, None);
    };
    if is_coercible_number(&last) {
        return (args, coerce_wait(&last), None);
    }
    let immediate = last == Value::Bool(true);
    let wait = args.pop().map_or(0, |v| coerce_wait(&v));
    (args, wait, Some(immediate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_wait() {
        assert_eq!(coerce_wait(&json!(10)), 10);
        assert_eq!(coerce_wait(&json!(12.9)), 12);
        assert_eq!(coerce_wait(&json!(-4)), 0);
        assert_eq!(coerce_wait(&json!("25")), 25);
        assert_eq!(coerce_wait(&json!("  25ms")), 25);
        assert_eq!(coerce_wait(&json!("abc")), 0);
        assert_eq!(coerce_wait(&json!(null)), 0);
    }

    #[test]
    fn test_split_timer_args() {
        assert_eq!(split_timer_args(vec![]), (vec![], 0));
        assert_eq!(split_timer_args(vec![json!("batman"), json!(0)]), (vec![json!("batman")], 0));
        assert_eq!(
            split_timer_args(vec![json!("a"), json!("b"), json!("10")]),
            (vec![json!("a"), json!("b")], 10)
        );
        // A non-numeric last argument stays an argument.
        assert_eq!(split_timer_args(vec![json!("batman")]), (vec![json!("batman")], 0));
    }

    #[test]
    fn test_split_debounce_args() {
        assert_eq!(split_debounce_args(vec![json!(50)]), (vec![], 50, None));
        assert_eq!(
            split_debounce_args(vec![json!("x"), json!(20), json!(true)]),
            (vec![json!("x")], 20, Some(true))
        );
        assert_eq!(
            split_debounce_args(vec![json!(20), json!(false)]),
            (vec![], 20, Some(false))
        );
        assert_eq!(split_debounce_args(vec![]), (vec![], 0, None));
    }
}
