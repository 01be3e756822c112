// ABOUTME: Configuration and environment variable management for Runbox
// ABOUTME: Typed environment lookups with range validation and fallback to defaults

pub mod constants;

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

/// Read an environment variable and parse it, falling back to `default` when
/// the variable is unset, unparseable, or rejected by `valid`.
///
/// Invalid values are logged at warn level so misconfiguration is visible
/// without being fatal.
pub fn env_parsed<T>(name: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Display,
{
    match env::var(name) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) if valid(&value) => value,
            Ok(value) => {
                warn!(
                    "{} value {} out of range, using default {}",
                    name, value, default
                );
                default
            }
            Err(_) => {
                warn!("{} value {:?} is not valid, using default {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a string environment variable, falling back to `default` when unset
/// or empty.
pub fn env_string(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_falls_back_when_unset() {
        let value = env_parsed("RUNBOX_TEST_UNSET_VAR", 42u64, |_| true);
        assert_eq!(value, 42);
    }

    #[test]
    fn parsed_rejects_out_of_range() {
        env::set_var("RUNBOX_TEST_RANGE_VAR", "0");
        let value = env_parsed("RUNBOX_TEST_RANGE_VAR", 64i64, |v| *v > 0);
        assert_eq!(value, 64);
        env::remove_var("RUNBOX_TEST_RANGE_VAR");
    }

    #[test]
    fn parsed_accepts_valid_value() {
        env::set_var("RUNBOX_TEST_VALID_VAR", "256");
        let value = env_parsed("RUNBOX_TEST_VALID_VAR", 128u64, |v| *v > 0);
        assert_eq!(value, 256);
        env::remove_var("RUNBOX_TEST_VALID_VAR");
    }

    #[test]
    fn string_falls_back_when_empty() {
        env::set_var("RUNBOX_TEST_EMPTY_VAR", "");
        assert_eq!(env_string("RUNBOX_TEST_EMPTY_VAR", "fallback"), "fallback");
        env::remove_var("RUNBOX_TEST_EMPTY_VAR");
    }
}
