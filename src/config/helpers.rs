// src/config/helpers.rs
// Helpers for reading and aggregating environment-variable errors.
//
// These push onto a shared error list instead of panicking, so the loader
// can report every invalid field in one pass rather than failing on the
// first one.

use std::env;
use std::str::FromStr;

/// Read a required env var, recording a message in `errors` if absent.
pub fn require_env(key: &str, errors: &mut Vec<String>) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        Ok(_) => {
            errors.push(format!("{key}: must not be empty"));
            String::new()
        }
        Err(_) => {
            errors.push(format!("{key}: missing required environment variable"));
            String::new()
        }
    }
}

/// Read an optional env var with a default.
pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an optional env var with a default, recording a parse error.
pub fn env_parsed_or<T: FromStr>(key: &str, default: T, errors: &mut Vec<String>) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|e| {
            errors.push(format!("{key}: failed to parse '{v}': {e}"));
            default
        }),
        Err(_) => default,
    }
}

/// Read a required, parsed env var, recording any error.
pub fn require_env_parsed<T: FromStr>(key: &str, errors: &mut Vec<String>) -> T
where
    T: Default,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|e| {
            errors.push(format!("{key}: failed to parse '{v}': {e}"));
            T::default()
        }),
        Err(_) => {
            errors.push(format!("{key}: missing required environment variable"));
            T::default()
        }
    }
}

/// Parse a comma-separated list, trimming entries and dropping empties.
pub fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
