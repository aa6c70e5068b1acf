use crate::utils::error::{CacheError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> CacheError {
    CacheError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Fixture, manifest and config paths: must name something and be passable to the OS.
pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    match path {
        p if p.trim().is_empty() => Err(invalid(field_name, path, "no file given")),
        p if p.contains('\0') => Err(invalid(field_name, path.escape_default(), "NUL byte in file name")),
        _ => Ok(()),
    }
}

/// Capacities and timeouts where zero (or anything under `min_value`) would
/// stall the cache.
pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value >= min_value {
        return Ok(());
    }
    Err(invalid(field_name, value, format!("needs at least {}", min_value)))
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field_name, value, "blank"));
    }
    Ok(())
}

/// Cache key segments are joined with `_`, so whitespace would produce keys
/// that memcached-style backends reject.
pub fn validate_key_segment(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;
    match value.char_indices().find(|(_, c)| c.is_whitespace() || c.is_control()) {
        Some((at, _)) => Err(invalid(
            field_name,
            value.escape_default(),
            format!("cache key segment has whitespace or control character at byte {}", at),
        )),
        None => Ok(()),
    }
}

pub fn validate_one_of(field_name: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(field_name, value, format!("supported: {}", allowed.join(" | "))))
    }
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if (min..=max).contains(&value) {
        return Ok(());
    }
    Err(invalid(field_name, value, format!("outside {}..={}", min, max)))
}
