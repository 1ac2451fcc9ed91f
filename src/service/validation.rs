//! Request validation from per-column rules.

use crate::config::{ResolvedEntity, ValidationRule};
use crate::error::AppError;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex"));
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("invalid url regex"));

pub struct RequestValidator;

impl RequestValidator {
    /// Validate body against per-column rules. All required fields must be present.
    pub fn validate(body: &Map<String, Value>, rules: &HashMap<String, ValidationRule>) -> Result<(), AppError> {
        let mut cols: Vec<&String> = rules.keys().collect();
        cols.sort();
        for col in cols {
            let rule = &rules[col];
            let val = body.get(col);
            if rule.required == Some(true) && val.map_or(true, Value::is_null) {
                return Err(AppError::Validation(format!("{} is required", col)));
            }
            if let Some(v) = val {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (for PATCH). Present required fields may not be null.
    pub fn validate_partial(body: &Map<String, Value>, rules: &HashMap<String, ValidationRule>) -> Result<(), AppError> {
        for (col, v) in body {
            let Some(rule) = rules.get(col) else { continue };
            if rule.required == Some(true) && v.is_null() {
                return Err(AppError::Validation(format!("{} may not be null", col)));
            }
            validate_field(col, v, rule)?;
        }
        Ok(())
    }
}

/// Keep only writable columns of `entity`; unknown and read-only keys are dropped.
pub fn writable_body(entity: &ResolvedEntity, body: Value) -> Result<Map<String, Value>, AppError> {
    let Value::Object(map) = body else {
        return Err(AppError::BadRequest("body must be a JSON object".into()));
    };
    Ok(map
        .into_iter()
        .filter(|(k, _)| entity.column(k).map_or(false, |c| !c.read_only))
        .collect())
}

/// Trim and collapse runs of whitespace to one space.
pub fn strip_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if rule.min_length.is_some() || rule.max_length.is_some() {
        let s = v
            .as_str()
            .ok_or_else(|| AppError::Validation(format!("{} must be a string", col)))?;
        let len = strip_spaces(s).chars().count();
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(AppError::Validation(format!("{} must be at least {} characters", col, min)));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(AppError::Validation(format!("{} must be at most {} characters", col, max)));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            let names: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
            return Err(AppError::Validation(format!("{} must be one of: {}", col, names.join(", "))));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let ok = match format.to_lowercase().as_str() {
        "email" => v.as_str().map_or(false, |s| EMAIL_RE.is_match(s)),
        "url" => v.as_str().map_or(false, |s| URL_RE.is_match(s)),
        "date" => v
            .as_str()
            .map_or(false, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        "integer" => match v {
            Value::Number(n) => n.is_i64(),
            Value::String(s) => s.parse::<i64>().is_ok(),
            _ => false,
        },
        "boolean" => v.is_boolean(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        let expected = match format {
            "email" => "a valid email",
            "url" => "an http(s) URL",
            "date" => "a date (YYYY-MM-DD)",
            "integer" => "an integer",
            "boolean" => "a boolean",
            other => other,
        };
        Err(AppError::Validation(format!("{} must be {}", col, expected)))
    }
}
