//! Built-in transformation functions

use super::types::{detail_str, text_of, FunctionContext};
use crate::path::read;
use crate::types::FunctionDetails;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::fmt::Write as _;

const DEFAULT_OUTPUT_FORMAT: &str = "yyyy-MM-dd";

/// Reformat a date or date-time string
///
/// Formats use either Java-style tokens (`dd/MM/yyyy HH:mm`) or chrono `%`
/// patterns. Without `inputFormat` the value must be ISO 8601.
pub fn format_date(value: &Value, details: &FunctionDetails, _ctx: &FunctionContext<'_>) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let input = text_of(value);
    let input = input.trim();
    let output_format = to_chrono_format(detail_str(details, "outputFormat").unwrap_or(DEFAULT_OUTPUT_FORMAT));

    let parsed = match detail_str(details, "inputFormat") {
        Some(format) => parse_with(input, &to_chrono_format(format)),
        None => parse_iso(input),
    }
    .ok_or_else(|| {
        format!(
            "Cannot parse '{input}' as a date with format '{}'",
            detail_str(details, "inputFormat").unwrap_or("ISO 8601")
        )
    })?;

    let mut rendered = String::new();
    let written = match parsed {
        ParsedDate::Zoned(dt) => write!(rendered, "{}", dt.format(&output_format)),
        ParsedDate::Local(dt) => write!(rendered, "{}", dt.format(&output_format)),
    };
    written.map_err(|_| format!("Cannot render '{input}' with output format '{output_format}'"))?;
    Ok(Value::String(rendered))
}

enum ParsedDate {
    Zoned(DateTime<chrono::FixedOffset>),
    Local(NaiveDateTime),
}

fn parse_with(input: &str, format: &str) -> Option<ParsedDate> {
    if let Ok(dt) = DateTime::parse_from_str(input, format) {
        return Some(ParsedDate::Zoned(dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
        return Some(ParsedDate::Local(dt));
    }
    NaiveDate::parse_from_str(input, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(ParsedDate::Local)
}

fn parse_iso(input: &str) -> Option<ParsedDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(ParsedDate::Zoned(dt));
    }
    parse_with(input, "%Y-%m-%dT%H:%M:%S%.f").or_else(|| parse_with(input, "%Y-%m-%d"))
}

/// Translate a Java-style date pattern into a chrono format string
///
/// Strings that already contain `%` are returned unchanged. Quoted text
/// (`'T'`) is copied literally.
pub fn to_chrono_format(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                out.push(chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            out.push(c);
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        let token = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1 | 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', _) => "%d",
            ('H', _) => "%H",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('X' | 'x', 1) => "%z",
            ('X' | 'x', _) => "%:z",
            ('Z', _) => "%z",
            _ => {
                out.extend(std::iter::repeat(c).take(run));
                i += run;
                continue;
            }
        };
        out.push_str(token);
        i += run;
    }
    out
}

/// Upper- or lower-case a string
pub fn string_case(value: &Value, details: &FunctionDetails, _ctx: &FunctionContext<'_>) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let text = text_of(value);
    match detail_str(details, "case").map(str::to_ascii_lowercase).as_deref() {
        Some("upper") => Ok(Value::String(text.to_uppercase())),
        Some("lower") => Ok(Value::String(text.to_lowercase())),
        Some(other) => Err(format!("Unsupported case '{other}', expected 'upper' or 'lower'")),
        None => Err("STRING_CASE transformation requires a 'case' detail".to_string()),
    }
}

/// Translate a code through `map`, falling back to `defaultValue`, then to the input
pub fn code_lookup(value: &Value, details: &FunctionDetails, _ctx: &FunctionContext<'_>) -> Result<Value, String> {
    let Some(map) = details.get("map").and_then(Value::as_object) else {
        return Err("CODE_LOOKUP transformation requires a 'map' object".to_string());
    };
    if value.is_null() {
        return Ok(details.get("defaultValue").cloned().unwrap_or(Value::Null));
    }
    if let Some(mapped) = map.get(&text_of(value)) {
        return Ok(mapped.clone());
    }
    Ok(details
        .get("defaultValue")
        .cloned()
        .unwrap_or_else(|| value.clone()))
}

/// Join named fields of the source item; null when all are empty
pub fn concatenate(_value: &Value, details: &FunctionDetails, ctx: &FunctionContext<'_>) -> Result<Value, String> {
    let Some(fields) = details.get("fields").and_then(Value::as_array) else {
        return Err("CONCATENATE transformation requires a 'fields' list".to_string());
    };
    let separator = detail_str(details, "separator").unwrap_or(" ");

    let parts: Vec<String> = fields
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|field| {
            ctx.source_item
                .get(field)
                .or_else(|| read(ctx.source_item, field))
        })
        .map(text_of)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::String(parts.join(separator)))
    }
}

/// `value` when the input is null, otherwise the input
pub fn default_value(value: &Value, details: &FunctionDetails, _ctx: &FunctionContext<'_>) -> Result<Value, String> {
    if !value.is_null() {
        return Ok(value.clone());
    }
    details
        .get("value")
        .cloned()
        .ok_or_else(|| "DEFAULT_VALUE transformation requires a 'value' detail".to_string())
}
