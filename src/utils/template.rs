//! Archive name templates.
//!
//! Exactly four placeholders are recognized: `{name}`, `{version}`,
//! `{tree_ish}` and `{datetime:<strftime format>}`. `{{` and `}}` produce
//! literal braces. Anything else in braces is rejected.
//!
//! Substituted values never contain `/`: `release/1.0` renders as
//! `release-1.0`, so one placeholder is always one path segment.

use std::fmt::Write;
use std::sync::LazyLock;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use regex::Regex;

use crate::error::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").unwrap());

/// Format used when `{datetime}` carries no format of its own.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone)]
pub struct NameVars<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub tree_ish: &'a str,
    pub datetime: DateTime<Local>,
}

fn push_segment(out: &mut String, value: &str) {
    out.extend(value.chars().map(|c| if c == '/' { '-' } else { c }));
}

fn invalid(template: &str, problem: impl Into<String>) -> Error {
    Error::config_invalid_value("name_format", Some(template.to_string()), problem)
}

/// Expand every placeholder in `template`.
pub fn render_name(template: &str, vars: &NameVars<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        match whole.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" | "}" => return Err(invalid(template, "unbalanced brace")),
            _ => {
                let field = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                expand(template, field, vars, &mut out)?;
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

fn expand(template: &str, field: &str, vars: &NameVars<'_>, out: &mut String) -> Result<()> {
    let (key, format) = match field.split_once(':') {
        Some((key, format)) => (key, Some(format)),
        None => (field, None),
    };

    match (key, format) {
        ("name", None) => push_segment(out, vars.name),
        ("version", None) => push_segment(out, vars.version),
        ("tree_ish", None) => push_segment(out, vars.tree_ish),
        ("datetime", format) => {
            let format = format.unwrap_or(DEFAULT_DATETIME_FORMAT);
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(invalid(
                    template,
                    format!("invalid datetime format '{}'", format),
                ));
            }
            let mut rendered = String::new();
            write!(rendered, "{}", vars.datetime.format(format)).map_err(|_| {
                invalid(template, format!("cannot render datetime format '{}'", format))
            })?;
            push_segment(out, &rendered);
        }
        ("name" | "version" | "tree_ish", Some(_)) => {
            return Err(invalid(
                template,
                format!("placeholder '{{{}}}' does not take a format", key),
            ));
        }
        _ => {
            return Err(invalid(
                template,
                format!(
                    "unknown placeholder '{{{}}}' (expected name, version, tree_ish or datetime)",
                    field
                ),
            ));
        }
    }

    Ok(())
}
