//! Input validators shared by the storage layer and routine management.
//! Each one returns the cleaned value so callers store exactly what passed.

use crate::error::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_ROUTINE_NAME_LEN: usize = 100;
pub const MAX_TAG_LEN: usize = 50;

/// Room left in a task title once a single-template routine appends
/// `" - YYYY-MM-DD"` to it.
pub const MAX_TEMPLATE_TITLE_LEN: usize = MAX_TITLE_LEN - " - YYYY-MM-DD".len();

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap());

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\s_-]+$").unwrap());

static HEX_COLOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

fn non_empty<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    Ok(value)
}

fn at_most(value: &str, field: &'static str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn task_title(title: &str) -> Result<String, ValidationError> {
    let title = non_empty(title, "task title")?;
    at_most(title, "task title", MAX_TITLE_LEN)?;
    Ok(title.to_string())
}

pub fn template_title(title: &str) -> Result<String, ValidationError> {
    let title = non_empty(title, "template title")?;
    at_most(title, "template title", MAX_TEMPLATE_TITLE_LEN)?;
    Ok(title.to_string())
}

pub fn routine_name(name: &str) -> Result<String, ValidationError> {
    let name = non_empty(name, "routine name")?;
    at_most(name, "routine name", MAX_ROUTINE_NAME_LEN)?;
    Ok(name.to_string())
}

pub fn tag_name(name: &str) -> Result<String, ValidationError> {
    let name = non_empty(name, "tag name")?;
    at_most(name, "tag name", MAX_TAG_LEN)?;
    if !TAG_REGEX.is_match(name) {
        return Err(ValidationError::Format {
            field: "tag name",
            reason: "only letters, numbers, spaces, underscores and hyphens are allowed",
        });
    }
    Ok(name.to_string())
}

pub fn username(name: &str) -> Result<String, ValidationError> {
    let name = non_empty(name, "username")?;
    if name.chars().count() < 3 {
        return Err(ValidationError::Format {
            field: "username",
            reason: "must be at least 3 characters long",
        });
    }
    at_most(name, "username", 50)?;
    if !USERNAME_REGEX.is_match(name) {
        return Err(ValidationError::Format {
            field: "username",
            reason: "must start with a letter or number and contain only letters, numbers, underscores and hyphens",
        });
    }
    Ok(name.to_string())
}

/// Accepts `RRGGBB` or `#RRGGBB` and returns the upper-cased `#RRGGBB` form.
pub fn hex_color(color: &str) -> Result<String, ValidationError> {
    let color = non_empty(color, "color")?;
    let color = if color.starts_with('#') {
        color.to_string()
    } else {
        format!("#{}", color)
    };
    if !HEX_COLOR_REGEX.is_match(&color) {
        return Err(ValidationError::Format {
            field: "color",
            reason: "use #RRGGBB",
        });
    }
    Ok(color.to_uppercase())
}

/// Strips control characters (except newlines and tabs) and surrounding whitespace.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}
