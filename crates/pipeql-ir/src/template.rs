//! Render `{{ variable }}` placeholders in a raw pipeline before typing it

use std::collections::HashMap;
use thiserror::Error;

use crate::Pipeline;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Unknown template variable '{0}'")]
    UnknownVariable(String),

    #[error("Unterminated placeholder in '{0}'")]
    Unterminated(String),

    #[error("Invalid pipeline after rendering: {0}")]
    Invalid(#[from] serde_json::Error),
}

pub type Variables = HashMap<String, serde_json::Value>;

/// Substitute variables into every string of `raw`, then parse the result.
///
/// A string consisting of a single placeholder takes the variable's JSON
/// value as is; placeholders embedded in longer text are spliced in as text.
pub fn render_pipeline(raw: &serde_json::Value, variables: &Variables) -> Result<Pipeline, TemplateError> {
    let rendered = render_value(raw, variables)?;
    Ok(serde_json::from_value(rendered)?)
}

pub fn render_value(value: &serde_json::Value, variables: &Variables) -> Result<serde_json::Value, TemplateError> {
    Ok(match value {
        serde_json::Value::String(s) => render_string(s, variables)?,
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| render_value(item, variables))
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                rendered.insert(key.clone(), render_value(item, variables)?);
            }
            serde_json::Value::Object(rendered)
        }
        other => other.clone(),
    })
}

fn lookup<'a>(name: &str, variables: &'a Variables) -> Result<&'a serde_json::Value, TemplateError> {
    let mut parts = name.split('.');
    let head = parts.next().unwrap_or_default();
    let mut current = variables
        .get(head)
        .ok_or_else(|| TemplateError::UnknownVariable(name.to_string()))?;
    for part in parts {
        current = current
            .get(part)
            .ok_or_else(|| TemplateError::UnknownVariable(name.to_string()))?;
    }
    Ok(current)
}

fn render_string(text: &str, variables: &Variables) -> Result<serde_json::Value, TemplateError> {
    if !text.contains("{{") {
        return Ok(serde_json::Value::String(text.to_string()));
    }

    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix("{{").and_then(|t| t.strip_suffix("}}")) {
        if !inner.contains("{{") && !inner.contains("}}") {
            return lookup(inner.trim(), variables).cloned();
        }
    }

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Unterminated(text.to_string()))?;
        match lookup(after[..end].trim(), variables)? {
            serde_json::Value::String(s) => output.push_str(s),
            other => output.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    Ok(serde_json::Value::String(output))
}
