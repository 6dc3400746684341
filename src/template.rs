//! Template interpolation for job files
//!
//! Handles `{{ env.NAME }}` and `{{ vars.path }}` interpolation in YAML job
//! definitions so credentials stay out of the file itself.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}").expect("valid regex")
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Job-level variables (`vars:` block)
    pub vars: Value,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding the current process environment
    pub fn from_process_env() -> Self {
        Self {
            env: std::env::vars().collect(),
            vars: Value::Null,
        }
    }

    /// Set an environment variable
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set job variables
    pub fn set_vars(&mut self, vars: Value) -> &mut Self {
        self.vars = vars;
        self
    }

    /// Get a value by path (e.g., "vars.pi.host" or "env.PI_PASSWORD")
    pub fn get(&self, path: &str) -> Option<Value> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["env", name] => self.env.get(*name).map(|v| Value::String(v.clone())),
            ["vars", rest @ ..] if !rest.is_empty() => {
                get_nested_value(&self.vars, rest).cloned()
            }
            _ => None,
        }
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        match current {
            Value::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut result = template.to_string();
    let mut errors = Vec::new();

    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let full_match = cap.get(0).unwrap().as_str();
        let var_path = cap.get(1).unwrap().as_str();

        match ctx.get(var_path) {
            Some(value) => {
                result = result.replace(full_match, &value_to_string(&value));
            }
            None => errors.push(var_path.to_string()),
        }
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render every string scalar in a YAML document
pub fn render_yaml(value: &serde_yaml::Value, ctx: &TemplateContext) -> Result<serde_yaml::Value> {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::String(s) if has_templates(s) => Ok(Yaml::String(render(s, ctx)?)),
        Yaml::Mapping(map) => {
            let mut rendered = serde_yaml::Mapping::new();
            for (k, v) in map {
                rendered.insert(k.clone(), render_yaml(v, ctx)?);
            }
            Ok(Yaml::Mapping(rendered))
        }
        Yaml::Sequence(items) => Ok(Yaml::Sequence(
            items
                .iter()
                .map(|v| render_yaml(v, ctx))
                .collect::<Result<Vec<_>>>()?,
        )),
        _ => Ok(value.clone()),
    }
}
