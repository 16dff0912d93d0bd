//! Per-host command templates
//!
//! Commands may reference `{{ host }}`, `{{ role }}` and `{{ index }}`,
//! which the dispatcher fills in for each host, plus any variables the
//! caller attaches. Commands without `{{`/`{%` markers are passed through
//! untouched so shell syntax like `${VAR}` never reaches Tera.

use corral_core::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tera::{Context, Tera};

#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    source: String,
    vars: Map<String, Value>,
}

impl CommandTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            vars: Map::new(),
        }
    }

    /// Attach variables visible to the template
    pub fn with_vars(mut self, vars: Map<String, Value>) -> Self {
        self.vars.extend(vars);
        self
    }

    /// Attach a single variable
    pub fn with_var(mut self, key: impl Into<String>, value: impl Serialize) -> Result<Self> {
        self.vars.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_templated(&self) -> bool {
        self.source.contains("{{") || self.source.contains("{%")
    }

    /// Render for one host of a group
    pub fn render_for(&self, host: &str, role: &str, index: usize) -> Result<String> {
        if !self.is_templated() {
            return Ok(self.source.clone());
        }
        let mut vars = self.vars.clone();
        vars.insert("host".to_string(), Value::from(host));
        vars.insert("role".to_string(), Value::from(role));
        vars.insert("index".to_string(), Value::from(index));
        self.render_with(vars)
    }

    /// Render without host variables
    pub fn render(&self) -> Result<String> {
        if !self.is_templated() {
            return Ok(self.source.clone());
        }
        self.render_with(self.vars.clone())
    }

    fn render_with(&self, vars: Map<String, Value>) -> Result<String> {
        let context = Context::from_value(Value::Object(vars))
            .map_err(|e| Error::Template(e.to_string()))?;
        Tera::one_off(&self.source, &context, false).map_err(|e| {
            Error::Template(format!("failed to render '{}': {}", self.source, source_chain(&e)))
        })
    }
}

impl From<&str> for CommandTemplate {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for CommandTemplate {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

fn source_chain(err: &tera::Error) -> String {
    let mut msg = err.to_string();
    let mut cause = std::error::Error::source(err);
    while let Some(inner) = cause {
        msg.push_str(": ");
        msg.push_str(&inner.to_string());
        cause = inner.source();
    }
    msg
}
