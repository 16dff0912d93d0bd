//! Configuration menus
//!
//! Every package type declares an ordered menu of options. Resolving a menu
//! against user-supplied values produces a [`ResolvedConfig`]:
//!
//! - supplied values are coerced to the option's type and checked against
//!   its choices
//! - missing values take the option's default, or fail when there is none
//! - string defaults may reference earlier options (`${port}`), context
//!   variables such as `${private_dir}`, and environment variables
//! - keys not on the menu pass through untouched
//!
//! Options resolve strictly in declaration order, so resolving an already
//! resolved config yields the same config.

use std::collections::BTreeMap;
use std::env;
use std::fmt;

use corral_core::{Env, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// User-supplied option values, keyed by option name
pub type ConfigMap = BTreeMap<String, Value>;

/// The type of a menu option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Int,
    Float,
    Bool,
    #[default]
    Str,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Int => write!(f, "int"),
            OptionType::Float => write!(f, "float"),
            OptionType::Bool => write!(f, "bool"),
            OptionType::Str => write!(f, "str"),
        }
    }
}

/// One user-settable knob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationOption {
    pub name: String,

    #[serde(default, alias = "msg")]
    pub description: String,

    #[serde(rename = "type", default)]
    pub option_type: OptionType,

    /// `None` makes the option required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
}

impl ConfigurationOption {
    pub fn new(name: impl Into<String>, option_type: OptionType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            option_type,
            default: None,
            choices: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_choices<V: Into<Value>>(mut self, choices: impl IntoIterator<Item = V>) -> Self {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_required(&self) -> bool {
        matches!(self.default, None | Some(Value::Null))
    }

    /// Coerce a value to this option's type and enforce its choices
    pub fn check(&self, value: &Value) -> Result<Value> {
        let coerced = coerce(self.option_type, value).ok_or_else(|| {
            Error::validation(
                &self.name,
                format!("expected {}, got {}", self.option_type, value),
            )
        })?;

        if let Some(choices) = &self.choices {
            let allowed = choices
                .iter()
                .filter_map(|c| coerce(self.option_type, c))
                .any(|c| c == coerced);
            if !allowed {
                return Err(Error::validation(
                    &self.name,
                    format!("{} is not one of [{}]", coerced, join_values(choices)),
                ));
            }
        }

        Ok(coerced)
    }
}

/// The ordered option menu of a package type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationSchema {
    options: Vec<ConfigurationOption>,
}

impl ConfigurationSchema {
    pub fn new(options: Vec<ConfigurationOption>) -> Self {
        Self { options }
    }

    /// Append an option
    pub fn option(mut self, option: ConfigurationOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(&self) -> &[ConfigurationOption] {
        &self.options
    }

    pub fn get(&self, name: &str) -> Option<&ConfigurationOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Resolve user-supplied values against the menu
    ///
    /// `vars` supplies extra names visible to derived defaults; menu options
    /// resolved earlier take precedence over them, and both take precedence
    /// over the process environment.
    pub fn resolve(&self, supplied: &ConfigMap, vars: &Env) -> Result<ResolvedConfig> {
        let mut resolved = ResolvedConfig::default();

        for option in &self.options {
            let value = match supplied.get(&option.name) {
                Some(value) if !value.is_null() => option.check(value)?,
                _ => match &option.default {
                    Some(Value::String(template)) => {
                        let expanded = expand_default(&option.name, template, &resolved, vars)?;
                        option.check(&Value::String(expanded))?
                    }
                    Some(default) if !default.is_null() => option.check(default)?,
                    _ => return Err(Error::missing_required(&option.name)),
                },
            };
            resolved.insert(option.name.clone(), value);
        }

        for (key, value) in supplied {
            if self.get(key).is_none() {
                resolved.insert(key.clone(), value.clone());
            }
        }

        Ok(resolved)
    }
}

/// A fully resolved package configuration
///
/// Packages read it through [`ResolvedConfig::to_typed`] into their own
/// structs, and may add derived keys during configure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedConfig(BTreeMap<String, Value>);

impl ResolvedConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Store any serializable value under `key`
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Store every field of a serializable struct as a top-level key
    pub fn merge<T: Serialize>(&mut self, value: &T) -> Result<()> {
        match serde_json::to_value(value)? {
            Value::Object(fields) => {
                self.0.extend(fields);
                Ok(())
            }
            other => Err(Error::invalid_config(format!(
                "cannot merge non-object value {} into a package configuration",
                other
            ))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The config as user-supplied values, for re-resolving
    pub fn to_map(&self) -> ConfigMap {
        self.0.clone()
    }

    /// The config as a JSON object, e.g. for template contexts
    pub fn to_object(&self) -> Map<String, Value> {
        self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Deserialize into a package's typed configuration
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.to_object()))
            .map_err(|e| Error::invalid_config(format!("package configuration: {}", e)))
    }
}

impl From<ConfigMap> for ResolvedConfig {
    fn from(map: ConfigMap) -> Self {
        Self(map)
    }
}

fn coerce(option_type: OptionType, value: &Value) -> Option<Value> {
    match (option_type, value) {
        (OptionType::Int, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Value::from),
        (OptionType::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (OptionType::Float, Value::Number(n)) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
        (OptionType::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (OptionType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (OptionType::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        (OptionType::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (OptionType::Str, Value::String(s)) => Some(Value::String(s.clone())),
        (OptionType::Str, Value::Number(n)) => Some(Value::String(n.to_string())),
        (OptionType::Str, Value::Bool(b)) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn expand_default(
    option: &str,
    template: &str,
    resolved: &ResolvedConfig,
    vars: &Env,
) -> Result<String> {
    let lookup = |name: &str| -> std::result::Result<Option<String>, env::VarError> {
        if let Some(value) = resolved.get(name) {
            return Ok(Some(value_to_string(value)));
        }
        if let Some(value) = vars.get(name) {
            return Ok(Some(value.clone()));
        }
        match env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(e),
        }
    };

    shellexpand::env_with_context(template, lookup)
        .map(|s| s.into_owned())
        .map_err(|e| {
            Error::validation(option, format!("cannot expand default '{}': {}", template, e))
        })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn join_values(values: &[Value]) -> String {
    values.iter().map(value_to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn port_protocol_menu() -> ConfigurationSchema {
        ConfigurationSchema::default()
            .option(ConfigurationOption::new("port", OptionType::Int).with_default(3334))
            .option(
                ConfigurationOption::new("protocol", OptionType::Str)
                    .with_default("tcp")
                    .with_choices(["tcp", "ib"]),
            )
    }

    fn supplied(value: Value) -> ConfigMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults_fill_unsupplied_options() {
        let resolved = port_protocol_menu()
            .resolve(&supplied(json!({"protocol": "ib"})), &Env::new())
            .unwrap();
        assert_eq!(resolved.get_i64("port"), Some(3334));
        assert_eq!(resolved.get_str("protocol"), Some("ib"));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_choice_violation_is_validation_error() {
        let err = port_protocol_menu()
            .resolve(&supplied(json!({"protocol": "udp"})), &Env::new())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref option, .. } if option == "protocol"));
    }

    #[test]
    fn test_missing_required_option() {
        let menu = ConfigurationSchema::default().option(ConfigurationOption::new("ofs_data_dir", OptionType::Str));
        let err = menu.resolve(&ConfigMap::new(), &Env::new()).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredOption { ref option } if option == "ofs_data_dir"));
    }

    #[test]
    fn test_string_values_are_coerced() {
        let menu = ConfigurationSchema::default()
            .option(ConfigurationOption::new("port", OptionType::Int).with_default(1))
            .option(ConfigurationOption::new("sudoenv", OptionType::Bool).with_default(true))
            .option(ConfigurationOption::new("ratio", OptionType::Float).with_default(0.5));
        let resolved = menu
            .resolve(&supplied(json!({"port": "8080", "sudoenv": "no", "ratio": "2"})), &Env::new())
            .unwrap();
        assert_eq!(resolved.get_i64("port"), Some(8080));
        assert_eq!(resolved.get_bool("sudoenv"), Some(false));
        assert_eq!(resolved.get("ratio"), Some(&json!(2.0)));
    }

    #[test]
    fn test_bad_int_is_validation_error() {
        let err = port_protocol_menu()
            .resolve(&supplied(json!({"port": "eighty"})), &Env::new())
            .unwrap_err();
        assert!(err.to_string().contains("expected int"));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let resolved = port_protocol_menu()
            .resolve(&supplied(json!({"server_host_set": ["a", "b"]})), &Env::new())
            .unwrap();
        assert_eq!(resolved.get("server_host_set"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_derived_default_references_earlier_option_and_vars() {
        let menu = ConfigurationSchema::default()
            .option(ConfigurationOption::new("name", OptionType::Str).with_default("ofs"))
            .option(ConfigurationOption::new("mount", OptionType::Str).with_default("${private_dir}/${name}"));
        let mut vars = Env::new();
        vars.insert("private_dir".to_string(), "/p/pkg".to_string());

        let resolved = menu.resolve(&ConfigMap::new(), &vars).unwrap();
        assert_eq!(resolved.get_str("mount"), Some("/p/pkg/ofs"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let menu = port_protocol_menu();
        let once = menu.resolve(&supplied(json!({"port": "9000", "x": 1})), &Env::new()).unwrap();
        let twice = menu.resolve(&once.to_map(), &Env::new()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_menu_from_yaml() {
        let yaml = r#"
- name: port
  msg: The port to listen on
  type: int
  default: 3334
- name: protocol
  choices: [tcp, ib]
  default: tcp
"#;
        let menu: ConfigurationSchema = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(menu.len(), 2);
        assert_eq!(menu.options()[0].description, "The port to listen on");
        assert_eq!(menu.options()[1].option_type, OptionType::Str);
        assert!(!menu.options()[1].is_required());
    }

    #[test]
    fn test_to_typed() {
        #[derive(Deserialize)]
        struct Typed {
            port: u16,
            protocol: String,
        }
        let resolved = port_protocol_menu().resolve(&ConfigMap::new(), &Env::new()).unwrap();
        let typed: Typed = resolved.to_typed().unwrap();
        assert_eq!(typed.port, 3334);
        assert_eq!(typed.protocol, "tcp");
    }
}
