use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ShimError;

/// Settings of one generation run.
///
/// Loaded from an optional JSON file; every key may be omitted. CLI flags and
/// plugin parameters override what the file says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Prepended to every exported shim symbol.
    pub symbol_prefix: String,
    /// Go package clause of the host wrapper.
    pub host_package:  String,
    pub native_file:   String,
    pub host_file:     String,
    /// Schema file that only describes the rule vocabulary. A run whose last
    /// file is this one produces nothing.
    pub bootstrap_file: String,
    pub import_paths:  Vec<PathBuf>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            symbol_prefix:  "wasm_bridge_".to_string(),
            host_package:   "bridge".to_string(),
            native_file:    "bind.c".to_string(),
            host_file:      "bind.go".to_string(),
            bootstrap_file: shimwright_schema::BOOTSTRAP_FILE.to_string(),
            import_paths:   Vec::new(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_json(text: &str) -> Result<Self, ShimError> {
        let config: GeneratorConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ShimError> {
        let text = fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading generator config");
        Self::from_json(&text)
    }

    /// Applies a plugin parameter string: `key=value` pairs separated by commas.
    pub fn apply_parameter(&mut self, parameter: &str) -> Result<(), ShimError> {
        for pair in parameter.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ShimError::ConfigError(format!("parameter {:?} is not key=value", pair)))?;
            let value = value.trim().to_string();
            match key.trim() {
                "prefix" => self.symbol_prefix = value,
                "package" => self.host_package = value,
                "native_file" => self.native_file = value,
                "host_file" => self.host_file = value,
                other => return Err(ShimError::ConfigError(format!("unknown parameter {:?}", other))),
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ShimError> {
        if !is_identifier(&self.host_package) {
            return Err(ShimError::ConfigError(format!(
                "host package {:?} is not a valid Go identifier",
                self.host_package
            )));
        }
        if !self.symbol_prefix.is_empty() && !is_identifier(&self.symbol_prefix) {
            return Err(ShimError::ConfigError(format!(
                "symbol prefix {:?} is not a valid C identifier",
                self.symbol_prefix
            )));
        }
        if self.native_file.is_empty() || self.host_file.is_empty() {
            return Err(ShimError::ConfigError("output file names must not be empty".to_string()));
        }
        if self.native_file == self.host_file {
            return Err(ShimError::ConfigError(format!(
                "native and host artifacts both write to {}",
                self.native_file
            )));
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => chars.all(|c| c == '_' || c.is_ascii_alphanumeric()),
        _ => false,
    }
}
