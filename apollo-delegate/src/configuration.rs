//! Engine configuration.
//!
//! ```yaml
//! validate_requests: true
//! type_merging:
//!   enabled: true
//!   max_depth: 32
//! ```

use std::str::FromStr;

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigurationError;

/// Configuration of delegation and type merging.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Validate delegated requests against the target subschema before execution.
    /// Individual delegations may still opt out with `skip_validation`.
    /// default: true
    #[serde(default = "default_validate_requests")]
    pub validate_requests: bool,

    /// Type merging settings
    #[serde(default)]
    pub type_merging: TypeMerging,
}

/// Type merging settings.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TypeMerging {
    /// Resolve fields of merged types from other subschemas.
    /// When disabled, every delegation returns the raw result of one subschema.
    /// default: true
    #[serde(default = "default_type_merging_enabled")]
    pub enabled: bool,

    /// How deep nested merged objects are resolved below a delegated field.
    /// default: 32
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_validate_requests() -> bool {
    true
}

fn default_type_merging_enabled() -> bool {
    true
}

fn default_max_depth() -> usize {
    32
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            validate_requests: default_validate_requests(),
            type_merging: Default::default(),
        }
    }
}

impl Default for TypeMerging {
    fn default() -> Self {
        Self {
            enabled: default_type_merging_enabled(),
            max_depth: default_max_depth(),
        }
    }
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(
        validate_requests: Option<bool>,
        type_merging: Option<bool>,
        max_depth: Option<usize>,
    ) -> Self {
        Self {
            validate_requests: validate_requests.unwrap_or_else(default_validate_requests),
            type_merging: TypeMerging {
                enabled: type_merging.unwrap_or_else(default_type_merging_enabled),
                max_depth: max_depth.unwrap_or_else(default_max_depth),
            },
        }
    }

    /// Parse a configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let configuration: Configuration = serde_yaml::from_str(yaml)?;
        configuration.validate()?;
        Ok(configuration)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.type_merging.enabled && self.type_merging.max_depth == 0 {
            return Err(ConfigurationError::InvalidValue {
                name: "type_merging.max_depth".to_string(),
                reason: "must be at least 1 when type merging is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Generate a JSON schema for the configuration.
    pub fn json_schema() -> RootSchema {
        let settings = SchemaSettings::draft07().with(|s| {
            s.option_nullable = true;
            s.option_add_null_type = false;
            s.inline_subschemas = true;
        });
        settings
            .into_generator()
            .into_root_schema_for::<Configuration>()
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml(s)
    }
}
