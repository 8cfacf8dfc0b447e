//! Layered configuration.
//!
//! Values come from, in decreasing precedence: command-line flags (clap also
//! folds in `QLEDGER_*` environment variables), an optional TOML file, and
//! built-in defaults.
//!
//! ```toml
//! [registry]
//! url = "https://queries.example.com/api"
//! token_env = "QLEDGER_TOKEN"
//! timeout_secs = 30
//!
//! [columns]
//! id = "query_id"
//! status = "status"
//! result_size = "result_size"
//!
//! [reconcile]
//! persist = "each-completion"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ToolError};
use crate::model::ColumnNames;
use crate::reconcile::{PersistMode, ReconcileOptions};

/// Timeout applied to every registry request unless configured otherwise.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Contents of the TOML configuration file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub registry: RegistrySection,
    pub columns: ColumnsSection,
    pub reconcile: ReconcileSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySection {
    pub url: Option<String>,
    pub token_env: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnsSection {
    pub id: Option<String>,
    pub status: Option<String>,
    pub result_size: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileSection {
    pub persist: Option<PersistMode>,
}

impl FileConfig {
    /// Reads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        Self::parse(&source)
    }

    pub fn parse(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }
}

/// Values supplied on the command line. `None` defers to the lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub registry_url: Option<String>,
    pub token_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub id_column: Option<String>,
    pub status_column: Option<String>,
    pub size_column: Option<String>,
    pub persist: Option<PersistMode>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Unset is allowed: a ledger with no pending rows never needs the registry.
    pub registry_url: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
    pub options: ReconcileOptions,
}

impl Settings {
    /// Merges the layers, reading the bearer token from the process environment.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        Self::resolve_with(file, overrides, |name| std::env::var(name).ok())
    }

    /// Same as [`Settings::resolve`] with an injectable environment lookup.
    pub fn resolve_with(
        file: FileConfig,
        overrides: Overrides,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let FileConfig {
            registry,
            columns,
            reconcile,
        } = file;

        let registry_url = overrides.registry_url.or(registry.url);

        let token = match overrides.token_env.or(registry.token_env) {
            Some(name) => Some(lookup_env(&name).ok_or_else(|| {
                ToolError::InvalidConfig(format!("token variable {name} is not set"))
            })?),
            None => None,
        };

        let timeout_secs = overrides
            .timeout_secs
            .or(registry.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ToolError::InvalidConfig(
                "timeout must be at least one second".into(),
            ));
        }

        let defaults = ColumnNames::default();
        let columns = ColumnNames {
            id: overrides.id_column.or(columns.id).unwrap_or(defaults.id),
            status: overrides
                .status_column
                .or(columns.status)
                .unwrap_or(defaults.status),
            result_size: overrides
                .size_column
                .or(columns.result_size)
                .unwrap_or(defaults.result_size),
        };
        validate_columns(&columns)?;

        let persist = overrides
            .persist
            .or(reconcile.persist)
            .unwrap_or_default();

        Ok(Self {
            registry_url,
            token,
            timeout: Duration::from_secs(timeout_secs),
            options: ReconcileOptions { columns, persist },
        })
    }
}

fn validate_columns(columns: &ColumnNames) -> Result<()> {
    let names = [&columns.id, &columns.status, &columns.result_size];
    if names.iter().any(|name| name.is_empty()) {
        return Err(ToolError::InvalidConfig("column names must not be empty".into()));
    }
    if columns.id == columns.status
        || columns.id == columns.result_size
        || columns.status == columns.result_size
    {
        return Err(ToolError::InvalidConfig(
            "identifier, status and result-size columns must be distinct".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_when_only_url_is_given() {
        let overrides = Overrides {
            registry_url: Some("http://localhost:9000".into()),
            ..Overrides::default()
        };
        let settings = Settings::resolve_with(FileConfig::default(), overrides, no_env).unwrap();

        assert_eq!(settings.registry_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(settings.token, None);
        assert_eq!(settings.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(settings.options.columns, ColumnNames::default());
        assert_eq!(settings.options.persist, PersistMode::EachCompletion);
    }

    #[test]
    fn flags_override_file_values() {
        let file = FileConfig::parse(
            r#"
            [registry]
            url = "http://from-file"
            timeout_secs = 5

            [columns]
            id = "job"
            status = "state"

            [reconcile]
            persist = "end-of-run"
            "#,
        )
        .unwrap();
        let overrides = Overrides {
            registry_url: Some("http://from-flag".into()),
            status_column: Some("phase".into()),
            ..Overrides::default()
        };

        let settings = Settings::resolve_with(file, overrides, no_env).unwrap();

        assert_eq!(settings.registry_url.as_deref(), Some("http://from-flag"));
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.options.columns.id, "job");
        assert_eq!(settings.options.columns.status, "phase");
        assert_eq!(settings.options.columns.result_size, "result_size");
        assert_eq!(settings.options.persist, PersistMode::EndOfRun);
    }

    #[test]
    fn token_is_read_from_named_variable() {
        let file = FileConfig::parse(
            "[registry]\nurl = \"http://x\"\ntoken_env = \"QUERY_TOKEN\"\n",
        )
        .unwrap();
        let settings = Settings::resolve_with(file.clone(), Overrides::default(), |name| {
            (name == "QUERY_TOKEN").then(|| "abc".to_string())
        })
        .unwrap();
        assert_eq!(settings.token.as_deref(), Some("abc"));

        let missing = Settings::resolve_with(file, Overrides::default(), no_env);
        assert!(matches!(missing, Err(ToolError::InvalidConfig(_))));
    }

    #[test]
    fn missing_url_is_left_unset() {
        let settings =
            Settings::resolve_with(FileConfig::default(), Overrides::default(), no_env).unwrap();
        assert_eq!(settings.registry_url, None);
    }

    #[test]
    fn clashing_columns_are_rejected() {
        let overrides = Overrides {
            registry_url: Some("http://x".into()),
            size_column: Some("status".into()),
            ..Overrides::default()
        };
        let result = Settings::resolve_with(FileConfig::default(), overrides, no_env);
        assert!(matches!(result, Err(ToolError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = FileConfig::parse("[registry]\nendpoint = \"http://x\"\n");
        assert!(matches!(result, Err(ToolError::ConfigParse(_))));
    }
}
