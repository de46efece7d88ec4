//! Manifest parser.
//!
//! This module loads `reefline.yaml`, applies environment overrides and
//! reads API credentials from the environment.

use crate::error::{ConfigError, ReeflineError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::Manifest;

/// Environment variable holding the API token.
pub const TOKEN_VAR: &str = "DIGITALOCEAN_TOKEN";
/// Environment variable holding the object-storage access key id.
pub const SPACES_KEY_VAR: &str = "SPACES_ACCESS_KEY_ID";
/// Environment variable holding the object-storage secret key.
pub const SPACES_SECRET_VAR: &str = "SPACES_SECRET_ACCESS_KEY";

/// Manifest parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

/// Credentials read from the environment.
#[derive(Clone)]
pub struct Credentials {
    /// API token.
    pub token: String,
    /// Object-storage access key pair, when available.
    pub spaces: Option<(String, String)>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("spaces", &self.spaces.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory `.env` is read from.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(ReeflineError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ReeflineError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Manifest> {
        debug!("Parsing YAML manifest");

        let manifest: Manifest = serde_yaml::from_str(content).map_err(|e| {
            ReeflineError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            "Parsed manifest for project {} with {} resources",
            manifest.project.name,
            manifest.resources.len()
        );
        Ok(manifest)
    }

    /// Loads a manifest and applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let mut manifest = self.load_file(path)?;
        Self::apply_env_overrides(&mut manifest, |key| std::env::var(key).ok());
        Ok(manifest)
    }

    /// Applies `REEFLINE_*` overrides using the given variable lookup.
    pub fn apply_env_overrides(manifest: &mut Manifest, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("REEFLINE_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            manifest.project.name = name;
        }

        if let Some(url) = lookup("REEFLINE_API_URL") {
            debug!("Overriding provider.api_url from environment");
            manifest.provider.api_url = url;
        }

        if let Some(path) = lookup("REEFLINE_STATE_PATH") {
            debug!("Overriding state.path from environment");
            manifest.state.path = path;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ReeflineError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Reads credentials using the given variable lookup.
    ///
    /// The object-storage key pair is only required when `need_spaces` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty.
    pub fn credentials(
        lookup: impl Fn(&str) -> Option<String>,
        need_spaces: bool,
    ) -> Result<Credentials> {
        let require = |name: &str| {
            lookup(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                ReeflineError::Config(ConfigError::MissingEnvVar {
                    name: name.to_string(),
                })
            })
        };

        let token = require(TOKEN_VAR)?;
        let spaces = if need_spaces {
            Some((require(SPACES_KEY_VAR)?, require(SPACES_SECRET_VAR)?))
        } else {
            None
        };

        Ok(Credentials { token, spaces })
    }

    /// Reads credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty.
    pub fn credentials_from_env(need_spaces: bool) -> Result<Credentials> {
        Self::credentials(|key| std::env::var(key).ok(), need_spaces)
    }
}

/// Manifest file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["reefline.yaml", "reefline.yml"];

/// Finds the manifest in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found manifest: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ReeflineError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::ResourceSpec;
    use std::collections::HashMap;

    const MANIFEST: &str = r"
project:
  name: shop
provider:
  timeout_secs: 10
resources:
  - name: api
    external_name: shop-api-1
    spec:
      kind: droplet
      region: nyc1
      size: s-1vcpu-1gb
      image: ubuntu-20-04-x64
  - name: db
    publish_connection: true
    spec:
      kind: database
      engine: pg
      num_nodes: 1
      size: db-s-1vcpu-1gb
      region: nyc1
";

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = ConfigParser::new().parse_yaml(MANIFEST, None).expect("parse");
        assert_eq!(manifest.project.name, "shop");
        assert_eq!(manifest.provider.timeout_secs, 10);
        assert_eq!(manifest.resources.len(), 2);
        assert_eq!(manifest.resources[0].external_name.as_deref(), Some("shop-api-1"));
        assert!(manifest.resources[1].publish_connection);
        assert!(matches!(manifest.resources[1].spec, ResourceSpec::Database(_)));
    }

    #[test]
    fn test_parse_error_carries_location() {
        let err = ConfigParser::new()
            .parse_yaml("project: [", Some(Path::new("bad.yaml")))
            .expect_err("invalid yaml");
        match err {
            ReeflineError::Config(ConfigError::ParseError { location, .. }) => {
                assert_eq!(location.as_deref(), Some("bad.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = ConfigParser::new().parse_yaml(MANIFEST, None).expect("parse");
        let vars = env(&[
            ("REEFLINE_PROJECT_NAME", "shop-staging"),
            ("REEFLINE_STATE_PATH", "/tmp/reefline"),
        ]);
        ConfigParser::apply_env_overrides(&mut manifest, |k| vars.get(k).cloned());

        assert_eq!(manifest.project.name, "shop-staging");
        assert_eq!(manifest.state.path, "/tmp/reefline");
        assert_eq!(manifest.provider.api_url, crate::cloud::DEFAULT_API_URL);
    }

    #[test]
    fn test_credentials() {
        let vars = env(&[(TOKEN_VAR, "dop_v1_abc")]);
        let creds = ConfigParser::credentials(|k| vars.get(k).cloned(), false).expect("token");
        assert_eq!(creds.token, "dop_v1_abc");
        assert!(creds.spaces.is_none());
        assert!(!format!("{creds:?}").contains("dop_v1_abc"));

        let err = ConfigParser::credentials(|k| vars.get(k).cloned(), true).expect_err("no keys");
        assert!(matches!(
            err,
            ReeflineError::Config(ConfigError::MissingEnvVar { ref name }) if name == SPACES_KEY_VAR
        ));

        let empty = env(&[(TOKEN_VAR, "")]);
        assert!(ConfigParser::credentials(|k| empty.get(k).cloned(), false).is_err());
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("reefline.yaml"), MANIFEST).expect("write");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, dir.path().join("reefline.yaml"));

        let manifest = ConfigParser::new().load_file(&found).expect("load");
        assert_eq!(manifest.project.name, "shop");
    }

    #[test]
    fn test_init_template_is_valid() {
        let manifest = ConfigParser::new()
            .parse_yaml(include_str!("../../templates/reefline.yaml"), None)
            .expect("template parses");
        assert_eq!(manifest.resources.len(), 4);
        let result = crate::config::ConfigValidator::new()
            .validate(&manifest)
            .expect("template validates");
        assert!(result.is_valid());
    }
}
