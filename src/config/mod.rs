//! Manifest configuration.
//!
//! This module handles:
//! - Parsing `reefline.yaml` and applying environment overrides
//! - Reading credentials from the environment
//! - Validation of declared resources
//! - Spec fingerprints for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{
    ConfigParser, Credentials, DEFAULT_CONFIG_FILES, SPACES_KEY_VAR, SPACES_SECRET_VAR, TOKEN_VAR,
    find_config_file,
};
pub use spec::{
    Manifest, ProjectConfig, ProviderConfig, ResourceConfig, ResourceSpec, StateConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
