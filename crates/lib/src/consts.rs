//! Names and defaults shared across the crate.

pub const APP_NAME: &str = "docmatrix";

/// Prefix for environment variables that override configuration values.
pub const ENV_PREFIX: &str = "DOCMATRIX_";

pub const DEFAULT_CONFIG_FILE: &str = "build.yaml";
pub const DEFAULT_ENTRY_DOCUMENT: &str = "template.adoc";
pub const DEFAULT_METADATA_FILE: &str = "version.properties";
pub const DEFAULT_OUTPUT_DIR: &str = "workspace/build";
pub const DEFAULT_DIST_DIR: &str = "workspace/dist";
pub const DEFAULT_ARTIFACT_PREFIX: &str = "template";
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_FORMAT_PRIORITY: i64 = 1;

/// Metadata keys every language must define.
pub const REQUIRED_METADATA_KEYS: [&str; 2] = ["revnumber", "revdate"];

/// Flavor that turns on the `show-help` document attribute.
pub const HELP_FLAVOR: &str = "withHelp";

/// Directory inside a language subtree holding referenced images.
pub const IMAGES_DIR: &str = "images";
