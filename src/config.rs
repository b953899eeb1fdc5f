//! Configuration for the classifier, the sorting run and input filtering.
//!
//! Configuration is read from TOML. Every section and key is optional; missing
//! values take the defaults shown below.
//!
//! # Configuration File Format
//!
//! ```toml
//! [classifier]
//! host = "http://localhost:11434"
//! model = "llama3"
//! temperature = 0.1
//! timeout_secs = 120
//! taxonomy = ["Career/CV", "Programming/Python", "Others"]
//!
//! [sorting]
//! destination_dir = "Sorted_AI"
//! max_collision_probes = 10000
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.part"]
//! extensions = ["crdownload"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use crate::category::{CategoryError, DEFAULT_TAXONOMY, Taxonomy};
use crate::classifier::{ClientSettings, DEFAULT_HOST, DEFAULT_MODEL};
use crate::placement::DEFAULT_MAX_PROBES;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".docflowrc.toml";

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// A taxonomy entry is not a valid category path.
    #[error("invalid taxonomy entry: {0}")]
    InvalidTaxonomy(#[from] CategoryError),
    /// A value is out of its accepted range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Root configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocflowConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub sorting: SortingConfig,
    #[serde(default)]
    pub filters: FilterRules,
}

/// Settings for the content classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Closed list of categories offered to the model.
    #[serde(default = "default_taxonomy")]
    pub taxonomy: Vec<String>,
}

/// Honors the `OLLAMA_HOST` convention used by the Ollama tooling.
fn default_host() -> String {
    std::env::var("OLLAMA_HOST")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_taxonomy() -> Vec<String> {
    DEFAULT_TAXONOMY.iter().map(|s| s.to_string()).collect()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            taxonomy: default_taxonomy(),
        }
    }
}

impl ClassifierConfig {
    /// Connection settings for the HTTP client.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            host: self.host.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            timeout_secs: self.timeout_secs,
        }
    }

    /// Validated taxonomy.
    pub fn taxonomy(&self) -> Result<Taxonomy, ConfigError> {
        Ok(Taxonomy::new(&self.taxonomy)?)
    }
}

/// Settings for the sorting run itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingConfig {
    /// Name of the output directory created inside the source directory.
    #[serde(default = "default_destination_dir")]
    pub destination_dir: String,
    /// Ceiling on `_N` suffixes tried before a file is reported as failed.
    #[serde(default = "default_max_collision_probes")]
    pub max_collision_probes: u32,
}

fn default_destination_dir() -> String {
    "Sorted_AI".to_string()
}

fn default_max_collision_probes() -> u32 {
    DEFAULT_MAX_PROBES
}

impl Default for SortingConfig {
    fn default() -> Self {
        Self {
            destination_dir: default_destination_dir(),
            max_collision_probes: default_max_collision_probes(),
        }
    }
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default = "default_enable_hidden_files")]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

fn default_enable_hidden_files() -> bool {
    false
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

/// Rules for excluding files from sorting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the file name (e.g., "*.part").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "crdownload").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl DocflowConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.docflowrc.toml` in the current directory
    /// 3. Look for `~/.config/docflow/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read, or if any file found is not valid TOML.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("docflow")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Checks values that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.classifier.taxonomy()?;

        let dest = self.sorting.destination_dir.trim();
        if dest.is_empty() || dest == "." || dest == ".." || dest.contains(['/', '\\']) {
            return Err(ConfigError::InvalidValue {
                field: "sorting.destination_dir",
                reason: format!("'{dest}' must be a single directory name"),
            });
        }
        if self.classifier.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "classifier.model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.classifier.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl FilterRules {
    /// Compile rules into optimized filter structures for matching.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(self)
    }
}

/// Why a file was left out of sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    Hidden,
    Filename,
    Extension(String),
    Pattern(String),
    Regex(String),
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exclusion::Hidden => write!(f, "hidden file"),
            Exclusion::Filename => write!(f, "excluded by name"),
            Exclusion::Extension(ext) => write!(f, "excluded extension .{ext}"),
            Exclusion::Pattern(p) => write!(f, "matches exclude pattern '{p}'"),
            Exclusion::Regex(r) => write!(f, "matches exclude regex '{r}'"),
        }
    }
}

/// Pre-compiled filter rules.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Pattern::new(p).map_err(|_| ConfigError::InvalidGlobPattern(p.clone())))
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Checks a file name against the rules.
    ///
    /// Include patterns win over everything; otherwise hidden files, exact
    /// names, extensions, globs and regexes are checked in that order.
    pub fn exclusion_for(&self, file_name: &str) -> Option<Exclusion> {
        if self.include_patterns.iter().any(|p| p.matches(file_name)) {
            return None;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return Some(Exclusion::Hidden);
        }

        if self.exclude_filenames.contains(file_name) {
            return Some(Exclusion::Filename);
        }

        if let Some(ext) = Path::new(file_name).extension() {
            let ext = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext) {
                return Some(Exclusion::Extension(ext));
            }
        }

        if let Some(p) = self.exclude_patterns.iter().find(|p| p.matches(file_name)) {
            return Some(Exclusion::Pattern(p.as_str().to_string()));
        }

        self.exclude_regexes
            .iter()
            .find(|r| r.is_match(file_name))
            .map(|r| Exclusion::Regex(r.as_str().to_string()))
    }

    pub fn should_include(&self, file_name: &str) -> bool {
        self.exclusion_for(file_name).is_none()
    }
}
