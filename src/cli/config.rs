use crate::cli::app::Cli;
use crate::cli::document::OutputFormat;
use crate::cli::render::Theme;
use crate::core::{ReplError, Result};
use crate::runtime::{LanguageCatalog, LanguageOverride};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration settings for polyglot-repl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Language selected when the shell starts
    #[serde(default = "default_kernel")]
    pub default_kernel: String,

    /// Default verbosity level
    #[serde(default)]
    pub verbose: bool,

    /// Working directory for interpreter processes
    pub working_dir: Option<PathBuf>,

    /// Output formatting preferences
    #[serde(default)]
    pub output: OutputDefaults,

    /// Prompt strings and colours
    #[serde(default)]
    pub theme: Theme,

    /// Interpreter overrides and additional languages, keyed by name
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageOverride>,
}

/// Output formatting defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDefaults {
    /// Enable colored output by default
    #[serde(default = "default_true")]
    pub color: bool,

    /// Show a spinner while a submission runs
    #[serde(default = "default_true")]
    pub spinner: bool,

    /// Result document format when `--output-format` is not given
    pub format: Option<OutputFormat>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_kernel: default_kernel(),
            verbose: false,
            working_dir: None,
            output: OutputDefaults::default(),
            theme: Theme::default(),
            languages: BTreeMap::new(),
        }
    }
}

impl Default for OutputDefaults {
    fn default() -> Self {
        Self {
            color: default_true(),
            spinner: default_true(),
            format: None,
        }
    }
}

impl Config {
    /// Load configuration from file, with fallback to defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            // Create default config file
            let config = Self::default();
            config.save_to_file(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            ReplError::configuration(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            ReplError::configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = crate::cli::ensure_data_dir()?;
        Ok(data_dir.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from_file(path)
    }

    /// Merge with command-line arguments, giving priority to CLI args
    pub fn merge_with_cli_args(mut self, cli_args: &Cli) -> Self {
        if cli_args.verbose {
            self.verbose = true;
        }
        if let Some(kernel) = cli_args.default_kernel {
            self.default_kernel = kernel.as_str().to_string();
        }
        if let Some(ref working_dir) = cli_args.working_dir {
            self.working_dir = Some(working_dir.clone());
        }
        if let Some(format) = cli_args.output_format {
            self.output.format = Some(format);
        }

        self
    }

    /// Built-in languages with the `[languages]` tables applied
    pub fn language_catalog(&self) -> Result<LanguageCatalog> {
        let mut catalog = LanguageCatalog::builtin();
        for (name, patch) in &self.languages {
            catalog.apply_override(name, patch)?;
        }
        Ok(catalog)
    }
}

// Helper functions for default values
fn default_kernel() -> String {
    "csharp".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_kernel, "csharp");
        assert!(!config.verbose);
        assert!(config.output.color);
        assert!(config.output.spinner);
        assert_eq!(config.output.format, None);
        assert_eq!(config.theme.prompt, ">");
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.verbose = true;
        config.default_kernel = "fsharp".to_string();
        config.output.format = Some(OutputFormat::Trx);
        config.languages.insert(
            "ruby".to_string(),
            LanguageOverride {
                program: Some("ruby".to_string()),
                extensions: vec!["rb".to_string()],
                ..Default::default()
            },
        );

        // Save config
        config.save_to_file(&config_path).unwrap();

        // Load config
        let loaded_config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(loaded_config, config);
    }

    #[test]
    fn test_config_file_creation() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        // Should create default config file if it doesn't exist
        let config = Config::load_from_file(&config_path).unwrap();

        assert!(config_path.exists());
        assert_eq!(config.default_kernel, default_kernel());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[theme]\nprompt = \"$\"\n\n[languages.python]\nprogram = \"python3.12\"\n",
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.theme.prompt, "$");
        assert_eq!(config.theme.continuation_prompt, "...");

        let catalog = config.language_catalog().unwrap();
        assert_eq!(catalog.resolve("py").unwrap().program, "python3.12");
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "default_kernel = [").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, ReplError::Configuration(_)));
    }

    #[test]
    fn test_cli_args_take_priority() {
        let mut config = Config::default();
        config.verbose = false;
        config.output.format = Some(OutputFormat::Ipynb);

        let cli = Cli::try_parse_from([
            "polyglot-repl",
            "--default-kernel",
            "pwsh",
            "--output-format",
            "trx",
            "--verbose",
        ])
        .unwrap();
        let merged = config.merge_with_cli_args(&cli);

        assert_eq!(merged.default_kernel, "pwsh");
        assert_eq!(merged.output.format, Some(OutputFormat::Trx));
        assert!(merged.verbose);
    }
}
