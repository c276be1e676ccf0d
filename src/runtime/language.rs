//! Language catalog for the process kernel
//!
//! Maps language names, aliases and file extensions to the interpreter that
//! runs them. Built-in entries can be overridden or extended from config.

use serde::{Deserialize, Serialize};

use crate::core::{ReplError, Result};

/// How to run one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    /// Canonical name used in `#!name` directives
    pub name: String,
    pub display_name: String,
    /// Interpreter program, located on `PATH`
    pub program: String,
    /// Arguments making the program read code from stdin
    pub args: Vec<String>,
    pub aliases: Vec<String>,
    /// File extensions without the leading dot
    pub extensions: Vec<String>,
}

impl LanguageSpec {
    /// Create a new language spec
    pub fn new(name: &str, display_name: &str, program: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            aliases: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    /// Whether `name` is this language's name or one of its aliases
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// Partial language definition, as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageOverride {
    pub display_name: Option<String>,
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub aliases: Vec<String>,
    pub extensions: Vec<String>,
}

/// The set of languages a kernel can run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageCatalog {
    languages: Vec<LanguageSpec>,
}

impl Default for LanguageCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LanguageCatalog {
    /// The built-in language set
    pub fn builtin() -> Self {
        Self {
            languages: vec![
                LanguageSpec::new("csharp", "C#", "dotnet-script", &["-"])
                    .with_aliases(&["c#", "cs"])
                    .with_extensions(&["cs", "csx"]),
                LanguageSpec::new("fsharp", "F#", "dotnet", &["fsi", "--quiet", "--readline-"])
                    .with_aliases(&["f#", "fs"])
                    .with_extensions(&["fs", "fsx"]),
                LanguageSpec::new("pwsh", "PowerShell", "pwsh", &["-NoLogo", "-NoProfile", "-Command", "-"])
                    .with_aliases(&["powershell"])
                    .with_extensions(&["ps1"]),
                LanguageSpec::new("sql", "SQL", "sqlite3", &[])
                    .with_extensions(&["sql"]),
                LanguageSpec::new("python", "Python", "python3", &["-"])
                    .with_aliases(&["py", "python3"])
                    .with_extensions(&["py"]),
                LanguageSpec::new("bash", "Bash", "bash", &["-s"])
                    .with_aliases(&["sh", "shell"])
                    .with_extensions(&["sh", "bash"]),
            ],
        }
    }

    /// A catalog holding only `languages`
    pub fn from_specs(languages: Vec<LanguageSpec>) -> Self {
        Self { languages }
    }

    /// Find a language by name or alias, ignoring case
    pub fn resolve(&self, name: &str) -> Option<&LanguageSpec> {
        let name = name.trim();
        self.languages.iter().find(|spec| spec.answers_to(name))
    }

    /// Canonical name for `name`, or an unknown-language error
    pub fn canonical_name(&self, name: &str) -> Result<String> {
        self.resolve(name)
            .map(|spec| spec.name.clone())
            .ok_or_else(|| ReplError::UnknownLanguage(name.to_string()))
    }

    /// Find a language by file extension (with or without the dot)
    pub fn for_extension(&self, extension: &str) -> Option<&LanguageSpec> {
        let extension = extension.trim_start_matches('.');
        self.languages.iter().find(|spec| {
            spec.extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(extension))
        })
    }

    /// Add a language, replacing any existing one with the same name
    pub fn insert(&mut self, spec: LanguageSpec) {
        match self.languages.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.languages.push(spec),
        }
    }

    /// Apply a configured override. A new language must name its program.
    pub fn apply_override(&mut self, name: &str, patch: &LanguageOverride) -> Result<()> {
        if let Some(existing) = self.languages.iter_mut().find(|s| s.answers_to(name)) {
            if let Some(display_name) = &patch.display_name {
                existing.display_name = display_name.clone();
            }
            if let Some(program) = &patch.program {
                existing.program = program.clone();
            }
            if let Some(args) = &patch.args {
                existing.args = args.clone();
            }
            existing.aliases.extend(patch.aliases.iter().cloned());
            existing.extensions.extend(patch.extensions.iter().cloned());
            return Ok(());
        }

        let program = patch.program.clone().ok_or_else(|| {
            ReplError::configuration(format!(
                "language '{name}' is not built in, so [languages.{name}] must set 'program'"
            ))
        })?;
        self.languages.push(LanguageSpec {
            name: name.to_string(),
            display_name: patch.display_name.clone().unwrap_or_else(|| name.to_string()),
            program,
            args: patch.args.clone().unwrap_or_default(),
            aliases: patch.aliases.clone(),
            extensions: patch.extensions.clone(),
        });
        Ok(())
    }

    /// Canonical names, in catalog order
    pub fn names(&self) -> Vec<&str> {
        self.languages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LanguageSpec> {
        self.languages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("csharp", "csharp")]
    #[test_case("C#", "csharp")]
    #[test_case("f#", "fsharp")]
    #[test_case("PowerShell", "pwsh")]
    #[test_case("py", "python")]
    #[test_case(" sh ", "bash")]
    fn test_resolve_names_and_aliases(name: &str, expected: &str) {
        let catalog = LanguageCatalog::builtin();
        assert_eq!(catalog.canonical_name(name).unwrap(), expected);
    }

    #[test]
    fn test_unknown_language() {
        let catalog = LanguageCatalog::builtin();
        assert!(matches!(
            catalog.canonical_name("cobol"),
            Err(ReplError::UnknownLanguage(name)) if name == "cobol"
        ));
    }

    #[test_case("fsx", "fsharp")]
    #[test_case(".py", "python")]
    #[test_case("PS1", "pwsh")]
    #[test_case("sql", "sql")]
    fn test_resolve_extensions(extension: &str, expected: &str) {
        let catalog = LanguageCatalog::builtin();
        assert_eq!(catalog.for_extension(extension).map(|s| s.name.as_str()), Some(expected));
    }

    #[test]
    fn test_override_existing_language() {
        let mut catalog = LanguageCatalog::builtin();
        let patch = LanguageOverride {
            program: Some("python3.12".to_string()),
            aliases: vec!["snake".to_string()],
            ..Default::default()
        };

        catalog.apply_override("python", &patch).unwrap();

        let spec = catalog.resolve("snake").unwrap();
        assert_eq!(spec.program, "python3.12");
        assert_eq!(spec.args, vec!["-"]);
    }

    #[test]
    fn test_new_language_requires_program() {
        let mut catalog = LanguageCatalog::builtin();

        let err = catalog
            .apply_override("ruby", &LanguageOverride::default())
            .unwrap_err();
        assert!(matches!(err, ReplError::Configuration(_)));

        let patch = LanguageOverride {
            program: Some("ruby".to_string()),
            extensions: vec!["rb".to_string()],
            ..Default::default()
        };
        catalog.apply_override("ruby", &patch).unwrap();
        assert_eq!(catalog.for_extension("rb").map(|s| s.name.as_str()), Some("ruby"));
        assert!(catalog.names().contains(&"ruby"));
    }
}
