use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SectionsError};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Text cleanup rules, usually read from `text_cleanup_config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Literal strings removed from every piece of extracted text.
    #[serde(default)]
    pub special_characters: Vec<String>,
    /// Regex patterns removed from every piece of extracted text.
    #[serde(default)]
    pub expressions: Vec<String>,
    /// Boilerplate snippets removed from assembled section bodies only.
    #[serde(default)]
    pub texts_to_remove: Vec<String>,
}

impl CleanupConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            SectionsError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let config: Self = if is_toml {
            toml::from_str(&contents)
                .map_err(|e| SectionsError::Config(format!("{}: {e}", path.display())))?
        } else {
            serde_json::from_str(&contents)
                .map_err(|e| SectionsError::Config(format!("{}: {e}", path.display())))?
        };
        config.compile()?;
        Ok(config)
    }

    pub fn compile(&self) -> Result<TextCleaner> {
        let expressions = self
            .expressions
            .iter()
            .map(|expr| {
                Regex::new(expr)
                    .map_err(|e| SectionsError::Config(format!("expression {expr:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TextCleaner {
            special_characters: self
                .special_characters
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
            expressions,
            texts_to_remove: self
                .texts_to_remove
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
        })
    }
}

/// Compiled, immutable form of a [`CleanupConfig`].
#[derive(Debug, Clone, Default)]
pub struct TextCleaner {
    special_characters: Vec<String>,
    expressions: Vec<Regex>,
    texts_to_remove: Vec<String>,
}

impl TextCleaner {
    pub fn clean(&self, text: &str) -> String {
        let mut text = text.to_string();
        for special in &self.special_characters {
            text = text.replace(special.as_str(), "");
        }
        for expr in &self.expressions {
            text = expr.replace_all(&text, "").into_owned();
        }
        collapse_whitespace(&text)
    }

    pub fn strip_boilerplate(&self, text: &str) -> String {
        let mut text = text.to_string();
        for snippet in &self.texts_to_remove {
            text = text.replace(snippet.as_str(), "").trim().to_string();
        }
        text
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_config_only_normalizes_whitespace() {
        let cleaner = CleanupConfig::default().compile().unwrap();
        assert_eq!(cleaner.clean("  a\n\tb   c \n"), "a b c");
        assert_eq!(cleaner.strip_boilerplate(" keep me "), " keep me ");
    }

    #[test]
    fn applies_literals_then_expressions() {
        let config = CleanupConfig {
            special_characters: vec!["\u{2022}".into()],
            expressions: vec![r"Page \d+ of \d+".into()],
            texts_to_remove: vec!["ACME Corp - Internal".into()],
        };
        let cleaner = config.compile().unwrap();
        assert_eq!(
            cleaner.clean("\u{2022} Scope\nPage 3 of 9\nbody"),
            "Scope body"
        );
        assert_eq!(
            cleaner.strip_boilerplate("ACME Corp - Internal body text"),
            "body text"
        );
    }

    #[test]
    fn loads_json_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("cleanup.json");
        let mut file = fs::File::create(&json).unwrap();
        write!(file, r#"{{"special_characters": ["*"], "unknown": 1}}"#).unwrap();
        let config = CleanupConfig::load(&json).unwrap();
        assert_eq!(config.special_characters, vec!["*".to_string()]);
        assert!(config.expressions.is_empty());

        let toml_path = dir.path().join("cleanup.toml");
        fs::write(&toml_path, "texts_to_remove = [\"Draft\"]\n").unwrap();
        let config = CleanupConfig::load(&toml_path).unwrap();
        assert_eq!(config.texts_to_remove, vec!["Draft".to_string()]);
    }

    #[test]
    fn bad_configs_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = CleanupConfig::load(dir.path().join("nope.json")).unwrap_err();
        assert!(missing.is_config_error());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(CleanupConfig::load(&bad).unwrap_err().is_config_error());

        let bad_regex = dir.path().join("regex.json");
        fs::write(&bad_regex, r#"{"expressions": ["(unclosed"]}"#).unwrap();
        assert!(CleanupConfig::load(&bad_regex).unwrap_err().is_config_error());
    }
}
