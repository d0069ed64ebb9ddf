//! Layered settings: defaults, then a TOML file, then environment, then flags.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use assess_core::QuestionBank;
use assess_core::bank::BankError;
use assess_core::model::{ItemDraft, SessionConfigDraft};

pub const DEFAULT_CONFIG_FILE: &str = "medlearn.toml";
pub const DEFAULT_DB_URL: &str = "sqlite://medlearn.sqlite3";
pub const ENV_DB_URL: &str = "MEDLEARN_DB_URL";
pub const ENV_BANK: &str = "MEDLEARN_BANK";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("config file not found: {}", .0.display())]
    MissingConfig(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse question bank {}: {source}", .path.display())]
    BankFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid question bank: {0}")]
    Bank(#[from] BankError),
}

/// Contents of `medlearn.toml`.
///
/// ```toml
/// db_url = "sqlite://results.sqlite3"
/// bank = "cardiology.json"
///
/// [session]
/// number_of_items = 10
/// time_limit_secs = 600
/// pass_threshold = 70
/// ordering = { kind = "shuffled", seed = 7 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub db_url: Option<String>,
    pub bank: Option<PathBuf>,
    pub session: SessionConfigDraft,
}

/// Read an explicit config file, or `medlearn.toml` from the working
/// directory when present. Missing default file means defaults.
///
/// # Errors
///
/// Returns `LoadError` when an explicit file is missing or any file fails to
/// read or parse.
pub fn load_file_settings(path: Option<&Path>) -> Result<FileSettings, LoadError> {
    let path = match path {
        Some(p) if p.exists() => p.to_path_buf(),
        Some(p) => return Err(LoadError::MissingConfig(p.to_path_buf())),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !local.exists() {
                return Ok(FileSettings::default());
            }
            local
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Read {
        path: path.clone(),
        source,
    })?;
    let settings = parse_settings(&content).map_err(|source| LoadError::Config {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded settings file");
    Ok(settings)
}

/// # Errors
///
/// Returns the TOML error for malformed input.
pub fn parse_settings(content: &str) -> Result<FileSettings, toml::de::Error> {
    toml::from_str(content)
}

/// Load a JSON array of item drafts and validate it into a bank.
///
/// # Errors
///
/// Returns `LoadError` when the file cannot be read, is not valid JSON, or
/// holds invalid items.
pub fn load_bank(path: &Path) -> Result<QuestionBank, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let drafts: Vec<ItemDraft> =
        serde_json::from_str(&content).map_err(|source| LoadError::BankFormat {
            path: path.to_path_buf(),
            source,
        })?;
    let bank = QuestionBank::from_drafts(drafts)?;
    tracing::info!(path = %path.display(), items = bank.len(), "question bank loaded");
    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::ItemOrdering;
    use std::io::Write;

    #[test]
    fn session_section_is_optional() {
        let settings = parse_settings("db_url = \"sqlite::memory:\"").unwrap();
        assert_eq!(settings.db_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(settings.session, SessionConfigDraft::default());
    }

    #[test]
    fn parses_session_overrides() {
        let settings = parse_settings(
            r#"
                bank = "bank.json"

                [session]
                number_of_items = 5
                time_limit_secs = 120
                pass_threshold = 75
                ordering = { kind = "shuffled", seed = 3 }
            "#,
        )
        .unwrap();
        let config = settings.session.validate().unwrap();
        assert_eq!(config.number_of_items(), 5);
        assert_eq!(config.time_limit_secs(), 120);
        assert_eq!(config.pass_threshold(), 75);
        assert_eq!(config.ordering(), ItemOrdering::Shuffled { seed: Some(3) });
        assert_eq!(settings.bank, Some(PathBuf::from("bank.json")));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = load_file_settings(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, LoadError::MissingConfig(_)));
    }

    #[test]
    fn loads_bank_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": 1, "prompt": "Normal adult resting heart rate is 60-100 bpm",
                  "answer": {{"kind": "boolean", "correct": true}}}},
                {{"id": 2, "locale": "ar", "prompt": "Largest organ?",
                  "answer": {{"kind": "free_text", "expected": "Skin"}}, "difficulty": "easy"}}
            ]"#
        )
        .unwrap();

        let bank = load_bank(file.path()).unwrap();
        assert_eq!(bank.len(), 2);
    }

    #[test]
    fn rejects_invalid_bank_items() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": 1, "prompt": "  ", "answer": {{"kind": "boolean", "correct": true}}}}]"#
        )
        .unwrap();

        let err = load_bank(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Bank(BankError::Item(_))));
    }
}
