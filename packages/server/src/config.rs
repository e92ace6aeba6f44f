use anyhow::{bail, Context, Result};
use catalog_sync::{CommitAuthor, ThresholdConfig};
use dotenvy::dotenv;
use std::collections::HashMap;
use std::env;

const CHANGES_PREFIX: &str = "CHANGES_";
const THRESHOLD_SUFFIX: &str = "_APPROVAL_THRESHOLD";

/// Application configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub data_repository_url: String,
    pub repository_owner: String,
    pub repository_name: String,
    pub gh_username: String,
    pub gh_token: String,
    pub canonical_branch: String,
    pub commit_author: CommitAuthor,
    pub reviewers: Vec<String>,
    pub thresholds: ThresholdConfig,
    pub enabled_data_types: Vec<String>,
    pub timetable_url: Option<String>,
    pub orc_url: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("data_repository_url", &self.data_repository_url)
            .field("repository_owner", &self.repository_owner)
            .field("repository_name", &self.repository_name)
            .field("gh_username", &self.gh_username)
            .field("gh_token", &"[REDACTED]")
            .field("canonical_branch", &self.canonical_branch)
            .field("commit_author", &self.commit_author)
            .field("reviewers", &self.reviewers)
            .field("thresholds", &self.thresholds)
            .field("enabled_data_types", &self.enabled_data_types)
            .field("timetable_url", &self.timetable_url)
            .field("orc_url", &self.orc_url)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_vars(env::vars().collect())
    }

    /// Build configuration from an explicit set of variables.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let var = |name: &str| vars.get(name).filter(|v| !v.trim().is_empty()).cloned();

        let repository = var("DATA_REPOSITORY").context("DATA_REPOSITORY must be set")?;
        let (repository_owner, repository_name) = repository
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .map(|(owner, name)| (owner.to_string(), name.to_string()))
            .with_context(|| {
                format!(
                    "DATA_REPOSITORY must look like owner/repo, got '{}'",
                    repository
                )
            })?;

        let default_author = CommitAuthor::default();

        Ok(Self {
            port: var("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            data_repository_url: var("DATA_REPOSITORY_URL")
                .context("DATA_REPOSITORY_URL must be set")?,
            repository_owner,
            repository_name,
            gh_username: var("GH_USERNAME").unwrap_or_else(|| "x-access-token".to_string()),
            gh_token: var("GH_TOKEN").context("GH_TOKEN must be set")?,
            canonical_branch: var("CANONICAL_BRANCH").unwrap_or_else(|| "main".to_string()),
            commit_author: CommitAuthor::new(
                var("COMMIT_AUTHOR_NAME").unwrap_or(default_author.name),
                var("COMMIT_AUTHOR_EMAIL").unwrap_or(default_author.email),
            ),
            reviewers: split_list(var("REVIEWERS").as_deref()),
            thresholds: thresholds_from_vars(&vars)?,
            enabled_data_types: match var("ENABLED_DATA_TYPES") {
                Some(list) => split_list(Some(&list)),
                None => vec!["timetable".to_string()],
            },
            timetable_url: var("TIMETABLE_URL"),
            orc_url: var("ORC_URL"),
        })
    }
}

/// Build thresholds from `*_APPROVAL_THRESHOLD` variables and
/// `CHANGE_WHITELIST`.
///
/// `CHANGES_<FIELD>_APPROVAL_THRESHOLD` sets a per-field threshold, except
/// for `CHANGES_DEFAULT_APPROVAL_THRESHOLD` which sets the fallback.
pub fn thresholds_from_vars(vars: &HashMap<String, String>) -> Result<ThresholdConfig> {
    let mut thresholds = ThresholdConfig::new();

    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();

    for name in names {
        let raw = &vars[name];
        thresholds = match name.as_str() {
            "CHANGES_DEFAULT_APPROVAL_THRESHOLD" => {
                thresholds.with_default_field_threshold(parse_fraction(name, raw)?)
            }
            "ADDED_DEFAULT_APPROVAL_THRESHOLD" => {
                thresholds.with_addition_threshold(parse_fraction(name, raw)?)
            }
            "REMOVED_DEFAULT_APPROVAL_THRESHOLD" => {
                thresholds.with_removal_threshold(parse_fraction(name, raw)?)
            }
            _ => match field_of(name) {
                Some(field) => thresholds.with_field_threshold(field, parse_fraction(name, raw)?),
                None => thresholds,
            },
        };
    }

    if let Some(list) = vars.get("CHANGE_WHITELIST") {
        for field in split_list(Some(list)) {
            thresholds = thresholds.with_whitelisted(field);
        }
    }

    thresholds
        .validate()
        .context("Approval thresholds are invalid")?;
    Ok(thresholds)
}

fn field_of(name: &str) -> Option<&str> {
    name.strip_prefix(CHANGES_PREFIX)?
        .strip_suffix(THRESHOLD_SUFFIX)
        .filter(|field| !field.is_empty())
}

fn parse_fraction(name: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a number, got '{}'", name, raw))?;
    if !(0.0..=1.0).contains(&value) {
        bail!("{} must be between 0 and 1, got {}", name, value);
    }
    Ok(value)
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATA_REPOSITORY_URL", "https://github.com/acme/catalog-data.git"),
            ("DATA_REPOSITORY", "acme/catalog-data"),
            ("GH_TOKEN", "ghp_secret"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&required())).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.repository_owner, "acme");
        assert_eq!(config.repository_name, "catalog-data");
        assert_eq!(config.canonical_branch, "main");
        assert_eq!(config.enabled_data_types, vec!["timetable"]);
        assert!(config.reviewers.is_empty());
        assert_eq!(config.thresholds, ThresholdConfig::new());
        assert_eq!(config.timetable_url, None);
        assert_eq!(config.orc_url, None);
    }

    #[test]
    fn test_lists_are_trimmed() {
        let mut pairs = required();
        pairs.push(("REVIEWERS", " registrar, ops ,,"));
        pairs.push(("ENABLED_DATA_TYPES", "timetable"));
        let config = Config::from_vars(vars(&pairs)).unwrap();

        assert_eq!(config.reviewers, vec!["registrar", "ops"]);
        assert_eq!(config.enabled_data_types, vec!["timetable"]);
    }

    #[test]
    fn test_missing_token_fails() {
        let pairs: Vec<_> = required()
            .into_iter()
            .filter(|(k, _)| *k != "GH_TOKEN")
            .collect();
        let err = Config::from_vars(vars(&pairs)).unwrap_err();
        assert!(err.to_string().contains("GH_TOKEN"));
    }

    #[test]
    fn test_repository_must_have_owner_and_name() {
        for bad in ["catalog-data", "acme/", "/catalog-data", "a/b/c"] {
            let mut pairs = required();
            pairs.retain(|(k, _)| *k != "DATA_REPOSITORY");
            pairs.push(("DATA_REPOSITORY", bad));
            assert!(Config::from_vars(vars(&pairs)).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_debug_hides_token() {
        let config = Config::from_vars(vars(&required())).unwrap();
        assert!(!format!("{:?}", config).contains("ghp_secret"));
    }

    #[test]
    fn test_thresholds_from_vars() {
        let thresholds = thresholds_from_vars(&vars(&[
            ("CHANGES_DEFAULT_APPROVAL_THRESHOLD", "0.2"),
            ("ADDED_DEFAULT_APPROVAL_THRESHOLD", "0.3"),
            ("REMOVED_DEFAULT_APPROVAL_THRESHOLD", "0.05"),
            ("CHANGES_INSTR_APPROVAL_THRESHOLD", "0.5"),
            ("CHANGES_TITLE_AND_DELIVERY_MODE_APPROVAL_THRESHOLD", "1"),
            ("CHANGE_WHITELIST", "Room, Enrl Cap"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();

        assert_eq!(thresholds.default_field, 0.2);
        assert_eq!(thresholds.addition, 0.3);
        assert_eq!(thresholds.removal, 0.05);
        assert_eq!(thresholds.field_threshold("Instr"), 0.5);
        assert_eq!(thresholds.field_threshold("Title and Delivery Mode"), 1.0);
        assert_eq!(thresholds.field_threshold("Days"), 0.2);
        assert!(thresholds.is_whitelisted("ROOM"));
        assert!(thresholds.is_whitelisted("Enrl Cap"));
        assert!(!thresholds.is_whitelisted("Instr"));
    }

    #[test]
    fn test_thresholds_reject_bad_values() {
        for raw in ["abc", "-0.1", "1.5", "NaN"] {
            let result = thresholds_from_vars(&vars(&[("CHANGES_INSTR_APPROVAL_THRESHOLD", raw)]));
            assert!(result.is_err(), "{}", raw);
        }
    }

    #[test]
    fn test_empty_field_name_is_ignored() {
        let thresholds =
            thresholds_from_vars(&vars(&[("CHANGES__APPROVAL_THRESHOLD", "0.9")])).unwrap();
        assert_eq!(thresholds, ThresholdConfig::new());
    }
}
