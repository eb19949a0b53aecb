use std::time::Duration;

use thiserror::Error;

const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 15;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Where questions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleSettings {
    /// A service that takes `{"mode": ...}` and returns the batch.
    Http { endpoint: String },
    /// ChatGPT, prompted directly.
    ChatGpt { api_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub oracle: OracleSettings,
    pub oracle_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let oracle = match non_empty("QUESTION_SERVICE_URL") {
            Some(endpoint) => OracleSettings::Http { endpoint },
            None => OracleSettings::ChatGpt {
                api_key: non_empty("CHATGPT_API_KEY").ok_or(ConfigError::Missing("CHATGPT_API_KEY"))?,
            },
        };

        let oracle_timeout = match non_empty("ORACLE_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "ORACLE_TIMEOUT_SECS",
                        value,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_ORACLE_TIMEOUT_SECS),
        };

        Ok(Self {
            oracle,
            oracle_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn chatgpt_is_the_default_oracle() {
        let settings = settings(&[("CHATGPT_API_KEY", "sk-test")]).unwrap();
        assert_eq!(
            settings.oracle,
            OracleSettings::ChatGpt {
                api_key: "sk-test".to_string()
            }
        );
        assert_eq!(settings.oracle_timeout, Duration::from_secs(15));
    }

    #[test]
    fn service_url_wins_over_api_key() {
        let settings = settings(&[
            ("CHATGPT_API_KEY", "sk-test"),
            ("QUESTION_SERVICE_URL", "http://localhost:8888/questions"),
        ])
        .unwrap();
        assert_eq!(
            settings.oracle,
            OracleSettings::Http {
                endpoint: "http://localhost:8888/questions".to_string()
            }
        );
    }

    #[test]
    fn missing_key_is_reported() {
        assert_eq!(settings(&[]), Err(ConfigError::Missing("CHATGPT_API_KEY")));
        assert_eq!(
            settings(&[("CHATGPT_API_KEY", "  ")]),
            Err(ConfigError::Missing("CHATGPT_API_KEY"))
        );
    }

    #[test]
    fn timeout_is_parsed() {
        let settings = settings(&[("CHATGPT_API_KEY", "k"), ("ORACLE_TIMEOUT_SECS", "30")]).unwrap();
        assert_eq!(settings.oracle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        for bad in ["0", "soon", "-1"] {
            let err = settings(&[("CHATGPT_API_KEY", "k"), ("ORACLE_TIMEOUT_SECS", bad)]).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "ORACLE_TIMEOUT_SECS", .. }));
        }
    }
}
