use serde::Deserialize;

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Which conversation store backend to talk to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSettings {
    /// Hosted PostgREST endpoint (e.g. Supabase) authenticated with an access key.
    Rest { url: String, key: String },
    /// Direct Postgres connection.
    Postgres { database_url: String },
    /// In-process store, for local runs.
    Memory,
    /// Nothing configured; store calls fail when invoked.
    Unconfigured,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub store: StoreSettings,
    pub session_ttl_secs: u64,
}

/// Reads the first non-blank value among `keys`.
fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

fn validate_http_url(name: &str, value: String) -> anyhow::Result<String> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    url::Url::parse(&value).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    Ok(value.trim_end_matches('/').to_string())
}

impl Config {
    /// Loads configuration from the environment (and `.env`, when present).
    ///
    /// Missing credentials do not stop startup: they are logged here and the
    /// affected calls fail when invoked. Malformed values are errors.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let anthropic_api_key = env_any(&["ANTHROPIC_API_KEY"]).unwrap_or_else(|| {
            tracing::error!("ANTHROPIC_API_KEY is not set; recommendations will use the fallback card");
            String::new()
        });

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            anthropic_api_key,
            anthropic_base_url: validate_http_url(
                "ANTHROPIC_BASE_URL",
                env_any(&["ANTHROPIC_BASE_URL"])
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            )?,
            model: env_any(&["ANTHROPIC_MODEL"]).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: match env_any(&["ANTHROPIC_MAX_TOKENS"]) {
                Some(raw) => raw.parse().map_err(|_| {
                    anyhow::anyhow!("ANTHROPIC_MAX_TOKENS must be a positive integer")
                })?,
                None => DEFAULT_MAX_TOKENS,
            },
            store: Self::store_from_env()?,
            session_ttl_secs: match env_any(&["SESSION_TTL_SECS"]) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("SESSION_TTL_SECS must be a number of seconds"))?,
                None => DEFAULT_SESSION_TTL_SECS,
            },
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Anthropic base URL: {}", config.anthropic_base_url);
        tracing::debug!("Model: {} (max_tokens={})", config.model, config.max_tokens);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    fn store_from_env() -> anyhow::Result<StoreSettings> {
        store_settings(
            env_any(&["SUPABASE_URL", "STORE_URL"]),
            env_any(&["SUPABASE_ANON_KEY", "STORE_KEY"]),
            env_any(&["DATABASE_URL", "DB_URL"]),
            env_any(&["STORE_BACKEND"]),
        )
    }
}

/// Picks the conversation store backend.
///
/// Without an explicit `backend` a store URL selects `rest`, then a database
/// URL selects `postgres`. Missing credentials are logged and yield
/// [`StoreSettings::Unconfigured`] or an empty key; malformed values fail.
pub fn store_settings(
    store_url: Option<String>,
    store_key: Option<String>,
    database_url: Option<String>,
    backend: Option<String>,
) -> anyhow::Result<StoreSettings> {
    let backend = backend
        .map(|b| b.trim().to_lowercase())
        .unwrap_or_else(|| {
            if store_url.is_some() {
                "rest".to_string()
            } else if database_url.is_some() {
                "postgres".to_string()
            } else {
                String::new()
            }
        });

    let settings = match backend.as_str() {
        "rest" => match store_url {
            Some(url) => {
                let key = store_key.unwrap_or_else(|| {
                    tracing::error!("Store access key is not set (SUPABASE_ANON_KEY / STORE_KEY)");
                    String::new()
                });
                StoreSettings::Rest {
                    url: validate_http_url("SUPABASE_URL", url)?,
                    key,
                }
            }
            None => {
                tracing::error!("STORE_BACKEND=rest but SUPABASE_URL / STORE_URL is not set");
                StoreSettings::Unconfigured
            }
        },
        "postgres" => match database_url {
            Some(url) => {
                if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                    anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                }
                StoreSettings::Postgres { database_url: url }
            }
            None => {
                tracing::error!("STORE_BACKEND=postgres but DATABASE_URL is not set");
                StoreSettings::Unconfigured
            }
        },
        "memory" => {
            tracing::warn!("Using the in-memory conversation store; records are not persisted");
            StoreSettings::Memory
        }
        "" => {
            tracing::error!(
                "Missing conversation store environment variables (SUPABASE_URL / SUPABASE_ANON_KEY or DATABASE_URL)"
            );
            StoreSettings::Unconfigured
        }
        other => anyhow::bail!(
            "STORE_BACKEND must be one of rest, postgres, memory (got '{}')",
            other
        ),
    };

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_urls_lose_trailing_slash() {
        let url = validate_http_url("X", "https://abc.supabase.co/".to_string()).unwrap();
        assert_eq!(url, "https://abc.supabase.co");
    }

    #[test]
    fn non_http_urls_are_rejected() {
        assert!(validate_http_url("X", "ftp://example.com".to_string()).is_err());
        assert!(validate_http_url("X", "example.com".to_string()).is_err());
    }

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn nothing_set_is_unconfigured() {
        let settings = store_settings(None, None, None, None).unwrap();
        assert_eq!(settings, StoreSettings::Unconfigured);
    }

    #[test]
    fn store_url_without_key_selects_rest_with_empty_key() {
        let settings =
            store_settings(some("https://abc.supabase.co/"), None, None, None).unwrap();
        assert_eq!(
            settings,
            StoreSettings::Rest {
                url: "https://abc.supabase.co".to_string(),
                key: String::new(),
            }
        );
    }

    #[test]
    fn store_url_wins_over_database_url() {
        let settings = store_settings(
            some("https://abc.supabase.co"),
            some("anon"),
            some("postgres://localhost/cards"),
            None,
        )
        .unwrap();
        assert!(matches!(settings, StoreSettings::Rest { ref key, .. } if key == "anon"));
    }

    #[test]
    fn database_url_alone_selects_postgres() {
        let settings =
            store_settings(None, None, some("postgresql://localhost/cards"), None).unwrap();
        assert_eq!(
            settings,
            StoreSettings::Postgres {
                database_url: "postgresql://localhost/cards".to_string(),
            }
        );
    }

    #[test]
    fn explicit_backend_overrides_inference() {
        let settings = store_settings(
            some("https://abc.supabase.co"),
            None,
            None,
            some(" Memory "),
        )
        .unwrap();
        assert_eq!(settings, StoreSettings::Memory);

        let settings = store_settings(None, None, None, some("postgres")).unwrap();
        assert_eq!(settings, StoreSettings::Unconfigured);
    }

    #[test]
    fn malformed_store_values_are_errors() {
        assert!(store_settings(None, None, None, some("bogus")).is_err());
        assert!(store_settings(None, None, some("mysql://localhost/cards"), None).is_err());
        assert!(store_settings(some("abc.supabase.co"), some("anon"), None, None).is_err());
    }
}
