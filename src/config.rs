use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration, read once at startup from the environment (`.env` included).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub public_base_url: String,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub cors_origins: Vec<String>,
    pub monitor_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_hours: i64,
    pub refresh_ttl_days: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| format!("{} must be set", key));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            refresh_secret: required("JWT_REFRESH_SECRET")?,
            issuer: or_default("JWT_ISSUER", "library-service"),
            audience: or_default("JWT_AUDIENCE", "library-api"),
            access_ttl_hours: parse_number(&get, "ACCESS_TOKEN_TTL_HOURS", 24)?,
            refresh_ttl_days: parse_number(&get, "REFRESH_TOKEN_TTL_DAYS", 7)?,
        };

        let cors_origins = or_default("CORS_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: or_default("HOST", "0.0.0.0"),
            port: parse_number(&get, "PORT", 5000)?,
            database_url: required("DATABASE_URL")?,
            jwt,
            upload_dir: PathBuf::from(or_default("UPLOAD_DIR", "uploads")),
            max_upload_bytes: parse_number(&get, "MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            public_base_url: or_default("PUBLIC_BASE_URL", "http://localhost:5000")
                .trim_end_matches('/')
                .to_string(),
            mail_api_url: get("MAIL_API_URL"),
            mail_api_key: get("MAIL_API_KEY"),
            mail_from: or_default("MAIL_FROM", "no-reply@library.local"),
            cors_origins,
            monitor_interval_secs: parse_number(&get, "MONITOR_INTERVAL_SECS", 3600)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

fn parse_number<T, G>(get: &G, key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("mongodb://localhost:27017/library_test".into()),
        "JWT_SECRET" => Some("test-access-secret".into()),
        "JWT_REFRESH_SECRET" => Some("test-refresh-secret".into()),
        "UPLOAD_DIR" => Some(std::env::temp_dir().join("library-uploads-test").display().to_string()),
        _ => None,
    })
    .expect("test config")
}
