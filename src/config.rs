use std::env;

use anyhow::{anyhow, Result};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<usize>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone)]
pub struct Settings {
    // Network
    pub host: String,
    pub port: u16,
    pub cors_allow_origin: String, // "*" or a single origin

    // Storage
    pub store_backend: String, // memory|sqlite
    pub sqlite_path: String,

    // Paging
    pub max_page_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_allow_origin: "*".to_string(),
            store_backend: "memory".to_string(),
            sqlite_path: "./data/threadboard.sqlite".to_string(),
            max_page_limit: 100,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let d = Self::default();
        let port = get_env_usize("PORT", d.port as usize)?;
        let port = u16::try_from(port).map_err(|_| anyhow!("PORT out of range (got {port})"))?;

        let s = Self {
            host: get_env_string("HOST", &d.host),
            port,
            cors_allow_origin: get_env_string("CORS_ALLOW_ORIGIN", &d.cors_allow_origin),
            store_backend: get_env_string("STORE_BACKEND", &d.store_backend).to_lowercase(),
            sqlite_path: get_env_string("SQLITE_PATH", &d.sqlite_path),
            max_page_limit: get_env_usize("MAX_PAGE_LIMIT", d.max_page_limit)?,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.store_backend.as_str(), "memory" | "sqlite") {
            return Err(anyhow!(
                "STORE_BACKEND must be memory|sqlite (got {})",
                self.store_backend
            ));
        }
        if self.store_backend == "sqlite" && self.sqlite_path.trim().is_empty() {
            return Err(anyhow!("SQLITE_PATH must be set for the sqlite backend"));
        }
        if self.max_page_limit < 1 {
            return Err(anyhow!(
                "MAX_PAGE_LIMIT must be >= 1 (got {})",
                self.max_page_limit
            ));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("HOST must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.bind_addr(), "127.0.0.1:5000");
    }

    #[test]
    fn rejects_unknown_backend() {
        let s = Settings {
            store_backend: "mongo".to_string(),
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_zero_page_cap() {
        let s = Settings {
            max_page_limit: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn sqlite_backend_needs_a_path() {
        let s = Settings {
            store_backend: "sqlite".to_string(),
            sqlite_path: " ".to_string(),
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }
}
