/// Realtime API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Shared secret for verifying session tokens (HS256).
    pub session_secret: String,
    /// Origins allowed to open a WebSocket upgrade. `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4003),
            session_secret: required_var("SESSION_SECRET"),
            allowed_origins: parse_origins(
                &std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
            ),
        }
    }

    /// Check an `Origin` header value against the allow-list.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_origins(raw: &str) -> Config {
        Config {
            port: 0,
            session_secret: "secret".to_string(),
            allowed_origins: parse_origins(raw),
        }
    }

    #[test]
    fn wildcard_allows_any_origin() {
        let config = config_with_origins("*");
        assert!(config.origin_allowed("https://app.example.com"));
        assert!(config.origin_allowed("http://localhost:3000"));
    }

    #[test]
    fn allow_list_is_exact_and_case_insensitive() {
        let config = config_with_origins("https://app.example.com, https://admin.example.com/");
        assert!(config.origin_allowed("https://app.example.com"));
        assert!(config.origin_allowed("HTTPS://APP.EXAMPLE.COM"));
        assert!(config.origin_allowed("https://admin.example.com"));
        assert!(!config.origin_allowed("https://evil.example.com"));
    }

    #[test]
    fn empty_entries_are_ignored() {
        let config = config_with_origins("https://a.example.com,, ");
        assert_eq!(config.allowed_origins.len(), 1);
    }
}
