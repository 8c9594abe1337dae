use rp_database::DatabaseConfig;
use rp_registry::ClientPolicy;

/// Log line format of the admin tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub policy: ClientPolicy,
    /// Recorded as the actor of every audit event
    pub operator: String,
}

impl Config {
    pub fn from_env() -> rp_registry::Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env(),
            policy: ClientPolicy::from_env()?,
            operator: operator(|key| std::env::var(key).ok()),
        })
    }
}

/// `RP_ADMIN_OPERATOR`, else the login user
fn operator(lookup: impl Fn(&str) -> Option<String>) -> String {
    ["RP_ADMIN_OPERATOR", "USER", "USERNAME"]
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
