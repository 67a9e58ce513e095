use serde::Deserialize;

/// Process-wide configuration, loaded once at startup from the environment.
/// Per-workspace options (`fail_mode`, `decision_timeout_ms`) live on the
/// workspace row itself; this covers only what's process-global.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,

    pub upstream_timeout_seconds: u64,
    pub upstream_max_retries: u32,
    pub upstream_max_keepalive_connections: usize,
    pub upstream_max_connections: usize,

    pub proxy_forward_authorization: bool,
    pub proxy_blocked_headers: Vec<String>,

    pub policy_cache_ttl_seconds: u64,
    pub decision_timeout_ms: u64,

    pub audit_channel_capacity: usize,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    Ok(Config {
        port: env_parse("MCPGATE_PORT", 8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/mcpgate".into()),
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),

        upstream_timeout_seconds: env_parse("MCPGATE_UPSTREAM_TIMEOUT_SECONDS", 30),
        upstream_max_retries: env_parse("MCPGATE_UPSTREAM_MAX_RETRIES", 2),
        upstream_max_keepalive_connections: env_parse(
            "MCPGATE_UPSTREAM_MAX_KEEPALIVE_CONNECTIONS",
            20,
        ),
        upstream_max_connections: env_parse("MCPGATE_UPSTREAM_MAX_CONNECTIONS", 100),

        proxy_forward_authorization: env_parse("MCPGATE_FORWARD_AUTHORIZATION", false),
        proxy_blocked_headers: std::env::var("MCPGATE_BLOCKED_HEADERS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["cookie".into(), "set-cookie".into()]),

        policy_cache_ttl_seconds: env_parse("MCPGATE_POLICY_CACHE_TTL_SECONDS", 10),
        decision_timeout_ms: env_parse("MCPGATE_DECISION_TIMEOUT_MS", 5000),

        audit_channel_capacity: env_parse("MCPGATE_AUDIT_CHANNEL_CAPACITY", 4096),
    })
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
