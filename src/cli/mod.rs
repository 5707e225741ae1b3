use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Identity Provider Args ---
    /// Base URL of the identity provider (e.g., https://project.example.co)
    #[arg(long, env = "AUTH_BASE_URL")]
    pub auth_base_url: String,

    /// Public (anon) key sent to the identity provider alongside the caller's token
    #[arg(long, env = "AUTH_ANON_KEY")]
    pub auth_anon_key: String,

    /// Path of the provider endpoint that returns the user behind a bearer token
    #[arg(long, env = "AUTH_USER_PATH", default_value = "/auth/v1/user")]
    pub auth_user_path: String,

    // --- Chat LLM Provider Args ---
    /// Full URL of the chat completion endpoint
    #[arg(long, env = "CHAT_BASE_URL", default_value = "https://api.openai.com/v1/chat/completions")]
    pub chat_base_url: String,

    /// API Key for the completion endpoint
    #[arg(long, env = "CHAT_API_KEY")]
    pub chat_api_key: String,

    /// Model name sent with every completion request
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o-mini")]
    pub chat_model: String,

    /// Connect timeout in seconds for outbound calls (identity provider and completion endpoint)
    #[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT_SECS", default_value = "10")]
    pub upstream_connect_timeout_secs: u64,

    /// Total timeout in seconds for non-streaming completion requests
    #[arg(long, env = "UPSTREAM_REQUEST_TIMEOUT_SECS", default_value = "120")]
    pub upstream_request_timeout_secs: u64,

    /// Abort a relayed stream when the upstream sends nothing for this many seconds. 0 disables it.
    #[arg(long, env = "STREAM_IDLE_TIMEOUT_SECS", default_value = "0")]
    pub stream_idle_timeout_secs: u64,

    // --- Session Store Args ---
    /// Session store type (redis, memory)
    #[arg(long, env = "STORE_TYPE", default_value = "redis")]
    pub store_type: String,

    /// Session store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORE_HOST", default_value = "redis://127.0.0.1:6379")]
    pub store_host: String,

    /// Prefix for session keys; the full key is {prefix}{user id}:{session id}
    #[arg(long, env = "STORE_KEY_PREFIX", default_value = "chat:")]
    pub store_key_prefix: String,

    /// Batch size for Redis SCAN command when listing sessions.
    #[arg(long, env = "STORE_REDIS_SCAN_COUNT", default_value = "100")]
    pub store_redis_scan_count: usize,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn stream_idle_timeout(&self) -> Option<std::time::Duration> {
        (self.stream_idle_timeout_secs > 0).then(|| {
            std::time::Duration::from_secs(self.stream_idle_timeout_secs)
        })
    }
}

/// Keeps enough of a secret to recognise it in logs.
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "chat-relay",
            "--auth-base-url",
            "http://auth.local",
            "--auth-anon-key",
            "anon",
            "--chat-api-key",
            "sk-test",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let args = parse(&[]);
        assert_eq!(args.auth_user_path, "/auth/v1/user");
        assert_eq!(args.store_type, "redis");
        assert_eq!(args.store_key_prefix, "chat:");
        assert_eq!(args.server_addr, "127.0.0.1:4000");
        assert_eq!(args.stream_idle_timeout(), None);
    }

    #[test]
    fn idle_timeout_is_opt_in() {
        let args = parse(&["--stream-idle-timeout-secs", "30"]);
        assert_eq!(args.stream_idle_timeout(), Some(std::time::Duration::from_secs(30)));
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("sk-1234567890"), "sk-1****");
    }
}
