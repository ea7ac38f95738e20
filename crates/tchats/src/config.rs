use crate::admission::GateConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments for the room admission server.
#[derive(Parser, Debug, Clone)]
#[command(name = "tchats")]
#[command(about = "tchat room admission server")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:3000", env = "TCHATS_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the metrics and health endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "TCHATS_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "10000", env = "TCHATS_MAX_CONNS")]
    pub max_conns: usize,
    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long, default_value = "65536", env = "TCHATS_MAX_MESSAGE")]
    pub max_message_size: usize,
    /// Upper bound on each token or room lookup, in milliseconds.
    #[arg(long, default_value = "2000", env = "TCHATS_LOOKUP_TIMEOUT_MS")]
    pub lookup_timeout_ms: u64,
    /// Interval between WebSocket pings in seconds.
    #[arg(long, default_value = "30", env = "TCHATS_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    #[arg(long, default_value = "120", env = "TCHATS_IDLE_TIMEOUT")]
    pub idle_timeout: u64,
    /// Reject malformed tokens with InvalidToken instead of ignoring them.
    #[arg(
        long,
        env = "TCHATS_STRICT_TOKENS",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub strict_tokens: bool,
    /// TOML file with users, tokens and rooms.
    #[arg(long, env = "TCHATS_SEED")]
    pub seed: Option<PathBuf>,
    /// Print a freshly generated token and exit.
    #[arg(long)]
    pub gen_token: bool,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics and health endpoint.
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Upper bound on each store lookup, in milliseconds.
    pub lookup_timeout_ms: u64,
    /// Interval between WebSocket pings in seconds.
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    pub idle_timeout: u64,
    /// Reject malformed tokens instead of ignoring them.
    pub strict_tokens: bool,
    /// Optional seed file path.
    pub seed: Option<PathBuf>,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        const MAX_ALLOWED_MESSAGE: usize = 1 << 20;
        if self.max_message_size == 0 {
            return Err("max_message_size must be greater than 0".to_string());
        }
        if self.max_message_size > MAX_ALLOWED_MESSAGE {
            return Err(format!(
                "max_message_size exceeds maximum allowed ({} bytes)",
                MAX_ALLOWED_MESSAGE
            ));
        }

        if self.lookup_timeout_ms == 0 {
            return Err("lookup_timeout_ms must be greater than 0".to_string());
        }
        if self.lookup_timeout_ms > 60_000 {
            return Err("lookup_timeout_ms exceeds reasonable limit (60000 ms)".to_string());
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_string());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.idle_timeout == 0 {
            return Err("idle_timeout must be greater than 0".to_string());
        }
        if self.idle_timeout > 86_400 {
            return Err(
                "idle_timeout exceeds reasonable limit (86400 seconds / 1 day)".to_string(),
            );
        }
        Ok(())
    }

    /// Gate settings carried by this configuration.
    #[must_use]
    pub fn gate(&self) -> GateConfig {
        GateConfig {
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
            strict_token_validation: self.strict_tokens,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            max_conns: args.max_conns,
            max_message_size: args.max_message_size,
            lookup_timeout_ms: args.lookup_timeout_ms,
            ping_interval: args.ping_interval,
            idle_timeout: args.idle_timeout,
            strict_tokens: args.strict_tokens,
            seed: args.seed,
        }
    }
}
