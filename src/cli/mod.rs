use std::{borrow::Cow, net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::{
    passwords::{PasswordPolicy, DEFAULT_MAX_PASSWORD_LENGTH, DEFAULT_MIN_PASSWORD_LENGTH},
    server,
};

/// Longest allowed token lifetime, one day.
const MAX_TOKEN_TTL_MINUTES: i64 = 24 * 60;

/// Longest allowed rate limit window, one week.
const MAX_RATE_WINDOW_MINUTES: i64 = 7 * 24 * 60;

/// Longest allowed pause between cleanup sweeps, one hour.
const MAX_CLEANUP_INTERVAL_SECONDS: i64 = 60 * 60;

#[derive(Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// DSN to tell Sentry where to send events.
    ///
    /// If provided, errors will be sent to Sentry.
    #[clap(long = "sentry-dsn", env = "SENTRY_DSN")]
    sentry_dsn: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    Serve(ServeOpts),
}

#[derive(Args)]
struct ServeOpts {
    /// Address to listen on.
    #[clap(long = "bind", default_value = "0.0.0.0:8000", env = "BIND_ADDRESS")]
    bind_address: SocketAddr,

    /// Seconds between sweeps of expired tokens and stale rate limit entries.
    #[clap(
        long = "cleanup-interval-seconds",
        default_value = "60",
        env = "CLEANUP_INTERVAL_SECONDS",
        value_parser = clap::value_parser!(u32).range(1..=MAX_CLEANUP_INTERVAL_SECONDS)
    )]
    cleanup_interval_seconds: u32,

    /// Origin allowed to make credentialed cross-origin requests.
    ///
    /// If this is not set, any origin may make uncredentialed requests.
    #[clap(long = "cors-origin", env = "CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// JSON file holding the user directory.
    #[clap(long = "directory-file", env = "DIRECTORY_FILE")]
    directory_file: PathBuf,

    /// Address to send emails from.
    #[clap(
        long = "email-from-address",
        default_value = "admin@localhost",
        env = "EMAIL_FROM_ADDRESS"
    )]
    email_from_address: String,

    /// Display name to send emails from.
    #[clap(
        long = "email-from-name",
        default_value = "Password Recovery",
        env = "EMAIL_FROM_NAME"
    )]
    email_from_name: String,

    /// Reset requests allowed per email address within one window.
    #[clap(long = "email-limit", default_value = "3", env = "EMAIL_RATE_LIMIT")]
    email_limit: usize,

    #[clap(
        long = "email-window-minutes",
        default_value = "60",
        env = "EMAIL_RATE_WINDOW_MINUTES",
        value_parser = clap::value_parser!(u32).range(1..=MAX_RATE_WINDOW_MINUTES)
    )]
    email_window_minutes: u32,

    /// Reset requests allowed per client address within one window.
    #[clap(long = "ip-limit", default_value = "10", env = "IP_RATE_LIMIT")]
    ip_limit: usize,

    #[clap(
        long = "ip-window-minutes",
        default_value = "60",
        env = "IP_RATE_WINDOW_MINUTES",
        value_parser = clap::value_parser!(u32).range(1..=MAX_RATE_WINDOW_MINUTES)
    )]
    ip_window_minutes: u32,

    /// Distinct keys each rate limiter tracks before rejecting new ones.
    #[clap(
        long = "limiter-max-keys",
        default_value = "10000",
        env = "LIMITER_MAX_KEYS"
    )]
    limiter_max_keys: usize,

    #[clap(
        long = "password-max-length",
        default_value_t = DEFAULT_MAX_PASSWORD_LENGTH,
        env = "PASSWORD_MAX_LENGTH"
    )]
    password_max_length: usize,

    #[clap(
        long = "password-min-length",
        default_value_t = DEFAULT_MIN_PASSWORD_LENGTH,
        env = "PASSWORD_MIN_LENGTH"
    )]
    password_min_length: usize,

    /// Page the reset link in emails points to.
    ///
    /// The token is appended as a `token` query parameter.
    #[clap(
        long = "reset-url",
        default_value = "http://localhost:8000/reset-password",
        env = "RESET_URL"
    )]
    reset_url: String,

    /// API key for SendGrid.
    ///
    /// If provided, emails will be sent using SendGrid. If this is not set,
    /// emails will be printed to stdout.
    #[clap(long = "sendgrid-key", env = "SENDGRID_KEY")]
    sendgrid_key: Option<String>,

    /// Maximum number of outstanding reset tokens.
    #[clap(
        long = "token-capacity",
        default_value = "10000",
        env = "TOKEN_CAPACITY"
    )]
    token_capacity: usize,

    /// Minutes a reset token stays valid.
    #[clap(
        long = "token-ttl-minutes",
        default_value = "15",
        env = "TOKEN_TTL_MINUTES",
        value_parser = clap::value_parser!(u32).range(1..=MAX_TOKEN_TTL_MINUTES)
    )]
    token_ttl_minutes: u32,

    /// Use `Forwarded` and `X-Forwarded-For` headers to find client
    /// addresses. Only enable this behind a reverse proxy that sets them.
    #[clap(long = "trust-proxy-headers", env = "TRUST_PROXY_HEADERS")]
    trust_proxy_headers: bool,
}

impl From<ServeOpts> for server::Options {
    fn from(opts: ServeOpts) -> Self {
        Self {
            bind_address: opts.bind_address,
            cleanup_interval: Duration::from_secs(u64::from(opts.cleanup_interval_seconds)),
            cors_origin: opts.cors_origin,
            directory_file: opts.directory_file,
            email_from_address: opts.email_from_address,
            email_from_name: opts.email_from_name,
            email_rate_limit: opts.email_limit,
            email_rate_window: chrono::Duration::minutes(i64::from(opts.email_window_minutes)),
            ip_rate_limit: opts.ip_limit,
            ip_rate_window: chrono::Duration::minutes(i64::from(opts.ip_window_minutes)),
            limiter_max_keys: opts.limiter_max_keys,
            password_policy: PasswordPolicy {
                min_length: opts.password_min_length,
                max_length: opts.password_max_length,
                ..Default::default()
            },
            reset_url: opts.reset_url,
            sendgrid_key: opts.sendgrid_key,
            token_capacity: opts.token_capacity,
            token_ttl: chrono::Duration::minutes(i64::from(opts.token_ttl_minutes)),
            trust_proxy_headers: opts.trust_proxy_headers,
        }
    }
}

pub async fn run_with_sys_args() -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;

    let cli = Cli::parse();

    let sentry_config = cli.sentry_dsn.map(|dsn| {
        debug!("Enabled sentry.");

        let release_name = option_env!("GIT_SHA")
            .map(Cow::from)
            .or_else(|| sentry::release_name!());

        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: release_name,
                ..Default::default()
            },
        ))
    });

    let sentry_tracing_layer = if sentry_config.is_some() {
        Some(sentry_tracing::layer())
    } else {
        None
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sentry_tracing_layer)
        .init();

    match cli.command {
        Commands::Serve(opts) => server::serve(opts.into()).await,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> server::Options {
        let cli = Cli::try_parse_from(args).expect("arguments should parse");

        match cli.command {
            Commands::Serve(opts) => opts.into(),
        }
    }

    #[test]
    fn serve_defaults() {
        let opts = parse(&["password-recovery", "serve", "--directory-file", "users.json"]);

        assert_eq!("0.0.0.0:8000", opts.bind_address.to_string());
        assert_eq!(Duration::from_secs(60), opts.cleanup_interval);
        assert_eq!(3, opts.email_rate_limit);
        assert_eq!(chrono::Duration::minutes(60), opts.email_rate_window);
        assert_eq!(10, opts.ip_rate_limit);
        assert_eq!(10_000, opts.limiter_max_keys);
        assert_eq!(8, opts.password_policy.min_length);
        assert_eq!(10_000, opts.token_capacity);
        assert_eq!(chrono::Duration::minutes(15), opts.token_ttl);
        assert!(!opts.trust_proxy_headers);
        assert!(opts.sendgrid_key.is_none());
    }

    #[test]
    fn serve_overrides() {
        let opts = parse(&[
            "password-recovery",
            "serve",
            "--directory-file",
            "users.json",
            "--token-ttl-minutes",
            "30",
            "--email-limit",
            "5",
            "--trust-proxy-headers",
        ]);

        assert_eq!(chrono::Duration::minutes(30), opts.token_ttl);
        assert_eq!(5, opts.email_rate_limit);
        assert!(opts.trust_proxy_headers);
    }

    #[test]
    fn serve_requires_directory_file() {
        assert!(Cli::try_parse_from(["password-recovery", "serve"]).is_err());
    }

    fn rejects(flag: &str, value: &str) -> bool {
        Cli::try_parse_from([
            "password-recovery",
            "serve",
            "--directory-file",
            "users.json",
            flag,
            value,
        ])
        .is_err()
    }

    #[test]
    fn serve_rejects_non_positive_durations() {
        for flag in [
            "--cleanup-interval-seconds",
            "--email-window-minutes",
            "--ip-window-minutes",
            "--token-ttl-minutes",
        ] {
            assert!(rejects(flag, "0"), "{} accepted 0", flag);
            assert!(rejects(flag, "-60"), "{} accepted -60", flag);
        }
    }

    #[test]
    fn serve_rejects_oversized_durations() {
        assert!(rejects("--token-ttl-minutes", "1441"));
        assert!(rejects("--token-ttl-minutes", "9223372036854775807"));
        assert!(rejects("--email-window-minutes", "10081"));
        assert!(rejects("--ip-window-minutes", "10081"));
        assert!(rejects("--cleanup-interval-seconds", "3601"));
    }

    #[test]
    fn serve_accepts_maximum_durations() {
        let opts = parse(&[
            "password-recovery",
            "serve",
            "--directory-file",
            "users.json",
            "--token-ttl-minutes",
            "1440",
            "--ip-window-minutes",
            "10080",
            "--cleanup-interval-seconds",
            "3600",
        ]);

        assert_eq!(chrono::Duration::days(1), opts.token_ttl);
        assert_eq!(chrono::Duration::weeks(1), opts.ip_rate_window);
        assert_eq!(Duration::from_secs(3600), opts.cleanup_interval);
    }
}
