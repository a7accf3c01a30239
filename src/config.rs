use crate::{
    countdown::DEFAULT_JITTER_SECS,
    poller::DEFAULT_POLL_INTERVAL,
    session_store::DEFAULT_SESSION_TTL_MINS,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const BACKEND_URL_ENV: &str = "PORTAL_BACKEND_URL";
pub const DEFAULT_SESSION_FILE: &str = "~/.hourglass/portal_session.json";
pub const DEFAULT_LOG_FILE: &str = "~/.hourglass/portal.log";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub backend_url: String,
    pub poll_interval: Duration,
    pub session_file: PathBuf,
    pub session_ttl: chrono::Duration,
    pub jitter_secs: u32,
    pub log_file: PathBuf,
    pub reset_session: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            session_file: expand_path(DEFAULT_SESSION_FILE),
            session_ttl: chrono::Duration::minutes(DEFAULT_SESSION_TTL_MINS),
            jitter_secs: DEFAULT_JITTER_SECS,
            log_file: expand_path(DEFAULT_LOG_FILE),
            reset_session: false,
        }
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

pub fn print_usage_and_exit() -> ! {
    println!(
        "Usage: hourglass-portal [--backend-url <url>] [--poll-interval-ms <ms>]\n\
         [--session-file <path>] [--session-ttl-mins <mins>] [--jitter-secs <secs>]\n\
         [--log-file <path>] [--reset-session]\n\
         \n\
         Flags:\n\
           --backend-url <url>        Portal backend (default {}, or ${})\n\
           --poll-interval-ms <ms>    Game state poll interval (default {})\n\
           --session-file <path>      Where the session survives restarts (default {})\n\
           --session-ttl-mins <mins>  Lifetime of a saved session (default {})\n\
           --jitter-secs <secs>       Countdown jitter window, +/- (default {})\n\
           --log-file <path>          Log destination (default {})\n\
           --reset-session            Forget the saved session before starting",
        DEFAULT_BACKEND_URL,
        BACKEND_URL_ENV,
        DEFAULT_POLL_INTERVAL.as_millis(),
        DEFAULT_SESSION_FILE,
        DEFAULT_SESSION_TTL_MINS,
        DEFAULT_JITTER_SECS,
        DEFAULT_LOG_FILE,
    );
    std::process::exit(0);
}

pub fn parse_cli_args() -> Result<AppConfig> {
    let env_backend = std::env::var(BACKEND_URL_ENV).ok();
    parse_args(std::env::args().skip(1), env_backend)
}

/// Flags win over the environment, which wins over defaults.
pub fn parse_args(
    args: impl IntoIterator<Item = String>,
    env_backend: Option<String>,
) -> Result<AppConfig> {
    let mut args = args.into_iter();
    let mut config = AppConfig::default();
    let mut backend_url: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backend-url" => {
                let url = next_value(&mut args, &arg)?;
                if backend_url.is_some() {
                    return Err(eyre!("--backend-url may only be specified once"));
                }
                backend_url = Some(url);
            }
            "--poll-interval-ms" => {
                let ms: u64 = parse_number(&next_value(&mut args, &arg)?, &arg)?;
                if ms == 0 {
                    return Err(eyre!("--poll-interval-ms must be greater than zero"));
                }
                config.poll_interval = Duration::from_millis(ms);
            }
            "--session-file" => {
                config.session_file = expand_path(&next_value(&mut args, &arg)?);
            }
            "--session-ttl-mins" => {
                let mins: i64 = parse_number(&next_value(&mut args, &arg)?, &arg)?;
                if mins <= 0 {
                    return Err(eyre!("--session-ttl-mins must be greater than zero"));
                }
                config.session_ttl = chrono::Duration::minutes(mins);
            }
            "--jitter-secs" => {
                config.jitter_secs = parse_number(&next_value(&mut args, &arg)?, &arg)?;
            }
            "--log-file" => {
                config.log_file = expand_path(&next_value(&mut args, &arg)?);
            }
            "--reset-session" => config.reset_session = true,
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    config.backend_url = backend_url
        .or(env_backend.filter(|url| !url.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    Ok(config)
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| eyre!("{flag} requires a value"))
}

fn parse_number<T>(raw: &str, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .wrap_err_with(|| format!("{flag} expects a number, got '{raw}'"))
}
