use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use url::Url;

use crate::{config::ConfigError, gateway::BackendConfig};

pub const ARG_BACKEND_URL: &str = "backend-url";
pub const ARG_BACKEND_REFRESH_PATH: &str = "backend-refresh-path";
pub const ARG_BACKEND_TIMEOUT_SECONDS: &str = "backend-timeout-seconds";
pub const ARG_REFRESH_RETRY_ATTEMPTS: &str = "refresh-retry-attempts";

#[derive(Debug)]
pub struct Options {
    pub config: BackendConfig,
}

impl Options {
    /// Build the backend configuration from parsed arguments.
    ///
    /// # Errors
    /// Returns an error if the backend URL is missing, unparsable or not http(s).
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let raw = matches
            .get_one::<String>(ARG_BACKEND_URL)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_BACKEND_URL}"))?;

        let url = Url::parse(raw).map_err(|err| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason: err.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: raw.clone(),
                reason: "scheme must be http or https".to_string(),
            }
            .into());
        }

        let mut config = BackendConfig::new(url);

        if let Some(path) = matches.get_one::<String>(ARG_BACKEND_REFRESH_PATH) {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidRoute(path.clone()).into());
            }
            config = config.with_refresh_path(path.clone());
        }

        if let Some(seconds) = matches.get_one::<u64>(ARG_BACKEND_TIMEOUT_SECONDS) {
            config = config.with_timeout_seconds(*seconds);
        }

        if let Some(attempts) = matches.get_one::<u32>(ARG_REFRESH_RETRY_ATTEMPTS) {
            config = config.with_retry_attempts(*attempts);
        }

        Ok(Self { config })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKEND_URL)
                .long(ARG_BACKEND_URL)
                .help("Base URL of the authorization backend, example: https://api.example.com")
                .env("SESSIONGATE_BACKEND_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_BACKEND_REFRESH_PATH)
                .long(ARG_BACKEND_REFRESH_PATH)
                .help("Backend path that exchanges a refresh token for a new pair")
                .env("SESSIONGATE_BACKEND_REFRESH_PATH")
                .default_value("/auth/refresh"),
        )
        .arg(
            Arg::new(ARG_BACKEND_TIMEOUT_SECONDS)
                .long(ARG_BACKEND_TIMEOUT_SECONDS)
                .help("Timeout for calls to the backend in seconds")
                .env("SESSIONGATE_BACKEND_TIMEOUT_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_RETRY_ATTEMPTS)
                .long(ARG_REFRESH_RETRY_ATTEMPTS)
                .help("Extra attempts when the backend is unreachable during a refresh")
                .env("SESSIONGATE_REFRESH_RETRY_ATTEMPTS")
                .default_value("0")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    const VARS: [(&str, Option<&str>); 4] = [
        ("SESSIONGATE_BACKEND_URL", None),
        ("SESSIONGATE_BACKEND_REFRESH_PATH", None),
        ("SESSIONGATE_BACKEND_TIMEOUT_SECONDS", None),
        ("SESSIONGATE_REFRESH_RETRY_ATTEMPTS", None),
    ];

    fn parse(args: &[&str]) -> Result<Options> {
        let mut argv = vec!["sessiongate"];
        argv.extend_from_slice(args);
        let matches = with_args(Command::new("sessiongate")).try_get_matches_from(argv)?;
        Options::parse(&matches)
    }

    #[test]
    fn defaults() {
        temp_env::with_vars(VARS, || {
            let options = parse(&["--backend-url", "http://api:8000"]).unwrap();
            assert_eq!(options.config.base_url().as_str(), "http://api:8000/");
            assert_eq!(options.config.refresh_path(), "/auth/refresh");
            assert_eq!(options.config.timeout(), Duration::from_secs(30));
            assert_eq!(options.config.retry_attempts(), 0);
        });
    }

    #[test]
    fn from_env() {
        temp_env::with_vars(
            [
                ("SESSIONGATE_BACKEND_URL", Some("https://api.sessiongate.dev")),
                ("SESSIONGATE_BACKEND_REFRESH_PATH", Some("/v2/token/refresh")),
                ("SESSIONGATE_BACKEND_TIMEOUT_SECONDS", Some("5")),
                ("SESSIONGATE_REFRESH_RETRY_ATTEMPTS", Some("2")),
            ],
            || {
                let options = parse(&[]).unwrap();
                assert_eq!(options.config.refresh_path(), "/v2/token/refresh");
                assert_eq!(options.config.timeout(), Duration::from_secs(5));
                assert_eq!(options.config.retry_attempts(), 2);
            },
        );
    }

    #[test]
    fn rejects_bad_urls() {
        temp_env::with_vars(VARS, || {
            assert!(parse(&["--backend-url", "not a url"]).is_err());
            assert!(parse(&["--backend-url", "ftp://api:21"]).is_err());
            assert!(parse(&[
                "--backend-url",
                "http://api:8000",
                "--backend-refresh-path",
                "auth/refresh"
            ])
            .is_err());
        });
    }

    #[test]
    fn rejects_zero_timeout() {
        temp_env::with_vars(VARS, || {
            assert!(parse(&[
                "--backend-url",
                "http://api:8000",
                "--backend-timeout-seconds",
                "0"
            ])
            .is_err());
        });
    }
}
