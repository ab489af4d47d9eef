//! Command line arguments

use std::path::PathBuf;

use anyhow::{Context, bail};
use bmsg_core::Config;

/// Run mode
#[derive(Debug, PartialEq)]
pub enum RunMode {
    /// HTTP API (and Telegram bot when configured)
    Server,
    Help,
    Version,
}

/// Parsed command line
#[derive(Debug, PartialEq)]
pub struct Args {
    pub mode: RunMode,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secret: Option<String>,
    pub config: Option<PathBuf>,
    pub no_bot: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            mode: RunMode::Server,
            host: None,
            port: None,
            secret: None,
            config: None,
            no_bot: false,
        }
    }
}

impl Args {
    /// Parse arguments, program name excluded
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" | "-h" => parsed.mode = RunMode::Help,
                "--version" | "-v" => parsed.mode = RunMode::Version,
                "--no-bot" => parsed.no_bot = true,
                "--host" => parsed.host = Some(value(&mut args, "--host")?),
                "--port" | "-p" => {
                    let port = value(&mut args, "--port")?;
                    parsed.port = Some(
                        port.parse()
                            .with_context(|| format!("Invalid port: {}", port))?,
                    );
                }
                "--secret" => parsed.secret = Some(value(&mut args, "--secret")?),
                "--config" | "-c" => parsed.config = Some(value(&mut args, "--config")?.into()),
                other => bail!("Unknown argument: {}", other),
            }
        }

        Ok(parsed)
    }

    /// Flags win over file and environment settings
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(secret) = &self.secret {
            config.server.admin_secret = secret.clone();
        }
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    match args.next() {
        Some(v) if !v.starts_with("--") => Ok(v),
        _ => bail!("{} requires a value", flag),
    }
}

/// Print help message
pub fn print_help() {
    println!("bmsg-server - broadcast message server");
    println!();
    println!("Usage:");
    println!("  bmsg-server [options]");
    println!();
    println!("Options:");
    println!("  --host <addr>        Bind address (default: 0.0.0.0)");
    println!("  -p, --port <port>    Listen port (default: 5000)");
    println!("  --secret <secret>    Admin secret for operator endpoints");
    println!("  -c, --config <file>  Config file (default: ./bmsg.toml if present)");
    println!("  --no-bot             Do not start the Telegram bot");
    println!("  -h, --help           Show this help message");
    println!("  -v, --version        Show version");
    println!();
    println!("Environment Variables:");
    println!("  BMSG_HOST, BMSG_PORT, BMSG_ADMIN_SECRET, BMSG_DB");
    println!("  BMSG_OPEN_BROADCASTS Deliver only the N latest broadcasts to new clients");
    println!("  BMSG_ALLOWED_ORIGINS Comma-separated CORS origins");
    println!("  BMSG_TG_TOKEN        Telegram bot token (optional)");
    println!("  BMSG_TG_ADMIN_IDS    Comma-separated operator chat ids");
    println!("  RUST_LOG             Log filter (default: info)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        assert_eq!(parse(&[]).unwrap(), Args::default());
    }

    #[test]
    fn test_flags() {
        let args = parse(&[
            "--host", "127.0.0.1", "--port", "8080", "--secret", "s3cret", "--config",
            "/etc/bmsg.toml", "--no-bot",
        ])
        .unwrap();
        assert_eq!(args.mode, RunMode::Server);
        assert_eq!(args.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.secret.as_deref(), Some("s3cret"));
        assert_eq!(args.config, Some(PathBuf::from("/etc/bmsg.toml")));
        assert!(args.no_bot);
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["--help"]).unwrap().mode, RunMode::Help);
        assert_eq!(parse(&["-v"]).unwrap().mode, RunMode::Version);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse(&["--port", "http"]).is_err());
        assert!(parse(&["--port"]).is_err());
        assert!(parse(&["--secret", "--no-bot"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }

    #[test]
    fn test_apply_overrides_config() {
        let mut config = Config::default();
        let args = parse(&["--port", "9000", "--secret", "s3cret"]).unwrap();
        args.apply(&mut config);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.uses_default_secret());
    }
}
