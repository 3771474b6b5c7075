//! Command-line and file configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::Deserialize;

const DEFAULT_LISTEN: &str = "127.0.0.1:1143";

/// Command-line arguments. Anything given here overrides the config file.
#[derive(Debug, Default, Parser)]
#[command(name = "mailgate", version, about = "In-memory IMAP server")]
pub struct Cli {
    /// Address to listen on.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// TOML config file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// PEM certificate chain; enables STARTTLS together with `--tls-key`.
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key.
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Login name of the seeded account.
    #[arg(long)]
    pub username: Option<String>,

    /// Password of the seeded account.
    #[arg(long)]
    pub password: Option<String>,

    /// Allow LOGIN and AUTHENTICATE without TLS.
    #[arg(long)]
    pub insecure_auth: bool,
}

/// Contents of the config file. Every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Address to listen on.
    pub listen: Option<SocketAddr>,
    /// TLS settings.
    pub tls: Option<TlsFiles>,
    /// Seeded account.
    pub account: Option<Account>,
    /// Allow plaintext authentication.
    pub insecure_auth: Option<bool>,
}

/// Certificate and key paths.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TlsFiles {
    /// PEM certificate chain.
    pub cert: PathBuf,
    /// PEM private key.
    pub key: PathBuf,
}

/// Login credentials.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Effective settings after merging the file and the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Address to listen on.
    pub listen: SocketAddr,
    /// TLS files, if STARTTLS is enabled.
    pub tls: Option<TlsFiles>,
    /// Seeded account.
    pub account: Account,
    /// Allow plaintext authentication.
    pub insecure_auth: bool,
}

impl FileConfig {
    /// Reads and parses a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl Settings {
    /// Loads the config file named by `cli`, if any, and applies the
    /// command-line overrides.
    pub fn load(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(file, cli)
    }

    fn merge(file: FileConfig, cli: Cli) -> Result<Self> {
        let listen = match (cli.listen, file.listen) {
            (Some(addr), _) | (None, Some(addr)) => addr,
            (None, None) => DEFAULT_LISTEN.parse()?,
        };

        let tls = match (cli.tls_cert, cli.tls_key) {
            (Some(cert), Some(key)) => Some(TlsFiles { cert, key }),
            _ => file.tls,
        };

        let file_account = file.account;
        let username = cli
            .username
            .or_else(|| file_account.as_ref().map(|a| a.username.clone()))
            .context("no account configured: pass --username or set [account] in the config file")?;
        let password = cli
            .password
            .or_else(|| file_account.map(|a| a.password))
            .context("no password configured: pass --password or set [account] in the config file")?;

        Ok(Self {
            listen,
            tls,
            account: Account { username, password },
            insecure_auth: cli.insecure_auth || file.insecure_auth.unwrap_or(false),
        })
    }
}

impl TlsFiles {
    /// Reads the certificate chain and private key.
    pub fn load(&self) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let certs = CertificateDer::pem_file_iter(&self.cert)
            .with_context(|| format!("opening {}", self.cert.display()))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("reading certificates from {}", self.cert.display()))?;
        if certs.is_empty() {
            anyhow::bail!("no certificates in {}", self.cert.display());
        }
        let key = PrivateKeyDer::from_pem_file(&self.key)
            .with_context(|| format!("reading private key from {}", self.key.display()))?;
        Ok((certs, key))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn account_cli() -> Cli {
        Cli {
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            ..Cli::default()
        }
    }

    #[test]
    fn defaults_without_file() {
        let settings = Settings::merge(FileConfig::default(), account_cli()).unwrap();
        assert_eq!(settings.listen, "127.0.0.1:1143".parse().unwrap());
        assert_eq!(settings.tls, None);
        assert_eq!(settings.account.username, "alice");
        assert!(!settings.insecure_auth);
    }

    #[test]
    fn parse_file() {
        let file = FileConfig::parse(
            r#"
            listen = "0.0.0.0:143"
            insecure_auth = true

            [tls]
            cert = "/etc/mailgate/cert.pem"
            key = "/etc/mailgate/key.pem"

            [account]
            username = "bob"
            password = "hunter2"
            "#,
        )
        .unwrap();
        assert_eq!(file.listen, Some("0.0.0.0:143".parse().unwrap()));
        assert_eq!(file.insecure_auth, Some(true));
        assert_eq!(
            file.tls.unwrap().cert,
            PathBuf::from("/etc/mailgate/cert.pem")
        );
        assert_eq!(file.account.unwrap().username, "bob");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::parse("port = 143").is_err());
    }

    #[test]
    fn command_line_wins() {
        let file = FileConfig::parse(
            r#"
            listen = "0.0.0.0:143"
            [account]
            username = "bob"
            password = "hunter2"
            "#,
        )
        .unwrap();
        let cli = Cli {
            listen: Some("127.0.0.1:9143".parse().unwrap()),
            password: Some("override".to_string()),
            ..Cli::default()
        };
        let settings = Settings::merge(file, cli).unwrap();
        assert_eq!(settings.listen, "127.0.0.1:9143".parse().unwrap());
        assert_eq!(settings.account.username, "bob");
        assert_eq!(settings.account.password, "override");
    }

    #[test]
    fn missing_account_is_an_error() {
        assert!(Settings::merge(FileConfig::default(), Cli::default()).is_err());
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "mailgate",
            "--listen",
            "127.0.0.1:143",
            "--tls-cert",
            "cert.pem",
            "--tls-key",
            "key.pem",
            "--insecure-auth",
        ])
        .unwrap();
        assert_eq!(cli.tls_cert, Some(PathBuf::from("cert.pem")));
        assert!(cli.insecure_auth);
    }

    #[test]
    fn cli_requires_both_tls_files() {
        assert!(Cli::try_parse_from(["mailgate", "--tls-cert", "cert.pem"]).is_err());
    }
}
