//! mailgate - an in-memory IMAP server.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use mailgate_imap::command::AppendOptions;
use mailgate_imap::connection::create_tls_acceptor;
use mailgate_imap::server::{MemBackend, Options, Server, User};
use mailgate_imap::types::{Mailbox, MailboxAttribute};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Cli, Settings};

const FOLDERS: &[(&str, MailboxAttribute)] = &[
    ("Archive", MailboxAttribute::Archive),
    ("Drafts", MailboxAttribute::Drafts),
    ("Flagged", MailboxAttribute::Flagged),
    ("Junk", MailboxAttribute::Junk),
    ("Sent", MailboxAttribute::Sent),
    ("Trash", MailboxAttribute::Trash),
];

const WELCOME: &str = "From: mailgate <postmaster@localhost>\r\n\
Subject: Welcome to mailgate\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
This mailbox lives in memory and is gone when the server stops.\r\n";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailgate=info,mailgate_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load(Cli::parse())?;

    let backend = MemBackend::new();
    seed(&backend, &settings)?;

    let mut options = Options {
        insecure_auth: settings.insecure_auth,
        ..Options::default()
    };
    if let Some(files) = &settings.tls {
        let (certs, key) = files.load()?;
        options.tls = Some(create_tls_acceptor(certs, key).context("building TLS config")?);
        tracing::info!(cert = %files.cert.display(), "STARTTLS enabled");
    } else if !settings.insecure_auth {
        tracing::warn!("no TLS certificate and plaintext auth disabled; nobody can log in");
    }

    let server = Server::new(backend, options);
    let listener = TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("binding {}", settings.listen))?;

    let stopper = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.shutdown();
        }
    });

    server.serve(listener).await?;
    Ok(())
}

/// Creates the account with INBOX, the special-use folders and a welcome
/// message.
fn seed(backend: &MemBackend, settings: &Settings) -> Result<()> {
    let user = backend.add_user(User::new(
        settings.account.username.clone(),
        settings.account.password.clone(),
    ));
    user.create(&Mailbox::inbox(), &[])?;
    for (name, attribute) in FOLDERS {
        user.create(&Mailbox::new(*name), std::slice::from_ref(attribute))?;
    }
    user.append(
        &Mailbox::inbox(),
        &AppendOptions::default(),
        WELCOME.as_bytes(),
    )?;
    tracing::info!(user = %settings.account.username, "account ready");
    Ok(())
}
