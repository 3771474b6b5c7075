//! End-to-end tests: the client against the server over in-memory duplex
//! streams.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]

use std::time::Duration;

use tokio::time::timeout;

use mailgate_imap::auth::PlainClient;
use mailgate_imap::client::{self, UnilateralData};
use mailgate_imap::command::{AppendOptions, SearchReturn};
use mailgate_imap::server::{MemBackend, Options, User};
use mailgate_imap::types::{MailboxAttribute, StatusItem};
use mailgate_imap::{
    Capability, Client, ConnState, Error, FetchAttribute, FetchItems, Flag, Mailbox,
    ResponseCode, RightModification, RightSet, SearchCriteria, SequenceSet, Server, StoreAction,
};

const USER: &str = "test-user";
const PASSWORD: &str = "test-password";

const MESSAGE: &[u8] = b"MIME-Version: 1.0\r\n\
Message-Id: <191101702316132@example.com>\r\n\
Content-Transfer-Encoding: 8bit\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
This is my letter!";

const WAIT: Duration = Duration::from_secs(5);

fn backend() -> MemBackend {
    let backend = MemBackend::new();
    let user = backend.add_user(User::new(USER, PASSWORD));
    user.create(&Mailbox::inbox(), &[]).unwrap();
    user.append(&Mailbox::inbox(), &AppendOptions::default(), MESSAGE)
        .unwrap();
    backend
}

fn server() -> Server {
    Server::new(
        backend(),
        Options {
            insecure_auth: true,
            ..Options::default()
        },
    )
}

async fn connect(server: &Server) -> Client {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = server.clone();
    tokio::spawn(async move {
        let _ = server.serve_connection(server_io).await;
    });
    let client = Client::new(client_io, client::Options::default());
    client.wait_greeting().await.unwrap();
    client
}

async fn login(server: &Server) -> Client {
    let client = connect(server).await;
    client.login(USER, PASSWORD).await.wait().await.unwrap();
    client
}

async fn select_inbox(server: &Server) -> Client {
    let client = login(server).await;
    client.select("INBOX").await.wait().await.unwrap();
    client
}

#[tokio::test]
async fn greeting_announces_capabilities() {
    let server = server();
    let client = connect(&server).await;
    let caps = client.caps();
    assert!(caps.has(&Capability::Imap4Rev2));
    assert!(caps.has(&Capability::Idle));
    assert!(caps.has(&Capability::Acl));
    assert!(caps.has_auth("PLAIN"));
    assert!(!caps.has(&Capability::StartTls));
    assert_eq!(client.state(), ConnState::NotAuthenticated);
}

#[tokio::test]
async fn login_and_logout() {
    let server = server();
    let client = login(&server).await;
    assert_eq!(client.state(), ConnState::Authenticated);
    client.logout().await.wait().await.unwrap();
    timeout(WAIT, client.closed()).await.unwrap();
}

#[tokio::test]
async fn login_with_wrong_password_fails() {
    let server = server();
    let client = connect(&server).await;
    let err = client.login(USER, "nope").await.wait().await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::No {
                code: Some(ResponseCode::AuthenticationFailed),
                ..
            }
        ),
        "got {err:?}"
    );
    assert_eq!(client.state(), ConnState::NotAuthenticated);
}

#[tokio::test]
async fn login_refused_on_plaintext_by_default() {
    let server = Server::new(backend(), Options::default());
    let client = connect(&server).await;
    assert!(client.caps().has(&Capability::LoginDisabled));
    assert!(client.login(USER, PASSWORD).await.wait().await.is_err());
}

#[tokio::test]
async fn authenticate_plain() {
    let server = server();
    let client = connect(&server).await;
    client
        .authenticate(PlainClient::new(USER, PASSWORD))
        .await
        .wait()
        .await
        .unwrap();
    assert_eq!(client.state(), ConnState::Authenticated);

    let other = connect(&server).await;
    let err = other
        .authenticate(PlainClient::new(USER, "wrong"))
        .await
        .wait()
        .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn commands_need_the_right_state() {
    let server = server();
    let client = connect(&server).await;
    assert!(client.create("Nope").await.wait().await.is_err());
}

#[tokio::test]
async fn create_and_list_names() {
    for utf8 in [false, true] {
        for name in ["Test mailbox", "Cafè", "Angus & Julia"] {
            let server = server();
            let client = login(&server).await;
            if utf8 {
                let enabled = client
                    .enable(&[Capability::Utf8Accept])
                    .await
                    .wait()
                    .await
                    .unwrap();
                assert_eq!(enabled, vec![Capability::Utf8Accept]);
            }
            client.create(name).await.wait().await.unwrap();

            let listed = client.list("", "*", &[]).await.collect().await.unwrap();
            assert!(
                listed.iter().any(|l| l.mailbox.as_str() == name),
                "{name:?} missing from {listed:?} (utf8: {utf8})"
            );
        }
    }
}

#[tokio::test]
async fn create_existing_mailbox_fails() {
    let server = server();
    let client = login(&server).await;
    let err = client.create("INBOX").await.wait().await.unwrap_err();
    assert!(matches!(
        err,
        Error::No {
            code: Some(ResponseCode::AlreadyExists),
            ..
        }
    ));
}

#[tokio::test]
async fn list_with_status() {
    let server = server();
    let client = login(&server).await;
    let listed = client
        .list("", "%", &[StatusItem::Messages])
        .await
        .collect()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    let inbox = &listed[0];
    assert_eq!(inbox.mailbox, Mailbox::inbox());
    assert_eq!(inbox.delimiter, Some('/'));
    assert!(inbox.attributes.is_empty());
    assert_eq!(inbox.status.as_ref().unwrap().messages, Some(1));
}

#[tokio::test]
async fn list_reports_special_use_and_children() {
    let backend = backend();
    let user = backend.user(USER).unwrap();
    user.create(&Mailbox::new("Trash"), &[MailboxAttribute::Trash])
        .unwrap();
    user.create(&Mailbox::new("Work/Reports"), &[]).unwrap();
    let server = Server::new(
        backend,
        Options {
            insecure_auth: true,
            ..Options::default()
        },
    );
    let client = login(&server).await;
    let listed = client.list("", "*", &[]).await.collect().await.unwrap();
    let find = |name: &str| listed.iter().find(|l| l.mailbox.as_str() == name).unwrap();
    assert_eq!(find("Trash").attributes, vec![MailboxAttribute::Trash]);
    assert_eq!(find("Work").attributes, vec![MailboxAttribute::HasChildren]);
    assert!(find("Work/Reports").attributes.is_empty());
}

#[tokio::test]
async fn status_counts() {
    let server = server();
    let client = login(&server).await;
    let status = client
        .status("INBOX", &[StatusItem::Messages, StatusItem::Unseen])
        .await
        .wait()
        .await
        .unwrap();
    assert_eq!(status.messages, Some(1));
    assert_eq!(status.unseen, Some(1));
}

#[tokio::test]
async fn select_counts() {
    let server = server();
    let client = login(&server).await;
    let data = client.select("INBOX").await.wait().await.unwrap();
    assert_eq!(data.exists, 1);
    assert!(data.uid_validity.is_some());
    assert_eq!(data.uid_next.unwrap().get(), 2);
    assert!(!data.read_only);
    assert_eq!(client.state(), ConnState::Selected);

    let data = client.examine("INBOX").await.wait().await.unwrap();
    assert!(data.read_only);

    let err = client.select("Missing").await.wait().await.unwrap_err();
    assert!(matches!(
        err,
        Error::No {
            code: Some(ResponseCode::NonExistent),
            ..
        }
    ));
}

#[tokio::test]
async fn fetch_whole_body() {
    let server = server();
    let client = select_inbox(&server).await;
    let messages = client
        .fetch(
            &SequenceSet::single(1).unwrap(),
            FetchItems::Items(vec![FetchAttribute::Uid, FetchAttribute::full_body(false)]),
        )
        .await
        .collect()
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    let body = messages[0].body(&mailgate_imap::command::BodySection::full());
    assert_eq!(body, Some(MESSAGE));
    assert_eq!(messages[0].uid().unwrap().get(), 1);

    let status = client
        .status("INBOX", &[StatusItem::Unseen])
        .await
        .wait()
        .await
        .unwrap();
    assert_eq!(status.unseen, Some(0));
}

#[tokio::test]
async fn fetch_closed_without_reading() {
    let server = server();
    let client = select_inbox(&server).await;
    let fetch = client
        .fetch(&SequenceSet::single(1).unwrap(), FetchItems::Fast)
        .await;
    fetch.close().await.unwrap();
    client.noop().await.wait().await.unwrap();
}

#[tokio::test]
async fn fetch_with_empty_uid_set_fails() {
    let server = server();
    let client = select_inbox(&server).await;
    let result = client
        .uid_fetch(&SequenceSet::empty(), FetchItems::Fast)
        .await
        .collect()
        .await;
    assert!(result.is_err());
    // The connection survives a rejected command
    client.noop().await.wait().await.unwrap();
}

#[tokio::test]
async fn fetch_past_the_last_message_fails() {
    let server = server();
    let client = select_inbox(&server).await;
    let err = client
        .fetch(&SequenceSet::range(1, u32::MAX).unwrap(), FetchItems::Fast)
        .await
        .collect()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::No { .. }));
    client.noop().await.wait().await.unwrap();
}

#[tokio::test]
async fn search_by_header() {
    let server = server();
    let client = select_inbox(&server).await;
    let data = client
        .search(
            SearchCriteria::Header(
                "Message-Id".to_string(),
                "<191101702316132@example.com>".to_string(),
            ),
            None,
        )
        .await
        .wait()
        .await
        .unwrap();
    assert_eq!(data.numbers(), vec![1]);

    let data = client
        .uid_search(SearchCriteria::Subject("nothing".to_string()), None)
        .await
        .wait()
        .await
        .unwrap();
    assert!(data.numbers().is_empty());
}

#[tokio::test]
async fn esearch_count() {
    let server = server();
    let client = select_inbox(&server).await;
    let data = client
        .search(SearchCriteria::All, Some(&[SearchReturn::Count]))
        .await
        .wait()
        .await
        .unwrap();
    assert_eq!(data.count, Some(1));
}

#[tokio::test]
async fn store_then_expunge() {
    let server = server();
    let client = select_inbox(&server).await;
    let expunged = client.expunge().await.collect().await.unwrap();
    assert!(expunged.is_empty());

    let stored = client
        .store(
            &SequenceSet::single(1).unwrap(),
            StoreAction::AddFlags(vec![Flag::Deleted]),
            false,
        )
        .await
        .collect()
        .await
        .unwrap();
    assert!(stored[0].flags().unwrap().is_deleted());

    let expunged = client.expunge().await.collect().await.unwrap();
    assert_eq!(expunged, vec![1]);
}

#[tokio::test]
async fn append_then_select() {
    let server = server();
    let client = login(&server).await;
    client
        .append(
            "INBOX",
            AppendOptions {
                flags: vec![Flag::Seen],
                date: None,
            },
            MESSAGE,
        )
        .await
        .wait()
        .await
        .unwrap();
    let data = client.select("INBOX").await.wait().await.unwrap();
    assert_eq!(data.exists, 2);

    let err = client
        .append("Missing", AppendOptions::default(), MESSAGE)
        .await
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::No {
            code: Some(ResponseCode::TryCreate),
            ..
        }
    ));
}

#[tokio::test]
async fn idle_then_done() {
    let server = server();
    let client = select_inbox(&server).await;
    let idle = client.idle().await;
    timeout(WAIT, idle.close()).await.unwrap().unwrap();
    client.noop().await.wait().await.unwrap();
}

#[tokio::test]
async fn idle_fails_when_connection_closes() {
    let server = server();
    let client = select_inbox(&server).await;
    let idle = client.idle().await;
    client.close().await.unwrap();
    assert!(timeout(WAIT, idle.wait()).await.unwrap().is_err());
}

#[tokio::test]
async fn idle_receives_new_messages() {
    let server = server();
    let watcher = select_inbox(&server).await;
    let mut updates = watcher.updates().unwrap();
    let idle = watcher.idle().await;

    let writer = login(&server).await;
    writer
        .append("INBOX", AppendOptions::default(), MESSAGE)
        .await
        .wait()
        .await
        .unwrap();

    timeout(WAIT, async {
        loop {
            match updates.recv().await {
                Some(UnilateralData::Exists(2)) => break,
                Some(_) => {}
                None => panic!("updates closed"),
            }
        }
    })
    .await
    .unwrap();
    idle.close().await.unwrap();
}

#[tokio::test]
async fn flag_changes_reach_other_sessions() {
    let server = server();
    let first = select_inbox(&server).await;
    let second = select_inbox(&server).await;
    let mut updates = second.updates().unwrap();

    first
        .store(
            &SequenceSet::single(1).unwrap(),
            StoreAction::AddFlags(vec![Flag::Flagged]),
            true,
        )
        .await
        .collect()
        .await
        .unwrap();
    second.noop().await.wait().await.unwrap();

    let update = timeout(WAIT, updates.recv()).await.unwrap().unwrap();
    let UnilateralData::Fetch(message) = update else {
        panic!("expected FETCH, got {update:?}");
    };
    assert!(message.flags().unwrap().contains(&Flag::Flagged));
}

#[tokio::test]
async fn closed_resolves_after_close() {
    let server = server();
    let client = login(&server).await;
    client.close().await.unwrap();
    timeout(WAIT, client.closed()).await.unwrap();
    let err = client.noop().await.wait().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn greeting_eof_fails() {
    let (client_io, server_io) = tokio::io::duplex(1024);
    drop(server_io);
    let client = Client::new(client_io, client::Options::default());
    assert!(timeout(WAIT, client.wait_greeting()).await.unwrap().is_err());
}

#[tokio::test]
async fn shutdown_says_bye() {
    let server = server();
    let client = select_inbox(&server).await;
    let idle = client.idle().await;
    server.shutdown();
    timeout(WAIT, client.closed()).await.unwrap();
    assert!(idle.wait().await.is_err());
}

#[tokio::test]
async fn acl_round_trips() {
    let server = server();
    let client = login(&server).await;

    client
        .set_acl(
            "INBOX",
            USER,
            RightModification::Replace,
            &RightSet::from("akxeilprwtscd"),
        )
        .await
        .wait()
        .await
        .unwrap();
    let acl = client.get_acl("INBOX").await.wait().await.unwrap();
    assert_eq!(acl.rights(USER), Some(&RightSet::from("akxeilprwtscd")));

    client.create("MyFolder").await.wait().await.unwrap();
    let steps = [
        (RightModification::Replace, "ailw", "ailw"),
        (RightModification::Add, "rwi", "ailwr"),
        (RightModification::Remove, "iwc", "alr"),
        (RightModification::Replace, "a", "a"),
        (RightModification::Remove, "a", ""),
    ];
    for (modification, rights, expected) in steps {
        client
            .set_acl("MyFolder", USER, modification, &RightSet::from(rights))
            .await
            .wait()
            .await
            .unwrap();
        let acl = client.get_acl("MyFolder").await.wait().await.unwrap();
        assert_eq!(acl.rights(USER), Some(&RightSet::from(expected)));
        let mine = client.my_rights("MyFolder").await.wait().await.unwrap();
        assert_eq!(mine, RightSet::from(expected));
    }

    client.create("MyFolder/Child").await.wait().await.unwrap();
    for (modification, rights) in [
        (RightModification::Replace, "aelrwtd"),
        (RightModification::Replace, "a"),
    ] {
        client
            .set_acl("MyFolder/Child", USER, modification, &RightSet::from(rights))
            .await
            .wait()
            .await
            .unwrap();
        let mine = client.my_rights("MyFolder/Child").await.wait().await.unwrap();
        assert_eq!(mine, RightSet::from(rights));
    }

    client
        .delete_acl("MyFolder/Child", USER)
        .await
        .wait()
        .await
        .unwrap();

    let err = client
        .set_acl(
            "BibiMailbox",
            USER,
            RightModification::Replace,
            &RightSet::from("a"),
        )
        .await
        .wait()
        .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn starttls_then_login() {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = rustls::pki_types::PrivateKeyDer::Pkcs8(
        rustls::pki_types::PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
    );
    let acceptor =
        mailgate_imap::connection::create_tls_acceptor(vec![cert.der().clone()], key).unwrap();
    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert.der().clone()).unwrap();

    let server = Server::new(
        backend(),
        Options {
            tls: Some(acceptor),
            ..Options::default()
        },
    );
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let task_server = server.clone();
    tokio::spawn(async move {
        let _ = task_server.serve_connection(server_io).await;
    });

    let options = client::Options {
        tls: Some(mailgate_imap::connection::tls_connector_with_roots(roots)),
    };
    let client = timeout(WAIT, Client::new_starttls(client_io, "localhost", options))
        .await
        .unwrap()
        .unwrap();
    client.wait_greeting().await.unwrap();
    client.noop().await.wait().await.unwrap();
    client.login(USER, PASSWORD).await.wait().await.unwrap();
    assert_eq!(client.state(), ConnState::Authenticated);
}
