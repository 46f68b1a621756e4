use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use imap_session::{
    ConnectionState, Data, Error, Response, ResponseData, Session, SessionConfig,
    UntaggedResponse,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

enum Step {
    Send(&'static [u8]),
    Expect(&'static [u8]),
}

use Step::*;

/// Play the server side of a scripted conversation. Returns the stream so
/// callers can decide whether to keep the connection open or let it drop.
async fn play(mut stream: DuplexStream, steps: Vec<Step>) -> DuplexStream {
    for step in steps {
        match step {
            Send(data) => stream.write_all(data).await.unwrap(),
            Expect(expected) => {
                let mut buf = vec![0u8; expected.len()];
                stream.read_exact(&mut buf).await.unwrap();
                assert_eq!(
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&buf)
                );
            }
        }
    }

    stream
}

fn serve(stream: DuplexStream, steps: Vec<Step>) {
    tokio::spawn(async move {
        play(stream, steps).await;
    });
}

fn serve_and_hold(stream: DuplexStream, steps: Vec<Step>) {
    tokio::spawn(async move {
        let _stream = play(stream, steps).await;
        std::future::pending::<()>().await;
    });
}

fn config() -> SessionConfig {
    SessionConfig {
        idle_response_timeout: Duration::from_millis(200),
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn test_greeting_primes_state_and_capabilities() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![Send(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")],
    );

    let session = Session::connect(client, config()).await.unwrap();

    assert_eq!(session.state(), ConnectionState::NotAuthenticated);
    assert!(session.has_capability("IMAP4rev1"));
    assert!(session.has_capability("auth=plain"));
    assert!(!session.has_capability("IDLE"));
}

#[tokio::test]
async fn test_preauth_greeting() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(server, vec![Send(b"* PREAUTH welcome back\r\n")]);

    let session = Session::connect(client, config()).await.unwrap();

    assert_eq!(session.state(), ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_bye_greeting_refuses_connection() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(server, vec![Send(b"* BYE try again later\r\n")]);

    let error = Session::connect(client, config()).await.unwrap_err();

    assert!(matches!(error, Error::ConnectionRefused(text) if text == "try again later"));
}

#[tokio::test]
async fn test_login_and_select() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n"),
            Expect(b"A0001 LOGIN \"alice\" \"pa55w0rd\"\r\n"),
            Send(b"A0001 OK [CAPABILITY IMAP4rev1 IDLE UNSELECT] completed\r\n"),
            Expect(b"A0002 SELECT \"INBOX\"\r\n"),
            Send(b"* 172 EXISTS\r\n"),
            Send(b"* 1 RECENT\r\n"),
            Send(b"* FLAGS (\\Answered \\Seen)\r\n"),
            Send(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n"),
            Send(b"A0002 OK [READ-WRITE] SELECT completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    session.login("alice", "pa55w0rd").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
    // LOGIN invalidated the pre-auth capabilities and re-primed them from
    // the completion code.
    assert!(session.has_capability("IDLE"));
    assert!(!session.has_capability("AUTH=PLAIN"));

    session.select("INBOX").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Selected);

    assert_eq!(
        session.responses("EXISTS"),
        vec![ResponseData::Data(Data::Exists(172))]
    );
    assert_eq!(
        session.responses("RECENT"),
        vec![ResponseData::Data(Data::Recent(1))]
    );
    // Code-carried data is indexed under the code name.
    assert_eq!(session.responses("UIDVALIDITY").len(), 1);
}

#[tokio::test]
async fn test_login_with_literal_password() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 LOGIN \"alice\" {9}\r\n"),
            Send(b"+ go ahead\r\n"),
            Expect("pä55w0rd\r\n".as_bytes()),
            Send(b"A0001 OK completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    session.login("alice", "pä55w0rd").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_authenticate_multi_round() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 AUTHENTICATE LOGIN\r\n"),
            Send(b"+ VXNlcm5hbWU6\r\n"),
            Expect(b"YWxpY2U=\r\n"),
            Send(b"+ UGFzc3dvcmQ6\r\n"),
            Expect(b"cGE1NXcwcmQ=\r\n"),
            Send(b"A0001 OK [CAPABILITY IMAP4rev1 IDLE] welcome\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    session
        .authenticate("LOGIN", |challenge| {
            if challenge == b"Username:" {
                b"alice".to_vec()
            } else {
                b"pa55w0rd".to_vec()
            }
        })
        .await
        .unwrap();

    assert_eq!(session.state(), ConnectionState::Authenticated);
    assert!(session.has_capability("IDLE"));
}

#[tokio::test]
async fn test_rejected_select_before_login_keeps_state() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 SELECT \"INBOX\"\r\n"),
            Send(b"A0001 NO please log in first\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let error = session.select("INBOX").await.unwrap_err();
    assert!(matches!(error, Error::CommandRejected(_)));

    // A failed SELECT only demotes a selected connection; it never
    // promotes an unauthenticated one.
    assert_eq!(session.state(), ConnectionState::NotAuthenticated);
}

#[tokio::test]
async fn test_no_completion_is_an_error_but_not_fatal() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 SELECT \"nonexistent\"\r\n"),
            Send(b"A0001 NO Mailbox does not exist\r\n"),
            Expect(b"A0002 NOOP\r\n"),
            Send(b"A0002 OK NOOP completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let error = session.select("nonexistent").await.unwrap_err();
    assert!(matches!(error, Error::CommandRejected(ref tagged)
        if tagged.text == "Mailbox does not exist"));

    // The connection stays usable.
    session.noop().await.unwrap();
}

#[tokio::test]
async fn test_bad_completion_is_an_error_but_not_fatal() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 NOOP\r\n"),
            Send(b"A0001 BAD what\r\n"),
            Expect(b"A0002 NOOP\r\n"),
            Send(b"A0002 OK NOOP completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let error = session.noop().await.unwrap_err();
    assert!(matches!(error, Error::ProtocolViolation(_)));

    session.noop().await.unwrap();
}

#[tokio::test]
async fn test_pipelined_commands_resolve_out_of_order() {
    let (client, server) = tokio::io::duplex(1024);

    // Read two command lines, then answer them in reverse order.
    tokio::spawn(async move {
        let mut stream = play(server, vec![Send(b"* OK ready\r\n")]).await;

        let mut received = Vec::new();
        while received.iter().filter(|&&b| b == b'\n').count() < 2 {
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte).await.unwrap();
            received.push(byte[0]);
        }

        let received = String::from_utf8(received).unwrap();
        let mut tags: Vec<&str> = received
            .lines()
            .map(|line| line.split(' ').next().unwrap())
            .collect();
        assert_eq!(tags.len(), 2);
        tags.reverse();

        for tag in tags {
            stream
                .write_all(format!("{tag} OK done\r\n").as_bytes())
                .await
                .unwrap();
        }

        std::future::pending::<()>().await;
    });

    let session = Session::connect(client, config()).await.unwrap();

    let (first, second) = tokio::join!(session.noop(), session.noop());

    let first = first.unwrap();
    let second = second.unwrap();
    assert_ne!(first.tag, second.tag);
}

#[tokio::test]
async fn test_unsolicited_bye_fails_blocked_and_future_callers() {
    let (client, server) = tokio::io::duplex(1024);
    serve(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 NOOP\r\n"),
            Send(b"* BYE system going down\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let error = session.noop().await.unwrap_err();
    assert!(matches!(error, Error::UnexpectedDisconnect(ref text)
        if text == "system going down"));

    // The failure is replayed without blocking.
    let error = session.noop().await.unwrap_err();
    assert!(matches!(error, Error::UnexpectedDisconnect(_)));
}

#[tokio::test]
async fn test_malformed_response_is_dropped() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 NOOP\r\n"),
            Send(b"!!! this is not imap\r\n"),
            Send(b"A0001 OK NOOP completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    session.noop().await.unwrap();
}

#[tokio::test]
async fn test_tagged_response_for_unknown_tag_is_dropped() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 NOOP\r\n"),
            Send(b"ZZZZ OK nobody asked\r\n"),
            Send(b"A0001 OK NOOP completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    session.noop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_status_on_pending_tag_is_fatal() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 NOOP\r\n"),
            Send(b"A0001 WAT done\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let error = session.noop().await.unwrap_err();
    assert!(matches!(error, Error::InvalidTaggedResponse(_)));

    // The failure is replayed to later callers.
    let error = session.noop().await.unwrap_err();
    assert!(matches!(error, Error::InvalidTaggedResponse(_)));
}

#[tokio::test]
async fn test_unknown_untagged_data_reaches_registry() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 NOOP\r\n"),
            Send(b"* STATUS INBOX (MESSAGES 231)\r\n"),
            Send(b"A0001 OK NOOP completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    session.noop().await.unwrap();

    assert_eq!(
        session.responses("STATUS"),
        vec![ResponseData::Data(Data::Other {
            name: "STATUS".into(),
            raw: b"INBOX (MESSAGES 231)".to_vec(),
        })]
    );
}

#[tokio::test]
async fn test_search() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 SEARCH UNSEEN\r\n"),
            Send(b"* SEARCH 2 84 882\r\n"),
            Send(b"A0001 OK SEARCH completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let found = session.search("UNSEEN").await.unwrap();
    let found: Vec<u32> = found.into_iter().map(u32::from).collect();

    assert_eq!(found, vec![2, 84, 882]);
    // The SEARCH data was drained.
    assert!(session.responses("SEARCH").is_empty());
}

#[tokio::test]
async fn test_fetch() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 FETCH 1:2 (FLAGS)\r\n"),
            Send(b"* 1 FETCH (FLAGS (\\Seen))\r\n"),
            Send(b"* 2 FETCH (FLAGS ())\r\n"),
            Send(b"A0001 OK FETCH completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let fetched = session.fetch("1:2", "(FLAGS)").await.unwrap();

    assert_eq!(fetched.len(), 2);
    assert!(matches!(fetched[0], Data::Fetch { seq, .. } if seq.get() == 1));
    assert!(matches!(fetched[1], Data::Fetch { seq, .. } if seq.get() == 2));
}

#[tokio::test]
async fn test_logout() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 LOGOUT\r\n"),
            Send(b"* BYE logging out\r\n"),
            Send(b"A0001 OK LOGOUT completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    session.logout().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Logout);

    let error = session.noop().await.unwrap_err();
    assert!(matches!(error, Error::ConnectionClosed));
}

#[tokio::test]
async fn test_idle_timeout_yields_none() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 IDLE\r\n"),
            Send(b"+ idling\r\n"),
            Expect(b"DONE\r\n"),
            // Never answer the DONE.
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let completion = session
        .idle(Some(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(completion, None);
}

#[tokio::test]
async fn test_idle_is_bounded_without_continuation() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 IDLE\r\n"),
            // The continuation never comes; the duration still bounds the
            // wait, and the idle is terminated.
            Expect(b"DONE\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let completion = session
        .idle(Some(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(completion, None);
}

#[tokio::test]
async fn test_idle_done_wakes_idler() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 IDLE\r\n"),
            Send(b"+ idling\r\n"),
            Send(b"* 3 EXISTS\r\n"),
            Expect(b"DONE\r\n"),
            Send(b"A0001 OK IDLE terminated\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let idler = session.clone();
    let idle = tokio::spawn(async move { idler.idle(None).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    session.idle_done();

    let completion = idle.await.unwrap().unwrap();
    assert!(completion.is_some());
    assert_eq!(
        session.responses("EXISTS"),
        vec![ResponseData::Data(Data::Exists(3))]
    );
}

#[tokio::test]
async fn test_idle_refused() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 IDLE\r\n"),
            Send(b"A0001 BAD IDLE not supported\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let error = session.idle(None).await.unwrap_err();
    assert!(matches!(error, Error::ProtocolViolation(_)));
}

#[tokio::test]
async fn test_response_handler_sees_untagged_data() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* OK ready\r\n"),
            Expect(b"A0001 NOOP\r\n"),
            Send(b"* 7 EXISTS\r\n"),
            Send(b"A0001 OK NOOP completed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = session.add_response_handler(move |response| {
        if let Response::Untagged(UntaggedResponse::Data(data)) = response {
            sink.lock().unwrap().push(data.name().to_owned());
        }
    });

    session.noop().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["EXISTS".to_owned()]);
    session.remove_response_handler(id);
}

#[tokio::test]
async fn test_close_returns_to_authenticated() {
    let (client, server) = tokio::io::duplex(1024);
    serve_and_hold(
        server,
        vec![
            Send(b"* PREAUTH welcome\r\n"),
            Expect(b"A0001 SELECT \"INBOX\"\r\n"),
            Send(b"* 1 EXISTS\r\n"),
            Send(b"A0001 OK SELECT completed\r\n"),
            Expect(b"A0002 CLOSE\r\n"),
            Send(b"A0002 OK [CLOSED] mailbox closed\r\n"),
        ],
    );

    let session = Session::connect(client, config()).await.unwrap();

    session.select("INBOX").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Selected);

    session.close().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_disconnect() {
    let (client, server) = tokio::io::duplex(1024);
    serve(server, vec![Send(b"* OK ready\r\n")]);

    let session = Session::connect(client, config()).await.unwrap();

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Logout);

    let error = session.noop().await.unwrap_err();
    assert!(matches!(error, Error::ConnectionClosed));
}
