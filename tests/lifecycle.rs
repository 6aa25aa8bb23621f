//! Lifecycle state machine scenarios against a scripted fake transport
//!
//! All tests run on tokio's paused clock, so every timestamp is exact.

mod common;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use common::{elapsed_ms, fake_link, wait_status, Recorder};
use resocket::{
    DisconnectCause, Event, Message, QueryParams, QueryProvider, RetryInfo, Socket,
    SocketError, StaticQuery, Status, FixedDelay, UrlProvider,
};

#[tokio::test(start_paused = true)]
async fn clean_connect_send_close() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/").connector(connector).build();
    let recorder = Recorder::attach(&socket);
    assert_eq!(socket.status(), Status::Connecting);

    sleep(Duration::from_millis(10)).await;
    let mut peer = server.next_attempt().await.accept();
    wait_status(&socket, Status::Connected).await;
    assert!(socket.can_send());

    socket.send("a").unwrap();
    assert_eq!(peer.recv().await, Some(Message::from("a")));

    socket.close();
    wait_status(&socket, Status::Disconnected).await;
    assert!(peer.client_closed());

    let events = recorder.events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], Event::Status(Status::Connected));
    assert_eq!(events[1], Event::Open);
    assert_eq!(events[2], Event::Status(Status::Disconnected));
    assert!(matches!(&events[3], Event::Close(close) if close.code == 1000 && close.was_clean));

    // No disconnect event for a caller-initiated close
    assert!(!events.iter().any(|e| matches!(e, Event::Disconnect(_))));

    let timed = recorder.timed();
    assert_eq!(timed[0].0, 10, "connected at the accept instant");
}

#[tokio::test(start_paused = true)]
async fn stop_retry_terminates_without_scheduling() {
    struct StopQuery;

    #[async_trait]
    impl QueryProvider for StopQuery {
        async fn query_params(&self, _retry: &RetryInfo) -> Result<QueryParams, SocketError> {
            Err(SocketError::stop_retry("nope"))
        }
    }

    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .query(StopQuery)
        .build();
    let recorder = Recorder::attach(&socket);

    wait_status(&socket, Status::Disconnected).await;

    let events = recorder.events();
    assert_eq!(events[0], Event::Status(Status::Disconnected));
    assert_eq!(
        events[1],
        Event::Disconnect(Some(DisconnectCause::StopRetry("nope".to_string())))
    );
    assert_eq!(events.len(), 2);

    // Nothing reached the connector and nothing else is scheduled
    assert!(server.try_next_attempt().is_none());
    sleep(Duration::from_secs(60)).await;
    assert_eq!(recorder.events().len(), 2);
    assert!(server.try_next_attempt().is_none());
}

#[tokio::test(start_paused = true)]
async fn fatal_close_code_is_terminal() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .close_codes([4000])
        .build();
    let recorder = Recorder::attach(&socket);

    let peer = server.next_attempt().await.accept();
    wait_status(&socket, Status::Connected).await;

    peer.close(4000);
    wait_status(&socket, Status::Disconnected).await;

    let events = recorder.events();
    assert_eq!(events[0], Event::Status(Status::Connected));
    assert_eq!(events[1], Event::Open);
    assert!(matches!(&events[2], Event::Close(close) if close.code == 4000));
    assert_eq!(events[3], Event::Status(Status::Disconnected));
    assert!(matches!(
        &events[4],
        Event::Disconnect(Some(DisconnectCause::Close(close))) if close.code == 4000
    ));

    // No reconnection attempt follows
    sleep(Duration::from_secs(30)).await;
    assert!(server.try_next_attempt().is_none());
}

#[tokio::test(start_paused = true)]
async fn retries_exhausted_reports_last_error() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .max_retries(2)
        .retry_policy(FixedDelay::new(Duration::from_millis(100)))
        .build();
    let recorder = Recorder::attach(&socket);

    let mut attempts = 0u32;
    loop {
        let attempt = server.next_attempt().await;
        attempts += 1;
        attempt.reject(SocketError::Handshake(format!("err-{attempts}")));
        if attempts == 3 {
            break;
        }
    }

    wait_status(&socket, Status::Disconnected).await;
    assert_eq!(attempts, 3, "initial attempt plus two retries");
    assert!(server.try_next_attempt().is_none());

    assert_eq!(recorder.statuses(), vec![Status::Reconnecting, Status::Disconnected]);
    let cause = recorder.events().into_iter().find_map(|event| match event {
        Event::Disconnect(cause) => cause,
        _ => None,
    });
    assert_eq!(
        cause,
        Some(DisconnectCause::Error(SocketError::Handshake("err-3".to_string())))
    );
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/").connector(connector).build();
    let recorder = Recorder::attach(&socket);

    let _peer = server.next_attempt().await.accept();
    wait_status(&socket, Status::Connected).await;

    socket.close();
    socket.close();
    wait_status(&socket, Status::Disconnected).await;
    socket.close();
    sleep(Duration::from_millis(50)).await;

    let closes = recorder
        .events()
        .iter()
        .filter(|event| matches!(event, Event::Close(_)))
        .count();
    let disconnected = recorder
        .statuses()
        .iter()
        .filter(|status| **status == Status::Disconnected)
        .count();
    assert_eq!(closes, 1);
    assert_eq!(disconnected, 1);
}

#[tokio::test(start_paused = true)]
async fn no_timer_survives_close() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .retry_policy(FixedDelay::new(Duration::from_millis(200)))
        .build();

    // Fail once so a retry timer and the lost-connection timer are armed
    server.next_attempt().await.reject(SocketError::Handshake("down".to_string()));
    wait_status(&socket, Status::Reconnecting).await;

    socket.close();
    wait_status(&socket, Status::Disconnected).await;
    let recorder = Recorder::attach(&socket);

    sleep(Duration::from_secs(120)).await;
    assert!(recorder.events().is_empty(), "no timer may fire after close");
    assert!(server.try_next_attempt().is_none());
}

#[tokio::test(start_paused = true)]
async fn unbuffered_sends_while_connecting_are_dropped() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/").connector(connector).build();

    let attempt = server.next_attempt().await;
    socket.send("early").unwrap();
    sleep(Duration::from_millis(5)).await;

    let mut peer = attempt.accept();
    wait_status(&socket, Status::Connected).await;
    socket.send("later").unwrap();

    assert_eq!(peer.recv().await, Some(Message::from("later")));
    assert!(peer.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn reconnect_leaves_disconnected() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/").connector(connector).build();

    let _peer = server.next_attempt().await.accept();
    wait_status(&socket, Status::Connected).await;

    socket.close();
    wait_status(&socket, Status::Disconnected).await;
    let recorder = Recorder::attach(&socket);

    socket.reconnect();
    let _peer2 = server.next_attempt().await.accept();
    wait_status(&socket, Status::Connected).await;

    assert_eq!(recorder.statuses(), vec![Status::Connecting, Status::Connected]);
    assert_eq!(socket.retry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_closed_waits_for_reconnect() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .start_closed(true)
        .build();

    assert_eq!(socket.status(), Status::Disconnected);
    sleep(Duration::from_secs(5)).await;
    assert!(server.try_next_attempt().is_none());

    socket.reconnect();
    let _peer = server.next_attempt().await.accept();
    wait_status(&socket, Status::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn query_params_are_appended_to_the_url() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/feed?v=2")
        .connector(connector)
        .query(StaticQuery::new([("token", "abc def")]))
        .build();

    let attempt = server.next_attempt().await;
    assert_eq!(attempt.url, "ws://x/feed?v=2&token=abc+def");
    drop(socket);
}

#[tokio::test(start_paused = true)]
async fn url_provider_overrides_composition() {
    struct Versioned;

    #[async_trait]
    impl UrlProvider for Versioned {
        async fn resolve(
            &self,
            configured: &str,
            _params: &[(String, String)],
            retry: &RetryInfo,
        ) -> Result<String, SocketError> {
            Ok(format!("{configured}?attempt={}", retry.retry_count))
        }
    }

    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/feed")
        .connector(connector)
        .url_provider(Versioned)
        .retry_policy(FixedDelay::new(Duration::from_millis(10)))
        .build();

    let attempt = server.next_attempt().await;
    assert_eq!(attempt.url, "ws://x/feed?attempt=0");
    attempt.reject(SocketError::Handshake("down".to_string()));

    let attempt = server.next_attempt().await;
    assert_eq!(attempt.url, "ws://x/feed?attempt=1");
    drop(socket);
}

#[tokio::test(start_paused = true)]
async fn offered_protocols_reach_the_connector() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .protocol("graphql-ws")
        .protocol("graphql-transport-ws")
        .build();

    let attempt = server.next_attempt().await;
    assert_eq!(
        attempt.protocols,
        vec!["graphql-ws".to_string(), "graphql-transport-ws".to_string()]
    );
    drop(socket);
}

#[tokio::test(start_paused = true)]
async fn params_timeout_fails_the_attempt() {
    struct NeverResolves;

    #[async_trait]
    impl QueryProvider for NeverResolves {
        async fn query_params(&self, _retry: &RetryInfo) -> Result<QueryParams, SocketError> {
            std::future::pending().await
        }
    }

    let start = Instant::now();
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .query(NeverResolves)
        .params_timeout(Duration::from_millis(50))
        .max_retries(0)
        .build();
    let recorder = Recorder::attach(&socket);

    wait_status(&socket, Status::Disconnected).await;
    assert_eq!(elapsed_ms(start), 50);
    assert!(server.try_next_attempt().is_none());

    let cause = recorder.events().into_iter().find_map(|event| match event {
        Event::Disconnect(cause) => cause,
        _ => None,
    });
    assert_eq!(cause, Some(DisconnectCause::Error(SocketError::ParamsTimeout)));
}

#[tokio::test(start_paused = true)]
async fn connection_resolver_can_reject_an_open_transport() {
    use resocket::{ConnectionInfo, ConnectionResolver};

    struct AlwaysReject;

    #[async_trait]
    impl ConnectionResolver for AlwaysReject {
        async fn resolve(&self, _info: &ConnectionInfo) -> Result<(), SocketError> {
            Err(SocketError::Handshake("not welcome".to_string()))
        }
    }

    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .connection_resolver(AlwaysReject)
        .max_retries(0)
        .build();

    let peer = server.next_attempt().await.accept();
    wait_status(&socket, Status::Disconnected).await;
    assert!(peer.client_closed(), "rejected transport must be closed");
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_drives_retry() {
    let start = Instant::now();
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/")
        .connector(connector)
        .connection_timeout(Duration::from_millis(100))
        .retry_policy(FixedDelay::new(Duration::from_millis(400)))
        .build();

    // Swallow the attempt without answering: the host is unresponsive
    let first = server.next_attempt().await;
    drop(first);

    wait_status(&socket, Status::Reconnecting).await;
    assert_eq!(elapsed_ms(start), 100);

    let second = server.next_attempt().await;
    assert_eq!(elapsed_ms(start), 500);
    let _peer = second.accept();
    wait_status(&socket, Status::Connected).await;
    assert_eq!(socket.retry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_error_precedes_the_close() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/").connector(connector).build();
    let recorder = Recorder::attach(&socket);

    let peer = server.next_attempt().await.accept();
    wait_status(&socket, Status::Connected).await;

    // The standard transport surfaces an error and then a close
    peer.error("boom");
    peer.close(1006);
    wait_status(&socket, Status::Reconnecting).await;

    let events = recorder.events();
    assert_eq!(
        events[2],
        Event::Error(SocketError::Transport("boom".to_string()))
    );
    assert!(matches!(&events[3], Event::Close(close) if close.code == 1006));
    assert_eq!(events[4], Event::Status(Status::Reconnecting));

    // A non-terminal error drives the retry path
    let _attempt = server.next_attempt().await;
}

#[tokio::test(start_paused = true)]
async fn readable_view_tracks_the_connection() {
    let (connector, mut server) = fake_link();
    let socket = Socket::builder("ws://x/feed")
        .connector(connector)
        .query(StaticQuery::new([("t", "1")]))
        .build();

    assert_eq!(socket.url(), "ws://x/feed");
    assert!(socket.last_message_sent().is_none());
    // No transport yet, the state derives from the status
    assert_eq!(socket.ready_state(), resocket::ReadyState::Connecting);

    let peer = server.next_attempt().await.accept();
    wait_status(&socket, Status::Connected).await;
    assert_eq!(socket.url(), "ws://x/feed?t=1");
    // Proxied from the held transport
    assert_eq!(socket.ready_state(), resocket::ReadyState::Open);

    socket.send("x").unwrap();
    sleep(Duration::from_millis(1)).await;
    assert!(socket.last_message_sent().is_some());

    peer.close(1006);
    wait_status(&socket, Status::Reconnecting).await;
    assert_eq!(socket.ready_state(), resocket::ReadyState::Connecting);

    socket.close();
    wait_status(&socket, Status::Disconnected).await;
    assert_eq!(socket.ready_state(), resocket::ReadyState::Closed);
}
