mod common;

use std::sync::Arc;
use std::time::Duration;

use promptdj_net::protocol::{FilteredPrompt, Inbound, ServerMessage};
use promptdj_net::{ConnectionNotice, ConnectionState, SessionConnection, TcpConnector};

fn connected(
    service: &common::FakeService,
) -> (
    SessionConnection,
    common::ServiceConn,
    crossbeam_channel::Receiver<promptdj_net::SessionEvent>,
) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut connection =
        SessionConnection::new(Arc::new(TcpConnector::new(service.addr())), "m", tx);
    connection.connect().unwrap();
    let mut conn = service.accept().unwrap();
    common::drive_connect(&mut connection, Duration::from_secs(2)).unwrap();
    conn.recv().unwrap();
    (connection, conn, rx)
}

#[test]
fn test_hang_up_loses_session() {
    let service = common::FakeService::bind().unwrap();
    let (mut connection, conn, rx) = connected(&service);

    conn.hang_up();
    let event = common::next_event(&rx, Duration::from_secs(2));
    assert!(matches!(event.inbound, Inbound::Disconnected(_)));
    assert!(matches!(connection.handle_event(event), Some(ConnectionNotice::Lost(_))));
    assert_eq!(connection.state(), ConnectionState::Errored);
    assert!(!connection.has_session());
}

#[test]
fn test_close_frame_loses_session() {
    let service = common::FakeService::bind().unwrap();
    let (mut connection, mut conn, rx) = connected(&service);

    conn.send(&ServerMessage::Close {}).unwrap();
    let event = common::next_event(&rx, Duration::from_secs(2));
    assert!(matches!(connection.handle_event(event), Some(ConnectionNotice::Lost(_))));
    assert!(!connection.has_session());
}

#[test]
fn test_reconnect_starts_fresh_session() {
    let service = common::FakeService::bind().unwrap();
    let (mut connection, mut conn, rx) = connected(&service);
    let first = connection.current_session().unwrap();

    conn.send(&ServerMessage::FilteredPrompt(FilteredPrompt {
        text: "Thrash".to_string(),
        filtered_reason: None,
    }))
    .unwrap();
    let event = common::next_event(&rx, Duration::from_secs(2));
    connection.handle_event(event);
    assert!(connection.filtered().contains("Thrash"));

    conn.send(&ServerMessage::Error {
        message: "quota exceeded".to_string(),
    })
    .unwrap();
    let event = common::next_event(&rx, Duration::from_secs(2));
    assert_eq!(
        connection.handle_event(event),
        Some(ConnectionNotice::Lost("quota exceeded".to_string()))
    );

    // No automatic retry: nothing happens until connect() is called again.
    assert!(!connection.is_connecting());

    connection.connect().unwrap();
    let _second_conn = service.accept().unwrap();
    common::drive_connect(&mut connection, Duration::from_secs(2)).unwrap();
    let second = connection.current_session().unwrap();
    assert_ne!(first, second);
    assert!(connection.filtered().is_empty());
}
