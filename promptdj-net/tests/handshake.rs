mod common;

use std::sync::Arc;
use std::time::Duration;

use promptdj_net::protocol::{ClientMessage, Inbound, ServerMessage, SessionId};
use promptdj_net::{ConnectionNotice, ConnectionState, Connector, SessionConnection, TcpConnector};

#[test]
fn test_setup_frame_names_model() {
    let service = common::FakeService::bind().unwrap();
    let connector = TcpConnector::new(service.addr());
    let (tx, _rx) = crossbeam_channel::unbounded();

    let _session = connector
        .connect(SessionId::new(7), "models/lyria-realtime-exp", tx)
        .unwrap();

    let mut conn = service.accept().unwrap();
    match conn.recv().unwrap() {
        ClientMessage::Setup { model } => assert_eq!(model, "models/lyria-realtime-exp"),
        other => panic!("Expected Setup, got {:?}", other),
    }
}

#[test]
fn test_inbound_is_tagged_with_session() {
    let service = common::FakeService::bind().unwrap();
    let connector = TcpConnector::new(service.addr());
    let (tx, rx) = crossbeam_channel::unbounded();

    let _session = connector.connect(SessionId::new(3), "m", tx).unwrap();
    let mut conn = service.accept().unwrap();
    conn.recv().unwrap();
    conn.send(&ServerMessage::SetupComplete {}).unwrap();

    let event = common::next_event(&rx, Duration::from_secs(2));
    assert_eq!(event.session, SessionId::new(3));
    assert_eq!(event.inbound, Inbound::Message(ServerMessage::SetupComplete {}));
}

#[test]
fn test_session_connection_reaches_connected() {
    let service = common::FakeService::bind().unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut connection =
        SessionConnection::new(Arc::new(TcpConnector::new(service.addr())), "m", tx);

    connection.connect().unwrap();
    let mut conn = service.accept().unwrap();
    common::drive_connect(&mut connection, Duration::from_secs(2)).unwrap();
    assert!(connection.has_session());
    assert_eq!(connection.state(), ConnectionState::Connecting);

    conn.recv().unwrap();
    conn.send(&ServerMessage::SetupComplete {}).unwrap();
    let event = common::next_event(&rx, Duration::from_secs(2));
    assert_eq!(connection.handle_event(event), Some(ConnectionNotice::Connected));
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[test]
fn test_refused_connect_reports_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let service = common::FakeService::bind().unwrap();
        service.addr()
    };
    let (tx, _rx) = crossbeam_channel::unbounded();
    let connector = TcpConnector::new(addr).with_timeout(Duration::from_millis(500));
    let mut connection = SessionConnection::new(Arc::new(connector), "m", tx);

    connection.connect().unwrap();
    let result = common::drive_connect(&mut connection, Duration::from_secs(3));
    assert!(result.is_err());
    assert_eq!(connection.state(), ConnectionState::Errored);
}
