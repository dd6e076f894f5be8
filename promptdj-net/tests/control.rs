mod common;

use std::time::Duration;

use promptdj_net::protocol::{
    ClientMessage, ControlChanges, PlaybackControl, SessionId, WeightedPrompt,
};
use promptdj_net::{Connector, TcpConnector};

#[test]
fn test_control_frames_arrive_in_order() {
    let service = common::FakeService::bind().unwrap();
    let connector = TcpConnector::new(service.addr());
    let (tx, _rx) = crossbeam_channel::unbounded();
    let mut session = connector.connect(SessionId::new(1), "m", tx).unwrap();
    let mut conn = service.accept().unwrap();
    assert!(matches!(conn.recv().unwrap(), ClientMessage::Setup { .. }));

    let prompts = vec![WeightedPrompt {
        text: "Lush Strings".to_string(),
        weight: 1.5,
    }];
    session.set_weighted_prompts(&prompts).unwrap();
    session.play().unwrap();
    session.send_control_changes(ControlChanges { pitch_bend: 0.25 }).unwrap();
    session.pause().unwrap();
    session.stop().unwrap();

    assert_eq!(
        conn.recv().unwrap(),
        ClientMessage::SetWeightedPrompts {
            weighted_prompts: prompts
        }
    );
    assert_eq!(conn.recv().unwrap(), ClientMessage::PlaybackControl(PlaybackControl::Play));
    assert_eq!(
        conn.recv().unwrap(),
        ClientMessage::ControlChanges(ControlChanges { pitch_bend: 0.25 })
    );
    assert_eq!(conn.recv().unwrap(), ClientMessage::PlaybackControl(PlaybackControl::Pause));
    assert_eq!(conn.recv().unwrap(), ClientMessage::PlaybackControl(PlaybackControl::Stop));
}

#[test]
fn test_send_after_close_is_rejected() {
    let service = common::FakeService::bind().unwrap();
    let connector = TcpConnector::new(service.addr());
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut session = connector.connect(SessionId::new(1), "m", tx).unwrap();
    let _conn = service.accept().unwrap();

    session.close();
    let err = session.play().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);

    // A locally closed session does not report a disconnect.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}
