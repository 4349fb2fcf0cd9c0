use std::time::Duration;

use cip_client::{CipClient, CipConfig, ConnectionState, EncodeError, SendError};
use cip_protocol::encode;
use cip_test_utils::{MockProcessor, RegistrationReply};
use tokio::time::{sleep, timeout};

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn next_frame(mock: &MockProcessor) -> cip_protocol::Frame {
    timeout(Duration::from_secs(5), mock.recv_frame())
        .await
        .expect("frame within 5s")
        .expect("mock alive")
}

async fn drain_handshake(mock: &MockProcessor) {
    loop {
        if next_frame(mock).await.to_bytes() == encode::update_request() {
            return;
        }
    }
}

#[tokio::test]
async fn sends_while_connected_but_unregistered_are_rejected() {
    // A silent mock never completes registration.
    let mock = MockProcessor::start(RegistrationReply::Silent).await.unwrap();
    let config = CipConfig::new("127.0.0.1", 0x03).with_port(mock.local_addr().port());
    let client = CipClient::new(config);
    client.connect(true);

    wait_for("connection", || {
        client.connection_state() == ConnectionState::Connected
    })
    .await;
    // The identity frame is the only thing the client says on its own.
    assert_eq!(next_frame(&mock).await.frame_type, 0x01);

    for result in [
        client.press(1),
        client.release(1),
        client.pulse(1),
        client.set_digital_join(1, true, false),
        client.set_analog(1, 50),
        client.send_serial(1, "x"),
        client.send_update_request(),
    ] {
        assert!(
            matches!(result, Err(SendError::NotReady(ConnectionState::Connected))),
            "{result:?}"
        );
    }

    // Nothing further reaches the wire.
    assert!(
        timeout(Duration::from_millis(500), mock.recv_frame())
            .await
            .is_err()
    );
    client.disconnect().await;
}

#[tokio::test]
async fn registered_sends_reach_the_wire_in_order() {
    let mock = MockProcessor::start(RegistrationReply::Accept).await.unwrap();
    let config = CipConfig::new("127.0.0.1", 0x03).with_port(mock.local_addr().port());
    let client = CipClient::new(config);
    client.connect(true);
    drain_handshake(&mock).await;
    wait_for("registration", || client.registered()).await;

    client.press(7).unwrap();
    client.pulse(9).unwrap();
    client.set_analog(1, 130).unwrap();
    client.send_serial(2, "foo").unwrap();
    client.send_update_request().unwrap();

    let expected = [
        encode::digital_join(7, true, true).unwrap(),
        encode::digital_join(9, true, true).unwrap(),
        encode::digital_join(9, false, true).unwrap(),
        encode::analog_join(1, 130).unwrap(),
        encode::serial_join(2, "foo").unwrap(),
        encode::update_request(),
    ];
    for wire in expected {
        assert_eq!(next_frame(&mock).await.to_bytes(), wire);
    }

    client.disconnect().await;
}

#[tokio::test]
async fn encode_failures_emit_nothing() {
    let mock = MockProcessor::start(RegistrationReply::Accept).await.unwrap();
    let config = CipConfig::new("127.0.0.1", 0x03).with_port(mock.local_addr().port());
    let client = CipClient::new(config);
    client.connect(true);
    drain_handshake(&mock).await;
    wait_for("registration", || client.registered()).await;

    assert!(matches!(
        client.press(0),
        Err(SendError::Encode(EncodeError::InvalidJoinNumber(0)))
    ));
    assert!(matches!(
        client.set_analog(4001, 9),
        Err(SendError::Encode(EncodeError::InvalidJoinNumber(4001)))
    ));
    assert!(matches!(
        client.send_serial(3, ""),
        Err(SendError::Encode(EncodeError::InvalidStringLength(0)))
    ));
    assert!(matches!(
        client.send_serial(3, "na\u{ef}ve"),
        Err(SendError::Encode(EncodeError::NonAsciiText))
    ));

    // The next frame on the wire is the first valid send, nothing else.
    client.press(1).unwrap();
    assert_eq!(
        next_frame(&mock).await.to_bytes(),
        encode::digital_join(1, true, true).unwrap()
    );

    client.disconnect().await;
}
