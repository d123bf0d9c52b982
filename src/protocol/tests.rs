//! Protocol Module Tests
//!
//! ## Test Scopes
//! - **Identifiers**: Session validation against reserved channels and the affinity rule.
//! - **Codec**: Fixed frame size, reply addressing, rejection of malformed frames.
//! - **Bus**: Blocking receive, timeouts, non-destructive filtering and closing.

#[cfg(test)]
mod tests {
    use crate::error::ClusterError;
    use crate::protocol::bus::MessageBus;
    use crate::protocol::types::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn session(raw: u64) -> SessionId {
        SessionId::new(raw).unwrap()
    }

    fn graph(name: &str) -> ResourceName {
        ResourceName::new(name).unwrap()
    }

    // ============================================================
    // TEST 1: Session ids and channel affinity
    // ============================================================

    #[test]
    fn test_session_id_rejects_zero_and_reserved_channels() {
        assert!(SessionId::new(0).is_err());
        assert!(SessionId::new(LOAD_BALANCER_CHANNEL).is_err());
        assert!(SessionId::new(PRIMARY_SERVER_CHANNEL).is_err());
        assert!(SessionId::new(secondary_channel(1)).is_err());
        assert!(SessionId::new(u64::MAX).is_err());

        assert!(SessionId::new(1).is_ok());
        assert!(SessionId::new(3999).is_ok());
        assert!(SessionId::new(RESERVED_CHANNELS.end).is_ok());
    }

    #[test]
    fn test_secondary_affinity_follows_session_parity() {
        assert_eq!(secondary_for_session(session(1), 2), secondary_channel(0));
        assert_eq!(secondary_for_session(session(3), 2), secondary_channel(0));
        assert_eq!(secondary_for_session(session(2), 2), secondary_channel(1));
        assert_eq!(secondary_for_session(session(40), 2), secondary_channel(1));

        // Deterministic per session
        assert_eq!(
            secondary_for_session(session(17), 3),
            secondary_for_session(session(17), 3)
        );
    }

    #[test]
    fn test_resource_name_bounds() {
        assert!(ResourceName::new("g1.txt").is_ok());
        assert!(ResourceName::new("").is_err());
        assert!(ResourceName::new("a".repeat(RESOURCE_NAME_LEN)).is_ok());
        assert!(ResourceName::new("a".repeat(RESOURCE_NAME_LEN + 1)).is_err());
        assert!(ResourceName::new("../etc/passwd").is_err());
        assert!(ResourceName::new("..").is_err());
    }

    #[test]
    fn test_operation_codes() {
        assert_eq!(Operation::Reply.code(), 0);
        assert_eq!(Operation::Cleanup.code(), 5);
        assert_eq!(Operation::try_from(3).unwrap(), Operation::Traverse);
        assert!(Operation::try_from(9).is_err());
        assert!(Operation::AddGraph.is_write());
        assert!(Operation::ModifyGraph.is_write());
        assert!(!Operation::Traverse.is_write());
    }

    // ============================================================
    // TEST 2: Envelope codec
    // ============================================================

    #[test]
    fn test_every_frame_has_the_same_length() {
        let short = Envelope::request(PRIMARY_SERVER_CHANNEL, session(2), Operation::AddGraph, graph("g"), 5);
        let long = Envelope::request(
            PRIMARY_SERVER_CHANNEL,
            session(2),
            Operation::AddGraph,
            graph(&"x".repeat(RESOURCE_NAME_LEN)),
            5,
        );
        let cleanup = Envelope::cleanup(PRIMARY_SERVER_CHANNEL);

        assert_eq!(short.encode().unwrap().len(), FRAME_LEN);
        assert_eq!(long.encode().unwrap().len(), FRAME_LEN);
        assert_eq!(cleanup.encode().unwrap().len(), FRAME_LEN);
    }

    #[test]
    fn test_reply_is_addressed_to_the_session() {
        let request = Envelope::request(
            secondary_channel(0),
            session(7),
            Operation::Traverse,
            graph("g7"),
            1,
        );
        let reply = request.reply(Status::Ok);

        assert_eq!(reply.channel, 7);
        assert_eq!(reply.operation, Operation::Reply);
        assert!(reply.is_reply_for(session(7)));
        assert!(!reply.is_reply_for(session(9)));
        assert!(!request.is_reply_for(session(7)));

        let decoded = Envelope::decode(&reply.encode().unwrap()).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_failed_status_survives_the_wire() {
        let err = ClusterError::GuardTimeout {
            name: "g".into(),
            waited: Duration::from_millis(10),
        };
        let request = Envelope::request(PRIMARY_SERVER_CHANNEL, session(4), Operation::ModifyGraph, graph("g"), 2);
        let reply = request.reply(Status::from_error(&err));

        let decoded = Envelope::decode(&reply.encode().unwrap()).unwrap();
        let result = decoded.status.into_result();

        match result {
            Err(ClusterError::Remote { code, retryable }) => {
                assert_eq!(code, 5);
                assert!(retryable);
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operation_code_is_a_protocol_violation() {
        let mut frame = Envelope::request(PRIMARY_SERVER_CHANNEL, session(2), Operation::AddGraph, graph("g"), 0)
            .encode()
            .unwrap();
        // operation is the fourth little-endian 8-byte field
        frame[24] = 42;

        let result = Envelope::decode(&frame);
        assert!(matches!(result, Err(ClusterError::ProtocolViolation(_))));
    }

    #[test]
    fn test_truncated_frame_is_a_protocol_violation() {
        let frame = Envelope::cleanup(PRIMARY_SERVER_CHANNEL).encode().unwrap();
        let result = Envelope::decode(&frame[..10]);
        assert!(matches!(result, Err(ClusterError::ProtocolViolation(_))));
    }

    // ============================================================
    // TEST 3: Message bus
    // ============================================================

    #[tokio::test]
    async fn test_receive_returns_envelopes_in_order() {
        let bus = MessageBus::new();
        for s in [2, 3, 4] {
            let env = Envelope::request(PRIMARY_SERVER_CHANNEL, session(s), Operation::AddGraph, graph("g"), 0);
            bus.send(&env).await.unwrap();
        }

        for s in [2, 3, 4] {
            let env = bus
                .receive(PRIMARY_SERVER_CHANNEL, Duration::from_millis(50))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(env.session, session(s));
        }
    }

    #[tokio::test]
    async fn test_receive_times_out_on_an_empty_channel() {
        let bus = MessageBus::new();
        let result = bus
            .receive(PRIMARY_SERVER_CHANNEL, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_blocked_receiver_wakes_on_send() {
        let bus = MessageBus::new();
        let receiver = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.receive(12, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let reply = Envelope::request(PRIMARY_SERVER_CHANNEL, session(12), Operation::AddGraph, graph("g"), 0)
            .reply(Status::Ok);
        bus.send(&reply).await.unwrap();

        let received = receiver.await.unwrap().unwrap().unwrap();
        assert!(received.is_reply_for(session(12)));
    }

    #[tokio::test]
    async fn test_receive_where_leaves_other_frames_queued() {
        let bus = MessageBus::new();
        let channel = 21;

        // A stray request and a malformed frame land on the session channel first
        let stray = Envelope::request(channel, session(21), Operation::Traverse, graph("g"), 1);
        bus.send(&stray).await.unwrap();
        bus.send_frame(channel, vec![1, 2, 3]).await.unwrap();
        let reply = stray.reply(Status::Ok);
        bus.send(&reply).await.unwrap();

        let taken = bus
            .receive_where(channel, Duration::from_millis(50), |env| {
                env.is_reply_for(session(21))
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(taken, reply);
        assert_eq!(bus.pending(channel).await, 2);

        // The stray request is still first in line
        let next = bus
            .receive(channel, Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, stray);
    }

    #[tokio::test]
    async fn test_closed_bus_fails_senders_and_wakes_receivers() {
        let bus: Arc<MessageBus> = MessageBus::new();
        let receiver = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.receive(PRIMARY_SERVER_CHANNEL, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.close();

        let result = receiver.await.unwrap();
        assert!(matches!(result, Err(ClusterError::Channel { .. })));

        let send = bus.send(&Envelope::cleanup(PRIMARY_SERVER_CHANNEL)).await;
        assert!(matches!(send, Err(ClusterError::Channel { .. })));
    }
}
