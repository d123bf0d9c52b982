//! Client Module Tests
//!
//! ## Test Scopes
//! - **Timeout**: A missing server surfaces `ReplyTimeout` and releases staging.
//! - **Filtering**: Replies to older requests are purged, never taken as the answer.
//! - **Abandonment**: Output written after the client gave up does not leak staging.
//! - **Validation**: Bad names and non-write operations fail before sending.

#[cfg(test)]
mod tests {
    use crate::client::GraphClient;
    use crate::error::ClusterError;
    use crate::protocol::bus::MessageBus;
    use crate::protocol::types::{
        Envelope, LOAD_BALANCER_CHANNEL, Operation, ResourceName, SessionId, Status,
    };
    use crate::staging::area::StagingArea;
    use crate::storage::graph::AdjacencyMatrix;
    use std::time::Duration;

    fn triangle() -> AdjacencyMatrix {
        AdjacencyMatrix::undirected(3, &[(0, 1), (1, 2), (0, 2)]).unwrap()
    }

    #[tokio::test]
    async fn test_reply_timeout_abandons_staged_payload() {
        // ARRANGE: nobody serves the load-balancer channel
        let bus = MessageBus::new();
        let staging = StagingArea::new(4);
        let mut client = GraphClient::new(
            SessionId::new(5).unwrap(),
            bus.clone(),
            staging.clone(),
            Duration::from_millis(50),
        );

        // ACT
        let result = client.add_graph("g", &triangle()).await;

        // ASSERT
        match result {
            Err(err @ ClusterError::ReplyTimeout { session: 5, .. }) => {
                assert!(err.is_retryable())
            }
            other => panic!("expected a reply timeout, got {:?}", other),
        }
        assert_eq!(staging.live_segments(), 0);
        assert_eq!(bus.pending(LOAD_BALANCER_CHANNEL).await, 1);
    }

    #[tokio::test]
    async fn test_stale_replies_are_purged_not_taken() {
        // ARRANGE
        let bus = MessageBus::new();
        let staging = StagingArea::new(4);
        let session = SessionId::new(9).unwrap();

        // A leftover failure reply for the same resource from an older request
        let earlier = Envelope::request(
            LOAD_BALANCER_CHANNEL,
            session,
            Operation::AddGraph,
            ResourceName::new("new").unwrap(),
            0,
        );
        bus.send(&earlier.reply(Status::Failed {
            code: 4,
            retryable: false,
        }))
        .await
        .unwrap();

        let responder = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let request = bus
                    .receive(LOAD_BALANCER_CHANNEL, Duration::from_secs(5))
                    .await
                    .unwrap()
                    .unwrap();
                bus.send(&request.reply(Status::Ok)).await.unwrap();
                request.request_id
            })
        };

        let mut client = GraphClient::new(session, bus.clone(), staging, Duration::from_secs(5));

        // ACT
        client.add_graph("new", &triangle()).await.unwrap();
        let served = responder.await.unwrap();

        // ASSERT
        assert_eq!(served, 1);
        assert_eq!(bus.pending(session.reply_channel()).await, 0);
    }

    #[tokio::test]
    async fn test_late_traversal_output_does_not_leak_staging() {
        // ARRANGE: a secondary that takes the input, then answers too late
        let bus = MessageBus::new();
        let staging = StagingArea::new(4);
        let session = SessionId::new(14).unwrap();

        let slow_worker = {
            let bus = bus.clone();
            let staging = staging.clone();
            tokio::spawn(async move {
                let request = bus
                    .receive(LOAD_BALANCER_CHANNEL, Duration::from_secs(5))
                    .await
                    .unwrap()
                    .unwrap();
                let handle = staging.open_for(request.session, request.request_id).unwrap();
                let start = handle.read_start_vertex().unwrap();
                tokio::time::sleep(Duration::from_millis(150)).await;

                let late = handle.write_traversal(&[start, 1, 2]);
                let status = match &late {
                    Ok(()) => Status::Ok,
                    Err(e) => Status::from_error(e),
                };
                bus.send(&request.reply(status)).await.unwrap();
                handle.close();
                late.is_err()
            })
        };

        let mut client =
            GraphClient::new(session, bus.clone(), staging.clone(), Duration::from_millis(50));

        // ACT
        let result = client.traverse("g", 0).await;
        let refused = slow_worker.await.unwrap();

        // ASSERT
        assert!(matches!(result, Err(ClusterError::ReplyTimeout { session: 14, .. })));
        assert!(refused);
        assert!(!staging.contains(session));
        assert_eq!(staging.live_segments(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_is_surfaced() {
        let bus = MessageBus::new();
        let staging = StagingArea::new(4);
        let responder = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let request = bus
                    .receive(LOAD_BALANCER_CHANNEL, Duration::from_secs(5))
                    .await
                    .unwrap()
                    .unwrap();
                bus.send(&request.reply(Status::Failed {
                    code: 5,
                    retryable: true,
                }))
                .await
                .unwrap();
            })
        };

        let mut client = GraphClient::new(
            SessionId::new(12).unwrap(),
            bus,
            staging.clone(),
            Duration::from_secs(5),
        );
        let result = client.traverse("g", 0).await;
        responder.await.unwrap();

        assert!(matches!(
            result,
            Err(ClusterError::Remote {
                code: 5,
                retryable: true
            })
        ));
        assert_eq!(staging.live_segments(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requests_fail_before_sending() {
        let bus = MessageBus::new();
        let staging = StagingArea::new(4);
        let mut client = GraphClient::new(
            SessionId::new(7).unwrap(),
            bus.clone(),
            staging.clone(),
            Duration::from_secs(1),
        );

        let traverse_as_write = client
            .write_graph("g", &triangle(), Operation::Traverse)
            .await;
        assert!(matches!(
            traverse_as_write,
            Err(ClusterError::ProtocolViolation(_))
        ));

        let bad_name = client.add_graph("../escape", &triangle()).await;
        assert!(matches!(bad_name, Err(ClusterError::ProtocolViolation(_))));

        assert_eq!(bus.pending(LOAD_BALANCER_CHANNEL).await, 0);
        assert_eq!(staging.live_segments(), 0);
    }
}
