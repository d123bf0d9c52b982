//! Staging Module Tests
//!
//! ## Test Scopes
//! - **Lifecycle**: Segment creation, consume-on-read and release on last close.
//! - **Capacity**: `ResourceUnavailable` once every segment is in use.
//! - **Layouts**: Decoding of the graph, start-vertex and traversal word layouts.

#[cfg(test)]
mod tests {
    use crate::error::ClusterError;
    use crate::protocol::types::{SessionId, TRAVERSAL_SENTINEL};
    use crate::staging::area::StagingArea;
    use crate::staging::payload;
    use crate::storage::graph::AdjacencyMatrix;

    fn session(raw: u64) -> SessionId {
        SessionId::new(raw).unwrap()
    }

    // ============================================================
    // TEST 1: Segment lifecycle
    // ============================================================

    #[test]
    fn test_payload_is_consumed_exactly_once() {
        let area = StagingArea::new(4);
        let client = area.open(session(3)).unwrap();
        let matrix = AdjacencyMatrix::undirected(3, &[(0, 1), (1, 2)]).unwrap();

        let words = client.write_graph(&matrix).unwrap();
        assert_eq!(words, 10);

        let worker = area.open(session(3)).unwrap();
        assert_eq!(worker.read_graph().unwrap(), matrix);

        // Second read finds nothing
        let again = worker.read();
        assert!(matches!(again, Err(ClusterError::ProtocolViolation(_))));
    }

    #[test]
    fn test_segment_released_after_last_close_of_empty_segment() {
        let area = StagingArea::new(4);
        let client = area.open(session(5)).unwrap();
        client.write_start_vertex(2).unwrap();

        let worker = area.open(session(5)).unwrap();
        assert_eq!(worker.read_start_vertex().unwrap(), 2);
        worker.write_traversal(&[2, 0, 1]).unwrap();
        worker.close();

        // Output is still waiting for the client
        assert!(area.contains(session(5)));

        assert_eq!(client.read_traversal().unwrap(), vec![2, 0, 1]);
        client.close();

        assert!(!area.contains(session(5)));
        assert_eq!(area.live_segments(), 0);
    }

    #[test]
    fn test_unconsumed_segment_outlives_its_writer() {
        let area = StagingArea::new(4);
        {
            let client = area.open(session(6)).unwrap();
            client.write(vec![1, 0]).unwrap();
        }
        assert!(area.contains(session(6)));

        let worker = area.open(session(6)).unwrap();
        assert_eq!(worker.read().unwrap(), vec![1, 0]);
        drop(worker);
        assert!(!area.contains(session(6)));
    }

    #[test]
    fn test_abandon_then_close_releases_segment() {
        let area = StagingArea::new(4);
        let client = area.open(session(9)).unwrap();
        client.write(vec![4, 4, 4]).unwrap();
        client.abandon();
        client.close();
        assert_eq!(area.live_segments(), 0);
    }

    #[test]
    fn test_late_output_of_abandoned_request_is_refused() {
        // ARRANGE: the worker has taken the input, then the client gives up
        let area = StagingArea::new(4);
        let client = area.open_for(session(10), 1).unwrap();
        client.write_start_vertex(0).unwrap();
        let worker = area.open_for(session(10), 1).unwrap();
        assert_eq!(worker.read_start_vertex().unwrap(), 0);
        client.abandon();
        client.close();

        // ACT
        let late = worker.write_traversal(&[0, 1, 2]);
        worker.close();

        // ASSERT
        assert!(matches!(late, Err(ClusterError::ProtocolViolation(_))));
        assert!(!area.contains(session(10)));
        assert_eq!(area.live_segments(), 0);
    }

    // ============================================================
    // TEST 2: Request tagging
    // ============================================================

    #[test]
    fn test_payload_is_only_read_by_its_own_request() {
        let area = StagingArea::new(4);
        let client = area.open_for(session(12), 2).unwrap();
        client.write(vec![7, 7]).unwrap();

        // A redelivered earlier request finds nothing and consumes nothing
        let stale = area.open_for(session(12), 1).unwrap();
        assert!(matches!(stale.read(), Err(ClusterError::ProtocolViolation(_))));
        assert!(matches!(stale.write(vec![9]), Err(ClusterError::ProtocolViolation(_))));
        stale.close();

        let worker = area.open_for(session(12), 2).unwrap();
        assert_eq!(worker.read().unwrap(), vec![7, 7]);
    }

    #[test]
    fn test_new_request_reopens_abandoned_segment() {
        let area = StagingArea::new(4);
        let first = area.open_for(session(13), 1).unwrap();
        first.write(vec![1]).unwrap();
        let lingering_worker = area.open_for(session(13), 1).unwrap();
        first.abandon();
        first.close();
        assert!(area.contains(session(13)));

        let second = area.open_for(session(13), 2).unwrap();
        second.write(vec![2]).unwrap();

        // The old worker can no longer overwrite the newer payload
        assert!(lingering_worker.write(vec![99]).is_err());
        assert_eq!(second.read().unwrap(), vec![2]);
    }

    #[test]
    fn test_sessions_get_distinct_segments() {
        let area = StagingArea::new(4);
        let a = area.open(session(1)).unwrap();
        let b = area.open(session(2)).unwrap();
        a.write(vec![11]).unwrap();
        b.write(vec![22]).unwrap();

        assert_eq!(a.read().unwrap(), vec![11]);
        assert_eq!(b.read().unwrap(), vec![22]);
        assert_eq!(area.live_segments(), 2);
    }

    // ============================================================
    // TEST 3: Capacity
    // ============================================================

    #[test]
    fn test_open_fails_when_capacity_exhausted() {
        let area = StagingArea::new(2);
        let _a = area.open(session(1)).unwrap();
        let _b = area.open(session(2)).unwrap();

        let result = area.open(session(3));
        assert!(matches!(
            result,
            Err(ClusterError::ResourceUnavailable { session: 3, .. })
        ));

        // Attaching to an existing segment needs no new slot
        assert!(area.open(session(1)).is_ok());
    }

    // ============================================================
    // TEST 4: Word layouts
    // ============================================================

    #[test]
    fn test_graph_layout_is_count_then_row_major_matrix() {
        let matrix = AdjacencyMatrix::from_rows(vec![vec![0, 1], vec![0, 0]]).unwrap();
        assert_eq!(payload::encode_graph(&matrix), vec![2, 0, 1, 0, 0]);

        assert!(payload::decode_graph(&[]).is_err());
        assert!(payload::decode_graph(&[-1]).is_err());
        assert!(payload::decode_graph(&[2, 0, 1]).is_err());
    }

    #[test]
    fn test_traversal_layout_ends_with_sentinel() {
        let words = payload::encode_traversal(&[0, 2, 4]);
        assert_eq!(words, vec![0, 2, 4, TRAVERSAL_SENTINEL]);
        assert_eq!(payload::decode_traversal(&words).unwrap(), vec![0, 2, 4]);

        assert!(payload::decode_traversal(&[0, 1]).is_err());
        assert_eq!(payload::decode_traversal(&[TRAVERSAL_SENTINEL]).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_start_vertex_layout() {
        assert_eq!(payload::decode_start_vertex(&[3]).unwrap(), 3);
        assert!(payload::decode_start_vertex(&[-2]).is_err());
        assert!(payload::decode_start_vertex(&[1, 2]).is_err());
    }
}
