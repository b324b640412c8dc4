use hostplane::core::protocol::{GetAclState, Message};
use hostplane::core::queue::RequestQueue;
use proptest::prelude::*;

fn acl_request(id: &str) -> Message {
    Message::GetAclState(GetAclState {
        endpoint_id: id.to_string(),
        issued: 0,
    })
}

fn drain(queue: &mut RequestQueue) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(message) = queue.pop() {
        match message {
            Message::GetAclState(m) => out.push(m.endpoint_id),
            other => panic!("Unexpected {}", other.kind()),
        }
    }
    out
}

proptest! {
    /// Messages leave the queue in the order they were pushed; under
    /// overflow the queue keeps the newest `capacity` entries, still in
    /// push order.
    #[test]
    fn drain_order_matches_push_order(
        ids in prop::collection::vec("[a-z]{1,8}", 0..64),
        capacity in 1usize..16,
    ) {
        let mut queue = RequestQueue::new(capacity);
        for id in &ids {
            queue.push(acl_request(id));
        }

        let kept = ids.len().min(capacity);
        let expected: Vec<String> = ids[ids.len() - kept..].to_vec();
        prop_assert_eq!(drain(&mut queue), expected);
    }

    #[test]
    fn clear_always_empties(
        ids in prop::collection::vec("[a-z]{1,8}", 0..32),
    ) {
        let mut queue = RequestQueue::new(8);
        for id in &ids {
            queue.push(acl_request(id));
        }
        queue.clear();
        prop_assert!(queue.is_empty());
    }
}
