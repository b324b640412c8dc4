use hostplane::core::protocol::{GetAclState, Message};
use hostplane::core::queue::RequestQueue;

fn acl_request(id: &str) -> Message {
    Message::GetAclState(GetAclState {
        endpoint_id: id.to_string(),
        issued: 0,
    })
}

fn id_of(message: &Message) -> String {
    match message {
        Message::GetAclState(m) => m.endpoint_id.clone(),
        other => panic!("Expected GETACLSTATE, got {}", other.kind()),
    }
}

#[test]
fn test_queue_is_fifo() {
    let mut queue = RequestQueue::new(16);
    for id in ["a", "b", "c"] {
        queue.push(acl_request(id));
    }
    assert_eq!(queue.len(), 3);
    assert_eq!(id_of(&queue.pop().unwrap()), "a");
    assert_eq!(id_of(&queue.pop().unwrap()), "b");
    assert_eq!(id_of(&queue.pop().unwrap()), "c");
    assert!(queue.pop().is_none());
    assert!(queue.is_empty());
}

#[test]
fn test_queue_overflow_drops_oldest() {
    let mut queue = RequestQueue::new(3);
    for id in ["a", "b", "c", "d"] {
        queue.push(acl_request(id));
    }
    assert_eq!(queue.len(), 3);
    assert_eq!(id_of(&queue.pop().unwrap()), "b");
    assert_eq!(id_of(&queue.pop().unwrap()), "c");
    assert_eq!(id_of(&queue.pop().unwrap()), "d");
}

#[test]
fn test_queue_clear() {
    let mut queue = RequestQueue::new(8);
    queue.push(acl_request("a"));
    queue.push(acl_request("b"));
    queue.clear();
    assert!(queue.is_empty());
    assert!(queue.pop().is_none());
}

#[test]
fn test_zero_capacity_still_holds_one() {
    let mut queue = RequestQueue::new(0);
    queue.push(acl_request("a"));
    queue.push(acl_request("b"));
    assert_eq!(queue.len(), 1);
    assert_eq!(id_of(&queue.pop().unwrap()), "b");
}
