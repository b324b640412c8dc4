use hostplane::core::resync::ResyncContext;

#[test]
fn test_fresh_context_has_zeroed_counters() {
    let ctx = ResyncContext::new();
    assert_eq!(ctx.recd(), 0);
    assert_eq!(ctx.expected(), None);
    assert!(!ctx.is_complete());
}

#[test]
fn test_tokens_are_unique() {
    let a = ResyncContext::new();
    let b = ResyncContext::new();
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_token_matching() {
    let ctx = ResyncContext::new();
    let own = ctx.id().to_string();
    assert!(ctx.matches(Some(&own)));
    assert!(!ctx.matches(Some("some-stale-token")));
    assert!(!ctx.matches(None));
}

#[test]
fn test_unknown_expected_never_completes() {
    let mut ctx = ResyncContext::new();
    for _ in 0..100 {
        ctx.record_created();
    }
    // Until the reply lands, the promised count is unknown.
    assert!(!ctx.is_complete());
}

#[test]
fn test_expected_zero_means_zero() {
    let mut ctx = ResyncContext::new();
    ctx.set_expected(0);
    assert!(ctx.is_complete());
}

#[test]
fn test_completion_at_expected_count() {
    let mut ctx = ResyncContext::new();
    ctx.set_expected(2);
    ctx.record_created();
    assert!(!ctx.is_complete());
    ctx.record_created();
    assert!(ctx.is_complete());
}

#[test]
fn test_overshoot_still_completes() {
    // An upstream sending more creates than it promised must not leave the
    // resync stuck.
    let mut ctx = ResyncContext::new();
    ctx.set_expected(1);
    ctx.record_created();
    ctx.record_created();
    assert!(ctx.is_complete());
}
