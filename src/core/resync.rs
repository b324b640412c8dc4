// src/core/resync.rs

//! Bookkeeping for one in-flight total endpoint resynchronization.
//!
//! The agent holds `Option<ResyncContext>`: present exactly while a resync
//! is in flight. ENDPOINTCREATED messages carrying the active token bump the
//! received counter; the RESYNC reply supplies the expected total. The two
//! can arrive in either order, so "expected" stays unknown (`None`) until
//! the reply lands and zero legitimately means zero.

use uuid::Uuid;

#[derive(Debug)]
pub struct ResyncContext {
    id: String,
    recd: u32,
    expected: Option<u32>,
}

impl ResyncContext {
    /// Allocates a fresh resync token with zeroed counters.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recd: 0,
            expected: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a message-carried token belongs to this resync. Stale or
    /// absent tokens do not advance the counters.
    pub fn matches(&self, token: Option<&str>) -> bool {
        token == Some(self.id.as_str())
    }

    /// Records one ENDPOINTCREATED received under this token.
    pub fn record_created(&mut self) -> u32 {
        self.recd += 1;
        self.recd
    }

    pub fn recd(&self) -> u32 {
        self.recd
    }

    pub fn set_expected(&mut self, count: u32) {
        self.expected = Some(count);
    }

    pub fn expected(&self) -> Option<u32> {
        self.expected
    }

    /// True once the promised count is known and at least that many creates
    /// have been received. `>=` rather than `==`: should an upstream ever
    /// send more creates than it promised, the resync still terminates.
    pub fn is_complete(&self) -> bool {
        self.expected.is_some_and(|expected| self.recd >= expected)
    }
}

impl Default for ResyncContext {
    fn default() -> Self {
        Self::new()
    }
}
