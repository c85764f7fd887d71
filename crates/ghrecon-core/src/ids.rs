//! The disjoint synthetic event-id range.
//!
//! Reconciliation never mutates prior rows; it appends snapshot bundles
//! keyed by event ids offset into a range no real GitHub event id can
//! reach. Any reader can recognize a synthetic row by `id > 2^48`.

/// Offset added to a real event id to mint its synthetic counterpart.
///
/// 2^48 = 281474976710656. Real GitHub event ids stay far below this
/// value, so the synthetic range is disjoint from the real one.
pub const SYNTHETIC_EVENT_OFFSET: i64 = 281_474_976_710_656;

/// Mints the synthetic event id for a real source event id.
#[must_use]
pub const fn synthetic_event_id(real_event_id: i64) -> i64 {
    SYNTHETIC_EVENT_OFFSET + real_event_id
}

/// Returns true when an event id lies in the synthetic range.
#[must_use]
pub const fn is_synthetic(event_id: i64) -> bool {
    event_id > SYNTHETIC_EVENT_OFFSET
}
