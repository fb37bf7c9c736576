use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::bson::{Document, Timestamp};

/// Struct modeling a cluster time reported by the server.
///
/// Two cluster times are compared by their embedded timestamp only; the signature is carried
/// along untouched so that it can be gossiped back to the server.
///
/// See [the MongoDB documentation](https://www.mongodb.com/docs/manual/core/read-isolation-consistency-recency/)
/// for more information.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTime {
    cluster_time: Timestamp,

    signature: Document,
}

impl ClusterTime {
    /// Creates a cluster time from its timestamp and signature.
    pub fn new(cluster_time: Timestamp, signature: Document) -> Self {
        Self {
            cluster_time,
            signature,
        }
    }

    /// The embedded logical time.
    pub fn timestamp(&self) -> Timestamp {
        self.cluster_time
    }

    /// The signature provided by the server.
    pub fn signature(&self) -> &Document {
        &self.signature
    }
}

impl PartialEq for ClusterTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ClusterTime {}

impl Ord for ClusterTime {
    fn cmp(&self, other: &ClusterTime) -> Ordering {
        self.logical_time().cmp(&other.logical_time())
    }
}

impl PartialOrd for ClusterTime {
    fn partial_cmp(&self, other: &ClusterTime) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A value with a total order given by a `(time, increment)` pair.
pub(crate) trait LogicalTime: Clone {
    fn logical_time(&self) -> (u32, u32);
}

impl LogicalTime for Timestamp {
    fn logical_time(&self) -> (u32, u32) {
        (self.time, self.increment)
    }
}

impl LogicalTime for ClusterTime {
    fn logical_time(&self) -> (u32, u32) {
        self.cluster_time.logical_time()
    }
}

/// Holds the highest logical time observed so far. The stored value never moves backwards.
#[derive(Clone, Debug)]
pub(crate) struct TimeTracker<T> {
    value: Option<T>,
}

impl<T> Default for TimeTracker<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: LogicalTime> TimeTracker<T> {
    /// Stores `candidate` if nothing is stored yet or if it is strictly newer than the stored
    /// value. Returns whether the stored value changed.
    pub(crate) fn advance(&mut self, candidate: &T) -> bool {
        let newer = match self.value {
            Some(ref current) => candidate.logical_time() > current.logical_time(),
            None => true,
        };
        if newer {
            self.value = Some(candidate.clone());
        }
        newer
    }

    pub(crate) fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

/// Returns whichever of the two times is newer, or the one that is set.
pub(crate) fn max_time<'a, T: LogicalTime>(a: Option<&'a T>, b: Option<&'a T>) -> Option<&'a T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.logical_time() > a.logical_time() {
            b
        } else {
            a
        }),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod test {
    use crate::bson::{doc, Timestamp};

    use super::*;

    fn ts(time: u32, increment: u32) -> Timestamp {
        Timestamp { time, increment }
    }

    fn ct(time: u32, increment: u32) -> ClusterTime {
        ClusterTime::new(ts(time, increment), doc! { "keyId": time as i64 })
    }

    #[test]
    fn advance_keeps_maximum() {
        let mut tracker = TimeTracker::default();
        assert!(tracker.value().is_none());

        let times = [ts(5, 1), ts(3, 9), ts(5, 2), ts(4, 0), ts(5, 2), ts(1, 1)];
        for t in times.iter() {
            tracker.advance(t);
        }
        assert_eq!(tracker.value(), Some(&ts(5, 2)));
    }

    #[test]
    fn advance_with_older_or_equal_is_noop() {
        let mut tracker = TimeTracker::default();
        assert!(tracker.advance(&ts(10, 1)));
        assert!(!tracker.advance(&ts(10, 1)));
        assert!(!tracker.advance(&ts(9, 100)));
        assert!(!tracker.advance(&ts(10, 0)));
        assert_eq!(tracker.value(), Some(&ts(10, 1)));
        assert!(tracker.advance(&ts(10, 2)));
        assert_eq!(tracker.value(), Some(&ts(10, 2)));
    }

    #[test]
    fn cluster_time_ordering_ignores_signature() {
        let a = ClusterTime::new(ts(1, 1), doc! { "hash": 1 });
        let b = ClusterTime::new(ts(1, 1), doc! { "hash": 2 });
        assert_eq!(a, b);
        assert!(ct(2, 0) > ct(1, 5));

        let mut tracker = TimeTracker::default();
        tracker.advance(&a);
        assert!(!tracker.advance(&b));
        assert_eq!(tracker.value().map(|c| c.signature()), Some(&doc! { "hash": 1 }));
    }

    #[test]
    fn max_time_picks_newer_or_set_side() {
        let older = ct(1, 0);
        let newer = ct(2, 0);
        assert_eq!(max_time(Some(&older), Some(&newer)), Some(&newer));
        assert_eq!(max_time(Some(&newer), Some(&older)), Some(&newer));
        assert_eq!(max_time(Some(&older), None), Some(&older));
        assert_eq!(max_time(None, Some(&newer)), Some(&newer));
        assert_eq!(max_time::<ClusterTime>(None, None), None);
    }
}
