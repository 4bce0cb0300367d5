//! Counters, Lists and player tracking values.
//!
//! Counters and Lists come from the beta SDK surface, player tracking from
//! the alpha one. Both need their feature gate enabled on the sidecar; when
//! it is off the sidecar answers `Unimplemented`.

use agones_proto::beta;

/// A named counter on the GameServer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    pub name: String,
    pub count: i64,
    pub capacity: i64,
}

/// A named list of string values on the GameServer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct List {
    pub name: String,
    pub capacity: i64,
    pub values: Vec<String>,
}

/// One counter mutation.
///
/// `count` / `capacity` set absolute values, `count_diff` adds to the count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterUpdate {
    pub name: String,
    pub count: Option<i64>,
    pub capacity: Option<i64>,
    pub count_diff: i64,
}

impl CounterUpdate {
    pub fn increment(name: impl Into<String>, amount: i64) -> Self {
        Self {
            name: name.into(),
            count_diff: amount.saturating_abs(),
            ..Default::default()
        }
    }

    pub fn decrement(name: impl Into<String>, amount: i64) -> Self {
        Self {
            name: name.into(),
            count_diff: -amount.saturating_abs(),
            ..Default::default()
        }
    }

    pub fn set_count(name: impl Into<String>, count: i64) -> Self {
        Self {
            name: name.into(),
            count: Some(count),
            ..Default::default()
        }
    }

    pub fn set_capacity(name: impl Into<String>, capacity: i64) -> Self {
        Self {
            name: name.into(),
            capacity: Some(capacity),
            ..Default::default()
        }
    }
}

impl From<beta::Counter> for Counter {
    fn from(c: beta::Counter) -> Self {
        Self {
            name: c.name,
            count: c.count,
            capacity: c.capacity,
        }
    }
}

impl From<beta::List> for List {
    fn from(l: beta::List) -> Self {
        Self {
            name: l.name,
            capacity: l.capacity,
            values: l.values,
        }
    }
}

impl From<List> for beta::List {
    fn from(l: List) -> Self {
        Self {
            name: l.name,
            capacity: l.capacity,
            values: l.values,
        }
    }
}

impl From<CounterUpdate> for beta::UpdateCounterRequest {
    fn from(update: CounterUpdate) -> Self {
        Self {
            counter_update_request: Some(beta::CounterUpdateRequest {
                name: update.name,
                count: update.count,
                capacity: update.capacity,
                count_diff: update.count_diff,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_update_signs() {
        assert_eq!(CounterUpdate::increment("rooms", 3).count_diff, 3);
        assert_eq!(CounterUpdate::increment("rooms", -3).count_diff, 3);
        assert_eq!(CounterUpdate::decrement("rooms", 3).count_diff, -3);
        assert_eq!(CounterUpdate::decrement("rooms", -3).count_diff, -3);

        let set = CounterUpdate::set_capacity("rooms", 20);
        assert_eq!(set.capacity, Some(20));
        assert_eq!(set.count, None);
        assert_eq!(set.count_diff, 0);
    }

    #[test]
    fn test_counter_update_to_proto() {
        let request = beta::UpdateCounterRequest::from(CounterUpdate::set_count("rooms", 4));
        let inner = request.counter_update_request.unwrap();
        assert_eq!(inner.name, "rooms");
        assert_eq!(inner.count, Some(4));
        assert_eq!(inner.capacity, None);
    }
}
