//! Timestamped message types shared by every player implementation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Nanoseconds per second, used for [`Timestamp`] normalization.
const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A point on the playback timeline.
///
/// Seconds plus nanoseconds, normalized so `nanos < 1_000_000_000`. Ordering
/// is total and lexicographic over `(secs, nanos)`, which makes timestamps
/// directly usable as ordering keys for message resequencing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// Creates a timestamp from seconds and nanoseconds, normalizing overflow.
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self {
            secs: secs + i64::from(nanos / NANOS_PER_SEC),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// Creates a timestamp from whole seconds.
    pub fn from_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// Creates a timestamp from a total nanosecond count.
    pub fn from_nanos(nanos: i128) -> Self {
        let secs = (nanos.div_euclid(i128::from(NANOS_PER_SEC))) as i64;
        let sub = nanos.rem_euclid(i128::from(NANOS_PER_SEC)) as u32;
        Self { secs, nanos: sub }
    }

    /// Returns the whole-second component.
    pub fn secs(self) -> i64 {
        self.secs
    }

    /// Returns the sub-second nanosecond component.
    pub fn subsec_nanos(self) -> u32 {
        self.nanos
    }

    /// Returns the total nanosecond count since the timeline origin.
    pub fn as_nanos(self) -> i128 {
        i128::from(self.secs) * i128::from(NANOS_PER_SEC) + i128::from(self.nanos)
    }

    /// Advances the timestamp by a duration.
    pub fn add_duration(self, duration: Duration) -> Self {
        Self::from_nanos(self.as_nanos() + duration.as_nanos() as i128)
    }

    /// Moves the timestamp back by a duration, saturating at the origin side
    /// of the `i64` second range rather than wrapping.
    pub fn sub_duration(self, duration: Duration) -> Self {
        Self::from_nanos(self.as_nanos() - duration.as_nanos() as i128)
    }

    /// Returns the duration from `earlier` to `self`, or zero if `earlier`
    /// is not actually earlier.
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        let delta = self.as_nanos() - earlier.as_nanos();
        if delta <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(delta as u64)
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

/// A topic advertised by a data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Fully qualified topic name, e.g. `/sensors/imu`.
    pub name: String,
    /// Datatype identifier as recorded by the source.
    pub datatype: String,
}

impl TopicInfo {
    /// Creates topic info from name and datatype.
    pub fn new(name: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: datatype.into(),
        }
    }
}

/// A single message delivered by a player.
///
/// `receive_time` is the arrival/log-order key assigned by the source.
/// `header_time` is the embedded per-message timestamp, extracted from a
/// `header.stamp` object (`{"sec": .., "nsec": ..}`) in the payload when
/// present. The order-correction decorator resequences on `header_time`;
/// everything else treats `receive_time` as authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMessage {
    /// Topic the message was recorded on.
    pub topic: String,
    /// Arrival/log-order timestamp.
    pub receive_time: Timestamp,
    /// Decoded message body.
    pub payload: serde_json::Value,
    /// Embedded per-message timestamp, if the payload carries one.
    pub header_time: Option<Timestamp>,
}

impl PlayerMessage {
    /// Creates a message, extracting the embedded header timestamp from the
    /// payload when one is present.
    pub fn new(topic: impl Into<String>, receive_time: Timestamp, payload: serde_json::Value) -> Self {
        let header_time = extract_header_time(&payload);
        Self {
            topic: topic.into(),
            receive_time,
            payload,
            header_time,
        }
    }

    /// Creates a message with an explicit header timestamp, bypassing
    /// payload extraction.
    pub fn with_header_time(
        topic: impl Into<String>,
        receive_time: Timestamp,
        header_time: Timestamp,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            receive_time,
            payload,
            header_time: Some(header_time),
        }
    }

    /// Returns the key this message sorts on when resequencing by embedded
    /// timestamp. Messages without one fall back to their receive time.
    pub fn ordering_key(&self) -> Timestamp {
        self.header_time.unwrap_or(self.receive_time)
    }
}

/// Pulls `header.stamp.{sec,nsec}` out of a payload, if present and well formed.
fn extract_header_time(payload: &serde_json::Value) -> Option<Timestamp> {
    let stamp = payload.get("header")?.get("stamp")?;
    let secs = stamp.get("sec")?.as_i64()?;
    let nanos = stamp.get("nsec")?.as_u64()?;
    Some(Timestamp::new(secs, u32::try_from(nanos).ok()?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_timestamp_normalizes_nanos() {
        let ts = Timestamp::new(5, 1_500_000_000);
        assert_eq!(ts.secs(), 6);
        assert_eq!(ts.subsec_nanos(), 500_000_000);
    }

    #[test]
    fn test_timestamp_ordering_is_lexicographic() {
        let a = Timestamp::new(1, 999_999_999);
        let b = Timestamp::new(2, 0);
        let c = Timestamp::new(2, 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_timestamp_duration_round_trip() {
        let ts = Timestamp::new(10, 250_000_000);
        let later = ts.add_duration(Duration::from_millis(1_500));
        assert_eq!(later, Timestamp::new(11, 750_000_000));
        assert_eq!(later.duration_since(ts), Duration::from_millis(1_500));
        assert_eq!(ts.duration_since(later), Duration::ZERO);
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(Timestamp::new(3, 42).to_string(), "3.000000042");
    }

    #[test]
    fn test_header_time_extracted_from_payload() {
        let msg = PlayerMessage::new(
            "/sensors/imu",
            Timestamp::from_secs(100),
            json!({"header": {"stamp": {"sec": 99, "nsec": 500}}, "value": 1.0}),
        );
        assert_eq!(msg.header_time, Some(Timestamp::new(99, 500)));
        assert_eq!(msg.ordering_key(), Timestamp::new(99, 500));
    }

    #[test]
    fn test_missing_header_falls_back_to_receive_time() {
        let msg = PlayerMessage::new(
            "/sensors/imu",
            Timestamp::from_secs(100),
            json!({"value": 1.0}),
        );
        assert_eq!(msg.header_time, None);
        assert_eq!(msg.ordering_key(), Timestamp::from_secs(100));
    }

    #[test]
    fn test_malformed_header_stamp_is_ignored() {
        let msg = PlayerMessage::new(
            "/sensors/imu",
            Timestamp::from_secs(100),
            json!({"header": {"stamp": "yesterday"}}),
        );
        assert_eq!(msg.header_time, None);
    }
}
