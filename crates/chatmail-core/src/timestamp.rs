use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Wall-clock instant as the core server puts it on the wire: an integer
/// count of seconds since the Unix epoch. Round-trips losslessly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.0, 0).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{dt}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        // Reject values chrono cannot represent instead of silently clamping.
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {secs}")))?;
        Ok(Self(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_unix_seconds() {
        for secs in [0i64, 1, 1_700_000_000, -1] {
            let json = secs.to_string();
            let ts: Timestamp = serde_json::from_str(&json).unwrap();
            assert_eq!(serde_json::to_string(&ts).unwrap(), json);
        }
    }

    #[test]
    fn converts_to_datetime() {
        let ts = Timestamp(1_700_000_000);
        let dt = ts.to_datetime().unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(Timestamp::from(dt), ts);
    }
}
