use crate::archive::ArtifactKind;
use crate::error::{CollectorError, Result};
use crate::utils::time::floor_to_period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unix timestamp aligned to a fixed period. Identifies one fetch attempt
/// and the name of the artifact it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSlot(i64);

impl TimeSlot {
    /// Wrap an already aligned timestamp.
    pub fn new(timestamp: i64, period: u64) -> Result<Self> {
        if period == 0 {
            return Err(CollectorError::InvalidArgument(
                "slot period must be at least one second".to_string(),
            ));
        }
        if timestamp.rem_euclid(period as i64) != 0 {
            return Err(CollectorError::InvalidArgument(format!(
                "timestamp {} is not aligned to a {}s period",
                timestamp, period
            )));
        }
        Ok(Self(timestamp))
    }

    /// The slot containing `timestamp`.
    pub fn floor(timestamp: i64, period: u64) -> Self {
        Self(floor_to_period(timestamp, period))
    }

    /// The first boundary strictly after the slot containing `now`.
    pub fn following(now: i64, period: u64) -> Self {
        Self(floor_to_period(now, period) + period.max(1) as i64)
    }

    pub fn timestamp(&self) -> i64 {
        self.0
    }

    /// Whole seconds from `now` until this slot begins, never negative.
    pub fn seconds_from(&self, now: i64) -> u64 {
        (self.0 - now).max(0) as u64
    }

    pub fn artifact_name(&self, kind: ArtifactKind) -> String {
        format!("{}.{}", self.0, kind.extension())
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_misaligned_timestamp() {
        assert!(TimeSlot::new(1_200, 600).is_ok());
        assert!(matches!(
            TimeSlot::new(1_201, 600),
            Err(CollectorError::InvalidArgument(_))
        ));
        assert!(TimeSlot::new(1_200, 0).is_err());
    }

    #[test]
    fn test_following_is_next_boundary() {
        assert_eq!(TimeSlot::following(1_199, 600).timestamp(), 1_200);
        // Exactly on a boundary waits for the next one
        assert_eq!(TimeSlot::following(1_200, 600).timestamp(), 1_800);
        assert_eq!(TimeSlot::following(3_599, 3_600).timestamp(), 3_600);
    }

    #[test]
    fn test_slot_is_aligned() {
        for now in [0, 1, 599, 600, 1_700_000_123] {
            let slot = TimeSlot::following(now, 600);
            assert_eq!(slot.timestamp() % 600, 0);
            assert!(slot.timestamp() > now);
        }
    }

    #[test]
    fn test_seconds_from_never_negative() {
        let slot = TimeSlot::floor(1_800, 600);
        assert_eq!(slot.seconds_from(1_500), 300);
        assert_eq!(slot.seconds_from(2_000), 0);
    }

    #[test]
    fn test_artifact_name() {
        let slot = TimeSlot::floor(1_705_312_800, 600);
        assert_eq!(slot.artifact_name(ArtifactKind::Zip), "1705312800.zip");
        assert_eq!(slot.artifact_name(ArtifactKind::Xml), "1705312800.xml");
        assert_eq!(slot.artifact_name(ArtifactKind::Json), "1705312800.json");
        assert_eq!(slot.to_string(), "1705312800");
    }
}
