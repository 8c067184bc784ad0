use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Geography;

/// Key of a `d_case_summary` counter row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SummaryBucketKey {
    pub org_id: String,
    /// `YYYY/MM/DD` in the reporting timezone.
    pub date: String,
    /// `HH:00:00` in the reporting timezone.
    pub hour: String,
    pub group_type_id: String,
    pub country_id: String,
    pub prov_id: String,
    pub dist_id: String,
}

impl SummaryBucketKey {
    pub fn at(
        org_id: impl Into<String>,
        group_type_id: impl Into<String>,
        geography: &Geography,
        at: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        let local = at.with_timezone(&offset);
        Self {
            org_id: org_id.into(),
            date: bucket_date(at, offset),
            hour: local.format("%H:00:00").to_string(),
            group_type_id: group_type_id.into(),
            country_id: geography.country_id.clone(),
            prov_id: geography.prov_id.clone(),
            dist_id: geography.dist_id.clone(),
        }
    }
}

pub fn bucket_date(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%Y/%m/%d").to_string()
}

/// Amounts added to a bucket by one upsert.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDelta {
    pub total: i64,
    pub in_sla: i64,
    pub over_sla: i64,
    pub case_duration: i64,
}

impl SummaryDelta {
    pub fn opened() -> Self {
        Self { total: 1, ..Default::default() }
    }

    pub fn closed_in_sla(duration_secs: i64) -> Self {
        Self { in_sla: 1, case_duration: duration_secs, ..Default::default() }
    }

    pub fn closed_over_sla() -> Self {
        Self { over_sla: 1, ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseSummaryBucket {
    pub org_id: String,
    pub date: String,
    pub hour: String,
    pub group_type_id: String,
    pub country_id: String,
    pub prov_id: String,
    pub dist_id: String,
    pub total: i64,
    pub in_sla: i64,
    pub over_sla: i64,
    pub case_duration: i64,
}

impl CaseSummaryBucket {
    pub fn empty(key: &SummaryBucketKey) -> Self {
        Self {
            org_id: key.org_id.clone(),
            date: key.date.clone(),
            hour: key.hour.clone(),
            group_type_id: key.group_type_id.clone(),
            country_id: key.country_id.clone(),
            prov_id: key.prov_id.clone(),
            dist_id: key.dist_id.clone(),
            total: 0,
            in_sla: 0,
            over_sla: 0,
            case_duration: 0,
        }
    }

    pub fn apply(&mut self, delta: SummaryDelta) {
        self.total += delta.total;
        self.in_sla += delta.in_sla;
        self.over_sla += delta.over_sla;
        self.case_duration += delta.case_duration;
    }
}

/// Per-group total for one day.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupTotal {
    pub group_type_id: String,
    pub total: i64,
}

/// Display group aggregating several case types.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupType {
    pub id: i64,
    pub org_id: String,
    pub group_type_id: String,
    pub en: String,
    pub th: String,
    pub case_type_ids: Vec<String>,
    pub prefix: String,
}

impl GroupType {
    pub fn contains(&self, case_type_id: &str) -> bool {
        self.case_type_ids.iter().any(|id| id == case_type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_key_uses_reporting_offset() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 18, 30, 0).unwrap();
        let bangkok = FixedOffset::east_opt(7 * 3600).unwrap();
        let geo = Geography { country_id: "TH".into(), prov_id: "10".into(), dist_id: "1001".into() };

        let key = SummaryBucketKey::at("org", "G1", &geo, at, bangkok);
        assert_eq!(key.date, "2025/01/02");
        assert_eq!(key.hour, "01:00:00");
        assert_eq!(key.prov_id, "10");
    }

    #[test]
    fn test_bucket_apply() {
        let key = SummaryBucketKey {
            org_id: "o".into(),
            date: "2025/01/01".into(),
            hour: "10:00:00".into(),
            group_type_id: "G".into(),
            country_id: "".into(),
            prov_id: "".into(),
            dist_id: "".into(),
        };
        let mut bucket = CaseSummaryBucket::empty(&key);
        bucket.apply(SummaryDelta::opened());
        bucket.apply(SummaryDelta::closed_in_sla(120));
        bucket.apply(SummaryDelta::closed_over_sla());
        assert_eq!((bucket.total, bucket.in_sla, bucket.over_sla, bucket.case_duration), (1, 1, 1, 120));
    }
}
