//! Property-based tests for the counter and mapping types.

use proptest::prelude::*;

use crate::{CaseSummaryBucket, Severity, SummaryBucketKey, SummaryDelta};

fn key() -> SummaryBucketKey {
    SummaryBucketKey {
        org_id: "org".to_string(),
        date: "2025/01/01".to_string(),
        hour: "08:00:00".to_string(),
        group_type_id: "G1".to_string(),
        country_id: "TH".to_string(),
        prov_id: "10".to_string(),
        dist_id: "1001".to_string(),
    }
}

fn arb_delta() -> impl Strategy<Value = SummaryDelta> {
    prop_oneof![
        Just(SummaryDelta::opened()),
        (0i64..86_400).prop_map(SummaryDelta::closed_in_sla),
        Just(SummaryDelta::closed_over_sla()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_bucket_counters_never_decrease(deltas in prop::collection::vec(arb_delta(), 0..50)) {
        let mut bucket = CaseSummaryBucket::empty(&key());
        for delta in deltas {
            let before = bucket.clone();
            bucket.apply(delta);
            prop_assert!(bucket.total >= before.total);
            prop_assert!(bucket.in_sla >= before.in_sla);
            prop_assert!(bucket.over_sla >= before.over_sla);
            prop_assert!(bucket.case_duration >= before.case_duration);
        }
    }

    #[test]
    fn prop_closed_delta_never_counts_both(secs in 0i64..1_000_000) {
        let in_sla = SummaryDelta::closed_in_sla(secs);
        prop_assert_eq!(in_sla.over_sla, 0);
        let over = SummaryDelta::closed_over_sla();
        prop_assert_eq!(over.in_sla, 0);
        prop_assert_eq!(over.case_duration, 0);
    }

    #[test]
    fn prop_severity_parse_ignores_case(idx in 0usize..4, upper in any::<bool>()) {
        let names = ["critical", "high", "medium", "low"];
        let raw = if upper { names[idx].to_ascii_uppercase() } else { names[idx].to_string() };
        let parsed = Severity::parse(&raw);
        prop_assert!(parsed.is_some());
        prop_assert_eq!(parsed.map(|s| s.to_string().to_ascii_lowercase()), Some(names[idx].to_string()));
    }
}
