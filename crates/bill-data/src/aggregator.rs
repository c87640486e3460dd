//! Projection of stored bills into the list shown for a view mode.

use std::cmp::Ordering;

use bill_core::contracts::{is_mergeable_contract, ViewMode};
use bill_core::models::{BillRecord, DerivedBillRecord, COMPOSITE_ID_SEPARATOR};

/// Prefix of the contract type of a merged row.
pub const MERGED_CONTRACT_PREFIX: &str = "合算: ";

/// Separator between member contract types of a merged row.
pub const MERGED_CONTRACT_SEPARATOR: &str = " + ";

// ── BillAggregator ────────────────────────────────────────────────────────────

/// Stateless helper that filters, merges and orders bills for display.
pub struct BillAggregator;

impl BillAggregator {
    /// Project `records` for `mode`.
    ///
    /// Every returned row carries per-day figures. Rows are ordered newest
    /// first by timestamp; rows without a timestamp come last and ties keep
    /// their input order.
    pub fn project(records: &[BillRecord], mode: &ViewMode) -> Vec<DerivedBillRecord> {
        let mut projected: Vec<DerivedBillRecord> = match mode {
            ViewMode::AllRecords => records
                .iter()
                .cloned()
                .map(DerivedBillRecord::from_record)
                .collect(),
            ViewMode::FilterByContractSubstring(token) => records
                .iter()
                .filter(|r| r.contract_type.contains(token.as_str()))
                .cloned()
                .map(DerivedBillRecord::from_record)
                .collect(),
            ViewMode::CombinedByPeriod => Self::combine_by_period(records),
        };

        projected.sort_by(|a, b| newest_first(&a.record, &b.record));
        projected
    }

    /// Keep only records of `recorder`, or everything when `None`.
    pub fn filter_by_recorder(records: &[BillRecord], recorder: Option<&str>) -> Vec<BillRecord> {
        match recorder {
            Some(name) => records
                .iter()
                .filter(|r| r.recorder_name == name)
                .cloned()
                .collect(),
            None => records.to_vec(),
        }
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// Sum mergeable bills that share a billing period.
    fn combine_by_period(records: &[BillRecord]) -> Vec<DerivedBillRecord> {
        // Groups keep first-seen order; a Vec scan is fine at bill-list sizes.
        let mut groups: Vec<(&str, Vec<&BillRecord>)> = Vec::new();
        for record in records
            .iter()
            .filter(|r| is_mergeable_contract(&r.contract_type) && !r.billing_date.is_empty())
        {
            match groups
                .iter_mut()
                .find(|(period, _)| *period == record.billing_date)
            {
                Some((_, members)) => members.push(record),
                None => groups.push((record.billing_date.as_str(), vec![record])),
            }
        }

        groups
            .into_iter()
            .map(|(period, members)| Self::merge_group(period, &members))
            .collect()
    }

    fn merge_group(period: &str, members: &[&BillRecord]) -> DerivedBillRecord {
        let first = members[0];

        let mut contract_types: Vec<&str> = Vec::new();
        for member in members {
            if !contract_types.contains(&member.contract_type.as_str()) {
                contract_types.push(&member.contract_type);
            }
        }

        let mut member_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
        member_ids.sort();

        let merged = BillRecord {
            id: member_ids.join(&COMPOSITE_ID_SEPARATOR.to_string()),
            author_id: first.author_id.clone(),
            recorder_name: first.recorder_name.clone(),
            contract_type: format!(
                "{}{}",
                MERGED_CONTRACT_PREFIX,
                contract_types.join(MERGED_CONTRACT_SEPARATOR)
            ),
            billing_date: period.to_string(),
            usage_kwh: members.iter().map(|m| m.usage_kwh).sum(),
            total_cost: members.iter().map(|m| m.total_cost).sum(),
            // FIXME: members may cover different day counts; this keeps the
            // first member's value rather than reconciling them.
            period_days: first.period_days,
            notes: format!("合算された記録 (料金年月分: {period})"),
            timestamp: first.timestamp,
        };

        DerivedBillRecord::with_members(merged, member_ids)
    }
}

/// Descending timestamp order with missing timestamps last.
fn newest_first(a: &BillRecord, b: &BillRecord) -> Ordering {
    match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, contract: &str, period: &str, usage: f64, cost: f64, days: u32, day: u32) -> BillRecord {
        BillRecord {
            id: id.to_string(),
            author_id: "uid-1".to_string(),
            recorder_name: "山田".to_string(),
            contract_type: contract.to_string(),
            billing_date: period.to_string(),
            usage_kwh: usage,
            total_cost: cost,
            period_days: days,
            notes: String::new(),
            timestamp: Some(Utc.with_ymd_and_hms(2025, 6, day, 9, 0, 0).unwrap()),
        }
    }

    fn ids(projected: &[DerivedBillRecord]) -> Vec<&str> {
        projected.iter().map(|d| d.id()).collect()
    }

    #[test]
    fn test_all_records_sorted_newest_first() {
        let records = vec![
            record("a", "従量電灯B", "R7 4月分", 100.0, 3000.0, 30, 1),
            record("b", "従量電灯B", "R7 5月分", 100.0, 3000.0, 30, 3),
            record("c", "従量電灯B", "R7 6月分", 100.0, 3000.0, 30, 2),
        ];
        let projected = BillAggregator::project(&records, &ViewMode::AllRecords);
        assert_eq!(ids(&projected), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_missing_timestamp_sorts_last() {
        let mut undated = record("x", "従量電灯B", "", 1.0, 1.0, 30, 1);
        undated.timestamp = None;
        let records = vec![undated, record("y", "従量電灯B", "", 1.0, 1.0, 30, 5)];
        let projected = BillAggregator::project(&records, &ViewMode::AllRecords);
        assert_eq!(ids(&projected), vec!["y", "x"]);
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let records = vec![
            record("first", "c", "", 1.0, 1.0, 30, 4),
            record("second", "c", "", 1.0, 1.0, 30, 4),
        ];
        let projected = BillAggregator::project(&records, &ViewMode::AllRecords);
        assert_eq!(ids(&projected), vec!["first", "second"]);
    }

    #[test]
    fn test_filter_by_contract_substring() {
        let records = vec![
            record("a", "低圧電力α", "R7 6月分", 1.0, 1.0, 30, 1),
            record("b", "従量電灯B", "R7 6月分", 1.0, 1.0, 30, 2),
            record("c", "低圧電力αプラス", "R7 6月分", 1.0, 1.0, 30, 3),
        ];
        let mode = ViewMode::FilterByContractSubstring("低圧電力α".to_string());
        let projected = BillAggregator::project(&records, &mode);
        assert_eq!(ids(&projected), vec!["c", "a"]);
        assert!(projected.iter().all(|d| !d.is_merged()));
    }

    #[test]
    fn test_filter_is_case_sensitive() {
        let records = vec![record("a", "Plan-A", "", 1.0, 1.0, 30, 1)];
        let mode = ViewMode::FilterByContractSubstring("plan".to_string());
        assert!(BillAggregator::project(&records, &mode).is_empty());
    }

    #[test]
    fn test_combined_merges_same_period() {
        let records = vec![
            record("a2", "低圧電力α", "R7 6月分", 100.0, 3000.0, 30, 2),
            record("a1", "灯季時別", "R7 6月分", 50.0, 1500.0, 31, 1),
        ];
        let projected = BillAggregator::project(&records, &ViewMode::CombinedByPeriod);
        assert_eq!(projected.len(), 1);

        let merged = &projected[0];
        assert_eq!(merged.record.usage_kwh, 150.0);
        assert_eq!(merged.record.total_cost, 4500.0);
        assert_eq!(merged.record.period_days, 30);
        assert_eq!(merged.record.contract_type, "合算: 低圧電力α + 灯季時別");
        assert_eq!(merged.record.notes, "合算された記録 (料金年月分: R7 6月分)");
        assert_eq!(merged.id(), "a1_a2");
        assert_eq!(merged.merged_ids, vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(merged.record.timestamp, records[0].timestamp);
        assert!((merged.daily_cost - 150.0).abs() < 1e-9);
        assert!((merged.daily_usage - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_combined_dedups_contract_types_in_order() {
        let records = vec![
            record("1", "灯季時別", "R7 5月分", 1.0, 1.0, 30, 3),
            record("2", "低圧電力α", "R7 5月分", 1.0, 1.0, 30, 2),
            record("3", "灯季時別", "R7 5月分", 1.0, 1.0, 30, 1),
        ];
        let projected = BillAggregator::project(&records, &ViewMode::CombinedByPeriod);
        assert_eq!(projected[0].record.contract_type, "合算: 灯季時別 + 低圧電力α");
        assert_eq!(projected[0].record.total_cost, 3.0);
    }

    #[test]
    fn test_combined_single_member_is_still_merged_row() {
        let records = vec![record("solo", "低圧電力α", "R7 4月分", 90.0, 2700.0, 30, 1)];
        let projected = BillAggregator::project(&records, &ViewMode::CombinedByPeriod);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].record.contract_type, "合算: 低圧電力α");
        assert_eq!(projected[0].id(), "solo");
        assert!(projected[0].is_merged());
    }

    #[test]
    fn test_combined_excludes_other_contracts_and_blank_periods() {
        let records = vec![
            record("a", "低圧電力α", "", 1.0, 1.0, 30, 1),
            record("b", "従量電灯B", "R7 6月分", 1.0, 1.0, 30, 2),
        ];
        assert!(BillAggregator::project(&records, &ViewMode::CombinedByPeriod).is_empty());
    }

    #[test]
    fn test_combined_groups_by_exact_period() {
        let records = vec![
            record("a", "低圧電力α", "R7 6月分", 1.0, 10.0, 30, 5),
            record("b", "灯季時別", "R7 5月分", 1.0, 20.0, 30, 4),
            record("c", "灯季時別", "R7 6月分", 1.0, 30.0, 30, 3),
        ];
        let projected = BillAggregator::project(&records, &ViewMode::CombinedByPeriod);
        assert_eq!(ids(&projected), vec!["a_c", "b"]);
        assert_eq!(projected[0].record.total_cost, 40.0);
    }

    #[test]
    fn test_empty_input_yields_empty_projection() {
        for mode in ViewMode::presets() {
            assert!(BillAggregator::project(&[], &mode).is_empty());
        }
    }

    #[test]
    fn test_filter_by_recorder() {
        let mut other = record("b", "c", "", 1.0, 1.0, 30, 2);
        other.recorder_name = "佐藤".to_string();
        let records = vec![record("a", "c", "", 1.0, 1.0, 30, 1), other];

        let only = BillAggregator::filter_by_recorder(&records, Some("佐藤"));
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].id, "b");
        assert_eq!(BillAggregator::filter_by_recorder(&records, None).len(), 2);
    }
}
