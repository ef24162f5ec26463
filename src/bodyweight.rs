// src/bodyweight.rs
use crate::model::BodyWeightEntry;
use chrono::NaiveDate;

pub const CHART_ENTRIES: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct BodyWeightSummary {
    pub min: f64,
    pub max: f64,
    pub latest: f64,
    /// Latest minus earliest reading, signed.
    pub change: f64,
    pub entries: usize,
    /// Most recent readings only, oldest first.
    pub chart: Vec<BodyWeightEntry>,
}

/// Records `weight` for `date`. A second reading on the same day replaces
/// the first. The log stays sorted by date with one reading per day; when a
/// loaded log already repeats a day, the later reading wins.
pub fn record_body_weight(log: &mut Vec<BodyWeightEntry>, date: NaiveDate, weight: f64) {
    // Reversed before the stable sort so the last reading of a day leads its run
    log.reverse();
    log.sort_by_key(|e| e.date);
    log.dedup_by_key(|e| e.date);
    match log.binary_search_by_key(&date, |e| e.date) {
        Ok(i) => log[i].weight = weight,
        Err(i) => log.insert(i, BodyWeightEntry { date, weight }),
    }
}

/// Stats over the whole log. `None` when nothing has been recorded.
pub fn body_weight_summary(log: &[BodyWeightEntry]) -> Option<BodyWeightSummary> {
    let mut sorted: Vec<BodyWeightEntry> = log.to_vec();
    sorted.sort_by_key(|e| e.date);
    let earliest = sorted.first()?.weight;
    let latest = sorted.last()?.weight;
    let min = sorted.iter().map(|e| e.weight).fold(f64::INFINITY, f64::min);
    let max = sorted.iter().map(|e| e.weight).fold(f64::NEG_INFINITY, f64::max);
    let entries = sorted.len();
    let chart = sorted.split_off(entries.saturating_sub(CHART_ENTRIES));
    Some(BodyWeightSummary {
        min,
        max,
        latest,
        change: latest - earliest,
        entries,
        chart,
    })
}
