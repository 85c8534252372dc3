use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::ReconcileParams;
use crate::feeds::PrizeBook;
use crate::models::{DrawRange, DrawRecord, NgrSource};
use crate::reconcile::attribution::resolve_attribution;
use crate::reconcile::jackpot::apply_jackpot_adjustments;
use crate::reconcile::store::DrawRecordStore;

/// Reconciled, ordered draw timeline. Immutable once built.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timeline {
    records: Vec<DrawRecord>,
}

impl Timeline {
    /// Store -> attribution -> jackpot adjustment, all from one prize book.
    pub fn build(store: DrawRecordStore, book: &PrizeBook, params: &ReconcileParams) -> Self {
        let (mut records, posted) = store.into_parts();
        for rec in records.iter_mut() {
            rec.prizes = book.get(rec.draw_number).map(|t| t.to_vec());
        }
        resolve_attribution(&mut records, &posted, book, params);
        apply_jackpot_adjustments(&mut records, params);
        Self { records }
    }

    pub fn records(&self) -> &[DrawRecord] {
        &self.records
    }

    pub fn get(&self, draw_number: u64) -> Option<&DrawRecord> {
        self.records
            .binary_search_by_key(&draw_number, |r| r.draw_number)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn range(&self, range: DrawRange) -> Vec<DrawRecord> {
        self.records
            .iter()
            .filter(|r| range.contains(r.draw_number))
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<&DrawRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn source_breakdown(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> = [
            NgrSource::Static,
            NgrSource::Calculated,
            NgrSource::Estimated,
            NgrSource::None,
        ]
        .iter()
        .map(|s| (s.as_str(), 0))
        .collect();
        for rec in &self.records {
            *counts.entry(rec.ngr_source.as_str()).or_insert(0) += 1;
        }
        counts
    }
}
