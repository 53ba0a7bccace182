//! Read-only re-tiering preview: the blast radius of a candidate cadence
//! table across every tracked entity, with nothing mutated.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::repository::{EntityId, InventoryRecord, InventoryRepository, RepositoryError};
use super::ruleset::{TierKey, ValidationFrequencies};

/// Hypothetical schedule for one record under the candidate cadences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedRecord {
    pub entity_id: EntityId,
    pub tier: TierKey,
    pub previous_frequency_months: Option<u32>,
    pub new_frequency_months: Option<u32>,
    pub previous_due: Option<NaiveDate>,
    pub new_due: Option<NaiveDate>,
    /// Always false for a frequency-only candidate: re-running full
    /// classification needs the original intake attributes, which a cadence
    /// change does not touch.
    pub tier_changed: bool,
    pub frequency_changed: bool,
    pub due_date_changed: bool,
}

impl AffectedRecord {
    pub fn is_affected(&self) -> bool {
        self.tier_changed || self.frequency_changed || self.due_date_changed
    }
}

/// Aggregate blast-radius counts. `records_total` is the store's count at
/// the start of the pass; `records_reviewed` is what the chunked scan saw,
/// so the two diverge if the inventory changes mid-preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub records_total: usize,
    pub records_reviewed: usize,
    pub records_affected: usize,
    pub earlier_due_dates: usize,
    pub later_due_dates: usize,
}

/// Full preview output: one row per tracked record plus the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewReport {
    pub affected: Vec<AffectedRecord>,
    pub summary: PreviewSummary,
}

/// Next due date from an anchor and a cadence. `None` when the addition
/// overflows the calendar range.
pub(crate) fn due_from(anchor: NaiveDate, months: u32) -> Option<NaiveDate> {
    anchor.checked_add_months(Months::new(months))
}

/// Recompute one record's hypothetical schedule under `candidate`.
pub(crate) fn reschedule(
    record: &InventoryRecord,
    candidate: &ValidationFrequencies,
) -> AffectedRecord {
    let new_frequency = candidate.months_for(&record.tier);
    let new_due = new_frequency.and_then(|months| due_from(record.schedule_anchor(), months));

    AffectedRecord {
        entity_id: record.entity_id.clone(),
        tier: record.tier.clone(),
        previous_frequency_months: record.validation_frequency_months,
        new_frequency_months: new_frequency,
        previous_due: record.next_validation_due,
        new_due,
        tier_changed: false,
        frequency_changed: new_frequency != record.validation_frequency_months,
        due_date_changed: new_due != record.next_validation_due,
    }
}

/// Stream the inventory in chunks and report every record's would-be
/// schedule. Safe to run concurrently and to abandon: nothing is written.
pub fn preview<I: InventoryRepository + ?Sized>(
    inventory: &I,
    candidate: &ValidationFrequencies,
    chunk_size: usize,
) -> Result<PreviewReport, RepositoryError> {
    let mut affected = Vec::new();
    let mut summary = PreviewSummary {
        records_total: inventory.count()?,
        ..PreviewSummary::default()
    };
    let mut offset = 0;

    loop {
        let chunk = inventory.list_chunk(offset, chunk_size)?;
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len();

        for record in &chunk {
            let row = reschedule(record, candidate);
            summary.records_reviewed += 1;
            if row.is_affected() {
                summary.records_affected += 1;
            }
            match (row.previous_due, row.new_due) {
                (Some(previous), Some(new)) if new < previous => {
                    summary.earlier_due_dates += 1;
                }
                (Some(previous), Some(new)) if new > previous => {
                    summary.later_due_dates += 1;
                }
                _ => {}
            }
            affected.push(row);
        }
    }

    Ok(PreviewReport { affected, summary })
}
