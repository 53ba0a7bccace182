//! The mutating half of a policy rollout: a chunked pass that recomputes
//! and persists every record's validation schedule.
//!
//! The pass is deterministic from each record's anchor date, so re-running
//! it for the same cadence table recomputes identical values; that is what
//! makes a retried or re-applied policy safe.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::preview::reschedule;
use super::repository::{EntityId, InventoryRepository, ScheduleUpdate};
use super::ruleset::ValidationFrequencies;

/// A failure inside the apply pass. `entity_id` is absent when the store
/// failed while listing a chunk rather than while updating one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRecordError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    pub message: String,
}

/// Outcome of `apply_policy`. `success` is false whenever any record could
/// not be updated; the policy's lifecycle state is only advanced on full
/// success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub success: bool,
    pub records_updated: usize,
    pub errors: Vec<ApplyRecordError>,
}

/// Persist the candidate cadences across the whole inventory in bounded
/// chunks. Returns the count of records actually updated plus the errors
/// hit along the way; a failure never escapes the report, so a partial
/// state is fully described and re-driveable.
pub(crate) fn apply_frequencies<I: InventoryRepository + ?Sized>(
    inventory: &I,
    candidate: &ValidationFrequencies,
    chunk_size: usize,
) -> ApplyReport {
    let mut records_updated = 0;
    let mut errors = Vec::new();
    let mut offset = 0;

    loop {
        let chunk = match inventory.list_chunk(offset, chunk_size) {
            Ok(chunk) => chunk,
            Err(error) => {
                warn!(offset, %error, "failed to list inventory chunk");
                errors.push(ApplyRecordError {
                    entity_id: None,
                    message: format!("listing inventory at offset {offset}: {error}"),
                });
                break;
            }
        };
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len();

        for record in &chunk {
            let row = reschedule(record, candidate);
            let update = ScheduleUpdate {
                validation_frequency_months: row.new_frequency_months,
                next_validation_due: row.new_due,
            };
            match inventory.update_schedule(&record.entity_id, update) {
                Ok(()) => records_updated += 1,
                Err(error) => {
                    warn!(
                        entity = %record.entity_id,
                        %error,
                        "failed to persist recomputed schedule"
                    );
                    errors.push(ApplyRecordError {
                        entity_id: Some(record.entity_id.clone()),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    ApplyReport {
        success: errors.is_empty(),
        records_updated,
        errors,
    }
}
