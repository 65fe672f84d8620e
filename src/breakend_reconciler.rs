/*!
# Breakend Reconciler
Pairs the two halves of a mated breakend (`MATEID`) into a single record, even when the halves arrive in different batches on different workers.
The first half to arrive is parked in a shared table keyed by its pairing id; the second half completes the pair and removes the entry.
Once every worker has finished, whatever is still parked is drained exactly once and forwarded as unpaired records.

## Example usage
```rust
use indexmap::IndexMap;
use vannot::breakend_reconciler::{BreakendReconciler, PendingMate};
use vannot::data_types::variants::Variant;

fn half(id: &str, mate: &str, start: u64, alt: &str) -> PendingMate {
    let mut info = IndexMap::new();
    info.insert("MATEID".to_string(), mate.to_string());
    let variant = Variant::new("chr1".to_string(), start, "A".to_string(), alt.to_string()).unwrap()
        .with_id(Some(id.to_string()))
        .with_info(info);
    PendingMate::new(variant, None).unwrap()
}

// a single worker sees both halves, in reverse order
let reconciler = BreakendReconciler::new(1);
assert!(reconciler.submit(half("bnd2", "bnd1", 500, "]chr1:100]A")).unwrap().is_none());
let paired = reconciler.submit(half("bnd1", "bnd2", 100, "A[chr1:500[")).unwrap().unwrap();
assert_eq!(paired.start(), 100);
assert_eq!(paired.end(), 500);

// nothing left over for the drain
let leftovers = reconciler.finish_worker().unwrap().unwrap();
assert!(leftovers.is_empty());
```
*/
use log::{debug, warn};
use rustc_hash::FxHashMap as HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::data_types::structural_variant::{parse_confidence_interval, StructuralVariant};
use crate::data_types::variants::{Variant, MATE_CIPOS_KEY};

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("a worker finished after all {workers} workers were already accounted for")]
    WorkerCountUnderflow { workers: usize },
    #[error("pending breakends were already drained")]
    AlreadyDrained,
    #[error("breakend reconciliation state lock was poisoned")]
    Poisoned
}

/// One half of a mated breakend waiting for its partner
#[derive(Clone, Debug, PartialEq)]
pub struct PendingMate {
    /// The decoded record for this half
    variant: Variant,
    /// Identifier of this half
    id: String,
    /// Identifier of the partner half
    mate_id: String,
    /// Raw CIPOS value from the input, kept verbatim for `MATE_CIPOS`
    cipos: Option<String>
}

impl PendingMate {
    /// Wraps a decoded breakend record.
    /// Returns `None` if the record lacks either its own id or a mate id.
    /// # Arguments
    /// * `variant` - the decoded breakend record
    /// * `cipos` - the raw CIPOS string of this record, if present
    pub fn new(variant: Variant, cipos: Option<String>) -> Option<Self> {
        let id = variant.id()?.to_string();
        let mate_id = variant.mate_id()?.to_string();
        Some(Self {
            variant, id, mate_id, cipos
        })
    }

    /// Order-independent identity of a breakend pair, the two ids sorted and joined by `_`
    pub fn pairing_id(&self) -> String {
        if self.id <= self.mate_id {
            format!("{}_{}", self.id, self.mate_id)
        } else {
            format!("{}_{}", self.mate_id, self.id)
        }
    }

    /// Returns the record as-is, used when the partner never shows up
    pub fn into_variant(self) -> Variant {
        self.variant
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mate_id(&self) -> &str {
        &self.mate_id
    }

    /// Ordering used to pick the primary half of a pair regardless of arrival order
    fn primary_order(&self) -> (&str, u64, &str) {
        (self.variant.chromosome(), self.variant.start(), self.id.as_str())
    }
}

/// Merges the two halves of a pair into one record.
/// The primary half supplies coordinates, alleles, and INFO; the secondary half's position and CIPOS become the end interval.
/// # Arguments
/// * `primary` - the half whose coordinates are kept
/// * `secondary` - the half that supplies the end
pub fn merge_pair(primary: PendingMate, secondary: PendingMate) -> Variant {
    let PendingMate { variant: mut merged, .. } = primary;
    let mate_position = secondary.variant.start();
    let mate_offsets = secondary.cipos.as_deref()
        .and_then(|raw| parse_confidence_interval(raw).ok());

    if merged.sv().is_none() {
        let start = merged.start();
        *merged.sv_mut() = StructuralVariant::default().with_start_interval(start, None);
    }
    merged.sv_mut().set_end_interval(mate_position, mate_offsets);
    if let Some(raw) = secondary.cipos {
        merged.info_mut().insert(MATE_CIPOS_KEY.to_string(), raw);
    }
    merged.set_end(Some(mate_position));
    merged
}

/// Shared pairing state for one run.
/// Critical sections only cover the table lookup; merging happens outside the lock.
#[derive(Debug)]
pub struct BreakendReconciler {
    /// pairing id -> first half seen
    pending: Mutex<HashMap<String, PendingMate>>,
    /// workers that have not yet finished
    active_workers: AtomicUsize,
    /// total number of workers
    num_workers: usize,
    /// set once the leftover table has been flushed
    drained: AtomicBool
}

impl BreakendReconciler {
    /// Creates the state for `num_workers` workers; a count of 0 is treated as 1
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        Self {
            pending: Mutex::new(HashMap::default()),
            active_workers: AtomicUsize::new(num_workers),
            num_workers,
            drained: AtomicBool::new(false)
        }
    }

    /// Offers one half. Returns the merged record if this completed a pair, otherwise the half is parked.
    /// # Errors
    /// * if the shared table lock is poisoned
    pub fn submit(&self, half: PendingMate) -> Result<Option<Variant>, ReconcileError> {
        let pairing_id = half.pairing_id();
        let partner = {
            let mut pending = self.pending.lock().map_err(|_| ReconcileError::Poisoned)?;
            match pending.entry(pairing_id) {
                Entry::Vacant(entry) => {
                    entry.insert(half);
                    return Ok(None);
                },
                Entry::Occupied(entry) => entry.remove()
            }
        };

        if partner.id == half.id {
            // same id twice is not a pair; keep the newer one parked and forward the older
            warn!("Breakend {} was seen twice before its mate {}", half.id, half.mate_id);
            let mut pending = self.pending.lock().map_err(|_| ReconcileError::Poisoned)?;
            pending.insert(half.pairing_id(), half);
            return Ok(Some(partner.into_variant()));
        }

        let (primary, secondary) = if partner.primary_order() <= half.primary_order() {
            (partner, half)
        } else {
            (half, partner)
        };
        debug!("Paired breakends {} and {}", primary.id, secondary.id);
        Ok(Some(merge_pair(primary, secondary)))
    }

    /// Marks one worker as finished.
    /// The worker that brings the active count to zero receives every unpaired half, sorted by pairing id.
    /// # Errors
    /// * if more workers finish than were registered
    /// * if the leftovers were already drained
    pub fn finish_worker(&self) -> Result<Option<Vec<Variant>>, ReconcileError> {
        let previous = self.active_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1))
            .map_err(|_| ReconcileError::WorkerCountUnderflow { workers: self.num_workers })?;

        if previous == 1 {
            Ok(Some(self.drain()?))
        } else {
            Ok(None)
        }
    }

    fn drain(&self) -> Result<Vec<Variant>, ReconcileError> {
        if self.drained.swap(true, Ordering::SeqCst) {
            return Err(ReconcileError::AlreadyDrained);
        }
        let leftovers = {
            let mut pending = self.pending.lock().map_err(|_| ReconcileError::Poisoned)?;
            std::mem::take(&mut *pending)
        };
        let mut leftovers: Vec<(String, PendingMate)> = leftovers.into_iter().collect();
        leftovers.sort_by(|a, b| a.0.cmp(&b.0));
        if !leftovers.is_empty() {
            debug!("Draining {} unpaired breakends", leftovers.len());
        }
        Ok(leftovers.into_iter().map(|(_, half)| half.into_variant()).collect())
    }

    /// Number of halves currently waiting for a partner
    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Number of workers that have not yet called [`BreakendReconciler::finish_worker`]
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }
}
