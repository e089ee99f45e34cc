//! Joins footprints to candidate parcels on `parcel_key`.
//!
//! Every index list produced here is in input order. The resolver's
//! tie-break depends on it, so nothing in this module may reorder.

use std::collections::BTreeMap;

use pre_event_inventory_models::{Footprint, Parcel};

/// One footprint row paired with one parcel, by index into the input
/// collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidatePair {
    pub footprint: usize,
    pub parcel: usize,
}

/// The input rows sharing one `footprint_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootprintGroup {
    /// Row indices, first occurrence first.
    pub rows: Vec<usize>,
}

impl FootprintGroup {
    /// Index of the first row, which names the group.
    #[must_use]
    pub fn first_row(&self) -> usize {
        self.rows[0]
    }
}

/// All candidate pairs for one footprint id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateGroup {
    /// Index of the first input row with this id.
    pub footprint: usize,
    /// Pairs ordered by row, then by parcel input order.
    pub pairs: Vec<CandidatePair>,
}

/// Parcel indices by join key.
#[derive(Debug, Default)]
pub struct KeyIndex {
    by_key: BTreeMap<String, Vec<usize>>,
}

impl KeyIndex {
    /// Indexes parcels by key. Parcels with an empty key are not indexed.
    #[must_use]
    pub fn build(parcels: &[Parcel]) -> Self {
        let mut by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut unkeyed = 0_usize;

        for (i, parcel) in parcels.iter().enumerate() {
            if parcel.parcel_key.is_empty() {
                unkeyed += 1;
                continue;
            }
            by_key.entry(parcel.parcel_key.clone()).or_default().push(i);
        }

        if unkeyed > 0 {
            log::warn!("{unkeyed} parcels have an empty parcel key and cannot be joined");
        }

        let shared = by_key.values().filter(|v| v.len() > 1).count();
        if shared > 0 {
            log::debug!("{shared} parcel keys are shared by more than one parcel");
        }

        Self { by_key }
    }

    /// Parcel indices for `key`, in input order.
    #[must_use]
    pub fn candidates(&self, key: &str) -> &[usize] {
        self.by_key.get(key).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Groups footprint rows by `footprint_id`, in order of first occurrence.
#[must_use]
pub fn group_footprints(footprints: &[Footprint]) -> Vec<FootprintGroup> {
    let mut slot_by_id: BTreeMap<&str, usize> = BTreeMap::new();
    let mut groups: Vec<FootprintGroup> = Vec::new();

    for (row, footprint) in footprints.iter().enumerate() {
        match slot_by_id.get(footprint.footprint_id.as_str()) {
            Some(&slot) => groups[slot].rows.push(row),
            None => {
                slot_by_id.insert(&footprint.footprint_id, groups.len());
                groups.push(FootprintGroup { rows: vec![row] });
            }
        }
    }

    groups
}

/// Produces the candidate pairs for one footprint group.
#[must_use]
pub fn join_group(
    group: &FootprintGroup,
    footprints: &[Footprint],
    index: &KeyIndex,
) -> CandidateGroup {
    let pairs = group
        .rows
        .iter()
        .flat_map(|&row| {
            index
                .candidates(&footprints[row].parcel_key)
                .iter()
                .map(move |&parcel| CandidatePair {
                    footprint: row,
                    parcel,
                })
        })
        .collect();

    CandidateGroup {
        footprint: group.first_row(),
        pairs,
    }
}
