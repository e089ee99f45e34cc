#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Footprint-to-parcel join and multi-parcel duplicate resolution.
//!
//! A building that straddles several parcels, or whose parcel key is
//! shared, joins against more than one parcel. The resolver keeps exactly
//! one pair per footprint id: the parcel covering the largest share of the
//! footprint, with ties going to the pair seen first in input order.

pub mod join;

use pre_event_inventory_models::{Footprint, Parcel};
use pre_event_spatial::{ParcelCache, PreparedFootprint};

pub use join::{
    CandidateGroup, CandidatePair, FootprintGroup, KeyIndex, group_footprints, join_group,
};

/// The pair kept for a footprint id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPair {
    pub pair: CandidatePair,
    /// Overlap of the winning pair. `None` when the group had a single
    /// candidate and was kept without scoring.
    pub overlap_area: Option<f64>,
    /// Candidate pairs the group started with.
    pub candidate_count: usize,
}

/// Outcome of resolving one footprint group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedPair),
    /// The parcel key matched no parcel.
    DroppedNoCandidate,
    /// Several candidates existed but none had a usable overlap score.
    DroppedInvalidGeometry,
}

impl Resolution {
    /// The kept pair, if any.
    #[must_use]
    pub const fn resolved(&self) -> Option<&ResolvedPair> {
        match self {
            Self::Resolved(pair) => Some(pair),
            Self::DroppedNoCandidate | Self::DroppedInvalidGeometry => None,
        }
    }
}

/// Resolves candidate groups against one run's inputs.
///
/// Holds only shared references, so one resolver can be used from many
/// worker threads at once.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    footprints: &'a [Footprint],
    parcels: &'a [Parcel],
    cache: &'a ParcelCache,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub const fn new(
        footprints: &'a [Footprint],
        parcels: &'a [Parcel],
        cache: &'a ParcelCache,
    ) -> Self {
        Self {
            footprints,
            parcels,
            cache,
        }
    }

    /// Picks the single surviving pair for a group.
    ///
    /// A lone candidate is kept without computing any overlap. Otherwise
    /// every pair is scored and the strictly largest overlap wins, so on
    /// equal scores the earliest pair stays. Pairs without a usable score
    /// are skipped rather than scored as zero.
    #[must_use]
    pub fn resolve(&self, group: &CandidateGroup) -> Resolution {
        match group.pairs.as_slice() {
            [] => Resolution::DroppedNoCandidate,
            [only] => Resolution::Resolved(ResolvedPair {
                pair: *only,
                overlap_area: None,
                candidate_count: 1,
            }),
            pairs => self.resolve_scored(group.footprint, pairs),
        }
    }

    fn resolve_scored(&self, footprint: usize, pairs: &[CandidatePair]) -> Resolution {
        let mut prepared: Vec<(usize, PreparedFootprint)> = Vec::new();
        let mut best: Option<(CandidatePair, f64)> = None;

        for pair in pairs {
            let geometry = &self.footprints[pair.footprint].geometry;
            let cached = prepared.iter().position(|(row, _)| *row == pair.footprint);
            let slot = if let Some(slot) = cached {
                slot
            } else {
                prepared.push((pair.footprint, PreparedFootprint::new(geometry)));
                prepared.len() - 1
            };

            let score = self.cache.overlap_score(
                geometry,
                &prepared[slot].1,
                &self.parcels[pair.parcel].geometry,
                pair.parcel,
            );

            match (score, best) {
                (None, _) => {}
                (Some(score), None) => best = Some((*pair, score)),
                (Some(score), Some((_, current))) if score > current => {
                    best = Some((*pair, score));
                }
                (Some(_), Some(_)) => {}
            }
        }

        best.map_or_else(
            || {
                log::debug!(
                    "Footprint {} dropped: none of its {} candidates had a usable geometry",
                    self.footprints[footprint].footprint_id,
                    pairs.len()
                );
                Resolution::DroppedInvalidGeometry
            },
            |(pair, overlap)| {
                Resolution::Resolved(ResolvedPair {
                    pair,
                    overlap_area: Some(overlap),
                    candidate_count: pairs.len(),
                })
            },
        )
    }

    /// Emits every candidate pair unresolved, for runs with
    /// deduplication disabled.
    #[must_use]
    pub fn passthrough(group: &CandidateGroup) -> Vec<ResolvedPair> {
        group
            .pairs
            .iter()
            .map(|pair| ResolvedPair {
                pair: *pair,
                overlap_area: None,
                candidate_count: group.pairs.len(),
            })
            .collect()
    }
}
