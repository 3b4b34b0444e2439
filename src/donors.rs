//! Donor retrieval, local filtering and listing stats.

use crate::api::{ApiError, DonorApi};
use crate::model::{BloodGroup, Coordinates, DonorFilters, DonorRecord};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonorSource {
    Live,
    Fallback,
}

impl DonorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DonorLookup {
    pub donors: Vec<DonorRecord>,
    pub source: DonorSource,
    /// Why the live request failed, when it did.
    pub failure: Option<String>,
}

/// List donors, substituting the sample set when the API returns nothing or
/// cannot be reached.
///
/// With `fallback` off, failures propagate and an empty listing stays empty.
pub fn fetch_reliable(
    api: &dyn DonorApi,
    filters: &DonorFilters,
    fallback: bool,
) -> Result<DonorLookup, ApiError> {
    match api.donors(filters) {
        Ok(donors) if !donors.is_empty() || !fallback => Ok(DonorLookup {
            donors,
            source: DonorSource::Live,
            failure: None,
        }),
        Ok(_) => {
            tracing::info!("donor listing empty, using sample donors");
            Ok(DonorLookup {
                donors: sample_donors(filters),
                source: DonorSource::Fallback,
                failure: None,
            })
        }
        Err(e) if fallback => {
            tracing::warn!(error = %e, "failed to fetch donors, using sample donors");
            Ok(DonorLookup {
                donors: sample_donors(filters),
                source: DonorSource::Fallback,
                failure: Some(e.to_string()),
            })
        }
        Err(e) => Err(e),
    }
}

fn sample(id: &str, name: &str, blood_group: BloodGroup, location: &str) -> DonorRecord {
    DonorRecord {
        id: id.to_string(),
        name: name.to_string(),
        blood_group,
        location: location.to_string(),
        last_donated: None,
        contact_number: String::new(),
        available: true,
        coordinates: None,
    }
}

/// The fixed demo set, narrowed by `filters`.
pub fn sample_donors(filters: &DonorFilters) -> Vec<DonorRecord> {
    let all = vec![
        DonorRecord {
            last_donated: NaiveDate::from_ymd_opt(2025, 5, 10),
            contact_number: "+1 (555) 123-4567".to_string(),
            coordinates: Some(Coordinates::new(40.7128, -74.0060)),
            ..sample("1", "John Doe", BloodGroup::APos, "New York")
        },
        DonorRecord {
            last_donated: NaiveDate::from_ymd_opt(2025, 4, 22),
            contact_number: "+1 (555) 234-5678".to_string(),
            coordinates: Some(Coordinates::new(34.0522, -118.2437)),
            ..sample("2", "Jane Smith", BloodGroup::ONeg, "Los Angeles")
        },
        DonorRecord {
            last_donated: NaiveDate::from_ymd_opt(2025, 6, 5),
            contact_number: "+1 (555) 345-6789".to_string(),
            available: false,
            coordinates: Some(Coordinates::new(41.8781, -87.6298)),
            ..sample("3", "Mike Johnson", BloodGroup::BPos, "Chicago")
        },
        DonorRecord {
            last_donated: NaiveDate::from_ymd_opt(2025, 3, 15),
            contact_number: "+1 (555) 456-7890".to_string(),
            coordinates: Some(Coordinates::new(29.7604, -95.3698)),
            ..sample("4", "Sarah Williams", BloodGroup::AbPos, "Houston")
        },
        DonorRecord {
            last_donated: NaiveDate::from_ymd_opt(2025, 2, 28),
            contact_number: "+1 (555) 567-8901".to_string(),
            coordinates: Some(Coordinates::new(33.4484, -112.0740)),
            ..sample("5", "David Brown", BloodGroup::ANeg, "Phoenix")
        },
    ];
    filter_donors(&all, filters)
}

pub fn filter_donors(records: &[DonorRecord], filters: &DonorFilters) -> Vec<DonorRecord> {
    records
        .iter()
        .filter(|record| filters.matches(record))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DonorStats {
    pub total: usize,
    pub available: usize,
    pub locations: usize,
    pub by_group: BTreeMap<BloodGroup, usize>,
    /// Groups in the order they first appear in the listing.
    seen: Vec<BloodGroup>,
}

impl DonorStats {
    pub fn from_records(records: &[DonorRecord]) -> Self {
        let mut by_group = BTreeMap::new();
        let mut seen = Vec::new();
        for record in records {
            let count = by_group.entry(record.blood_group).or_insert(0);
            if *count == 0 {
                seen.push(record.blood_group);
            }
            *count += 1;
        }
        let locations: BTreeSet<&str> = records.iter().map(|r| r.location.as_str()).collect();
        Self {
            total: records.len(),
            available: records.iter().filter(|r| r.available).count(),
            locations: locations.len(),
            by_group,
            seen,
        }
    }

    /// Most frequent group; ties go to the group seen first in the listing.
    pub fn most_common_group(&self) -> Option<BloodGroup> {
        let mut best: Option<(BloodGroup, usize)> = None;
        for group in &self.seen {
            let count = self.by_group.get(group).copied().unwrap_or(0);
            if best.map_or(true, |(_, n)| count > n) {
                best = Some((*group, count));
            }
        }
        best.map(|(group, _)| group)
    }
}

pub const LOAD_FAILED: &str = "Failed to fetch donors. Please try again later.";
pub const SEARCH_FAILED: &str = "Failed to search donors. Please try again later.";

/// Home listing: the unfiltered load is kept so clearing filters needs no
/// network call.
#[derive(Debug, Default)]
pub struct DonorBrowser {
    all: Vec<DonorRecord>,
    shown: Vec<DonorRecord>,
    stats: DonorStats,
    filters: DonorFilters,
    initial_source: Option<DonorSource>,
    source: Option<DonorSource>,
    error: Option<String>,
    loaded: bool,
}

impl DonorBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, api: &dyn DonorApi, fallback: bool) {
        self.error = None;
        let lookup = fetch_reliable(api, &DonorFilters::default(), fallback).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "donor load failed");
            self.error = Some(LOAD_FAILED.to_string());
            // last resort, same as the initial page load
            DonorLookup {
                donors: sample_donors(&DonorFilters::default()),
                source: DonorSource::Fallback,
                failure: Some(e.to_string()),
            }
        });
        self.stats = DonorStats::from_records(&lookup.donors);
        self.initial_source = Some(lookup.source);
        self.source = Some(lookup.source);
        self.all = lookup.donors;
        self.shown = self.all.clone();
        self.filters = DonorFilters::default();
        self.loaded = true;
    }

    /// Whether the unfiltered listing has been fetched.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn search(&mut self, api: &dyn DonorApi, filters: DonorFilters, fallback: bool) {
        self.error = None;
        match fetch_reliable(api, &filters, fallback) {
            Ok(lookup) => {
                self.source = Some(lookup.source);
                self.shown = lookup.donors;
            }
            Err(e) => {
                tracing::warn!(error = %e, "donor search failed");
                self.error = Some(SEARCH_FAILED.to_string());
            }
        }
        self.filters = filters;
    }

    /// Back to the initial listing, with its source, and drop any banner.
    pub fn clear(&mut self) {
        self.error = None;
        self.filters = DonorFilters::default();
        self.source = self.initial_source;
        self.shown = self.all.clone();
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn shown(&self) -> &[DonorRecord] {
        &self.shown
    }

    pub fn stats(&self) -> &DonorStats {
        &self.stats
    }

    pub fn filters(&self) -> &DonorFilters {
        &self.filters
    }

    pub fn source(&self) -> Option<DonorSource> {
        self.source
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
