//! Donor map view: where the view is centred, which donors are pinned, and
//! the plain-text and GeoJSON renderings of those pins.

use crate::api::DonorApi;
use crate::donors::{self, DonorSource, DonorStats};
use crate::model::{Coordinates, DonorFilters, DonorRecord};
use serde_json::{json, Value};

pub const DEFAULT_CENTER: Coordinates = Coordinates {
    lat: 37.7749,
    lon: -122.4194,
};
pub const DEFAULT_ZOOM: u8 = 4;
pub const LOADED_ZOOM: u8 = 12;
pub const FILTERED_ZOOM: u8 = 10;
pub const LOCATED_ZOOM: u8 = 12;

pub const NO_LOCATIONS: &str = "No donors with location data found. Showing demo data instead.";
pub const FETCH_FAILED: &str = "Failed to fetch donor data. Showing demo data instead.";
pub const FETCH_FAILED_NO_DEMO: &str = "Failed to fetch donor data.";

/// One pinned donor.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker<'a> {
    pub label: usize,
    pub position: Coordinates,
    pub color: &'static str,
    pub donor: &'a DonorRecord,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Web-map style: each zoom level halves the visible span.
    pub fn around(center: Coordinates, zoom: u8) -> Self {
        let lon_span = 360.0 / 2f64.powi(i32::from(zoom));
        let lat_span = lon_span / 2.0;
        Self {
            south: center.lat - lat_span / 2.0,
            north: center.lat + lat_span / 2.0,
            west: center.lon - lon_span / 2.0,
            east: center.lon + lon_span / 2.0,
        }
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        (self.south..=self.north).contains(&point.lat)
            && (self.west..=self.east).contains(&point.lon)
    }
}

#[derive(Debug)]
pub struct MapView {
    all: Vec<DonorRecord>,
    shown: Vec<DonorRecord>,
    filters: DonorFilters,
    center: Coordinates,
    zoom: u8,
    source: Option<DonorSource>,
    error: Option<String>,
    loaded: bool,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            shown: Vec::new(),
            filters: DonorFilters::default(),
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            source: None,
            error: None,
            loaded: false,
        }
    }
}

impl MapView {
    pub fn new() -> Self {
        Self::default()
    }

    fn show_all(&mut self, donors: Vec<DonorRecord>) {
        self.shown = donors.clone();
        self.all = donors;
    }

    /// Fetch every donor and keep those that can be pinned.
    pub fn load(&mut self, api: &dyn DonorApi, fallback: bool) {
        self.error = None;
        self.loaded = true;
        let lookup = match donors::fetch_reliable(api, &DonorFilters::default(), fallback) {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!(error = %e, "map donor fetch failed");
                self.error = Some(FETCH_FAILED_NO_DEMO.to_string());
                self.show_all(Vec::new());
                return;
            }
        };
        self.source = Some(lookup.source);
        if lookup.failure.is_some() {
            self.error = Some(FETCH_FAILED.to_string());
        }

        let located: Vec<DonorRecord> = lookup
            .donors
            .into_iter()
            .filter(|d| d.coordinates.is_some_and(|c| c.is_valid()))
            .collect();

        if let Some(first) = located.first().and_then(|d| d.coordinates) {
            self.center = first;
            self.zoom = LOADED_ZOOM;
            self.show_all(located);
        } else if fallback {
            self.error = Some(NO_LOCATIONS.to_string());
            self.source = Some(DonorSource::Fallback);
            self.show_all(donors::sample_donors(&DonorFilters::default()));
        } else {
            self.show_all(Vec::new());
        }
    }

    /// Narrow the pins locally and centre on the first match.
    pub fn apply_filters(&mut self, filters: DonorFilters) {
        self.error = None;
        self.shown = donors::filter_donors(&self.all, &filters);
        if let Some(first) = self.shown.first().and_then(|d| d.coordinates) {
            self.center = first;
            self.zoom = FILTERED_ZOOM;
        }
        self.filters = filters;
    }

    pub fn reset(&mut self) {
        self.error = None;
        self.filters = DonorFilters::default();
        self.shown = self.all.clone();
        self.center = DEFAULT_CENTER;
        self.zoom = DEFAULT_ZOOM;
    }

    /// Centre on a user-supplied `LAT,LON`.
    pub fn use_location(&mut self, input: &str) -> bool {
        self.error = None;
        match input.parse::<Coordinates>() {
            Ok(position) => {
                self.center = position;
                self.zoom = LOCATED_ZOOM;
                true
            }
            Err(reason) => {
                self.error = Some(format!("Unable to use that location: {}", reason));
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn center(&self) -> Coordinates {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::around(self.center, self.zoom)
    }

    pub fn shown(&self) -> &[DonorRecord] {
        &self.shown
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

    /// Stats cover everything loaded, not just the filtered pins.
    pub fn stats(&self) -> DonorStats {
        DonorStats::from_records(&self.all)
    }

    /// Pins for the shown donors, numbered from 1.
    pub fn markers(&self) -> Vec<Marker<'_>> {
        self.shown
            .iter()
            .filter_map(|donor| donor.coordinates.map(|position| (donor, position)))
            .enumerate()
            .map(|(i, (donor, position))| Marker {
                label: i + 1,
                position,
                color: donor.blood_group.color(),
                donor,
            })
            .collect()
    }

    /// Character grid of the current view. Pins show their number (`+` past
    /// 9, `#` where several overlap); `@` marks the centre.
    pub fn plot(&self, width: usize, height: usize) -> String {
        let width = width.max(2);
        let height = height.max(2);
        let bounds = self.bounds();
        let mut grid = vec![vec!['.'; width]; height];

        let cell = |point: Coordinates| -> (usize, usize) {
            let x = (point.lon - bounds.west) / (bounds.east - bounds.west);
            let y = (bounds.north - point.lat) / (bounds.north - bounds.south);
            let col = ((x * (width - 1) as f64).round() as usize).min(width - 1);
            let row = ((y * (height - 1) as f64).round() as usize).min(height - 1);
            (row, col)
        };

        let (row, col) = cell(self.center);
        grid[row][col] = '@';

        for marker in self.markers() {
            if !bounds.contains(marker.position) {
                continue;
            }
            let (row, col) = cell(marker.position);
            grid[row][col] = match grid[row][col] {
                '.' | '@' => char::from_digit(marker.label as u32, 10).unwrap_or('+'),
                _ => '#',
            };
        }

        let border = format!("+{}+", "-".repeat(width));
        let mut out = String::new();
        out.push_str(&border);
        out.push('\n');
        for row in grid {
            out.push('|');
            out.extend(row);
            out.push_str("|\n");
        }
        out.push_str(&border);
        out
    }

    /// Shown pins as a GeoJSON `FeatureCollection` (`[lon, lat]` order).
    pub fn geojson(&self) -> Value {
        let features: Vec<Value> = self
            .markers()
            .into_iter()
            .map(|m| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [m.position.lon, m.position.lat],
                    },
                    "properties": {
                        "label": m.label,
                        "id": m.donor.id,
                        "name": m.donor.name,
                        "bloodGroup": m.donor.blood_group,
                        "location": m.donor.location,
                        "available": m.donor.available,
                        "lastDonated": m.donor.last_donated,
                        "contactNumber": m.donor.contact_number,
                        "marker-color": m.color,
                    },
                })
            })
            .collect();
        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }
}
