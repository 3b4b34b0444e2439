//! Wire types mirrored from the donor directory API.
//!
//! Field names follow the API's camelCase JSON. Nothing here owns durable
//! state; these are the shapes the server sends and accepts.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the eight ABO/Rh blood group codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        Self::APos,
        Self::ANeg,
        Self::BPos,
        Self::BNeg,
        Self::AbPos,
        Self::AbNeg,
        Self::OPos,
        Self::ONeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::APos => "A+",
            Self::ANeg => "A-",
            Self::BPos => "B+",
            Self::BNeg => "B-",
            Self::AbPos => "AB+",
            Self::AbNeg => "AB-",
            Self::OPos => "O+",
            Self::ONeg => "O-",
        }
    }

    /// Marker/badge colour used by the card and map views.
    pub fn color(&self) -> &'static str {
        match self {
            Self::APos => "#d32f2f",
            Self::ANeg => "#c62828",
            Self::BPos => "#1976d2",
            Self::BNeg => "#0d47a1",
            Self::AbPos => "#7b1fa2",
            Self::AbNeg => "#4a148c",
            Self::OPos => "#2e7d32",
            Self::ONeg => "#1b5e20",
        }
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBloodGroup(pub String);

impl fmt::Display for UnknownBloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown blood group '{}', expected one of A+ A- B+ B- AB+ AB- O+ O-",
            self.0
        )
    }
}

impl std::error::Error for UnknownBloodGroup {}

impl FromStr for BloodGroup {
    type Err = UnknownBloodGroup;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|group| group.as_str() == upper)
            .ok_or_else(|| UnknownBloodGroup(s.to_string()))
    }
}

/// Latitude/longitude pair, carried as `[lat, lon]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lat, c.lon]
    }
}

impl FromStr for Coordinates {
    type Err = String;

    /// Parse "lat,lon".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| format!("expected LAT,LON, got '{}'", s))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| format!("invalid longitude '{}'", lon.trim()))?;
        let coords = Self::new(lat, lon);
        if coords.is_valid() {
            Ok(coords)
        } else {
            Err(format!("coordinates out of range: {},{}", lat, lon))
        }
    }
}

/// Donor attributes embedded in a user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorProfile {
    pub blood_group: BloodGroup,
    #[serde(default)]
    pub last_donation_date: Option<NaiveDate>,
    #[serde(default)]
    pub available_for_donation: bool,
    #[serde(default)]
    pub consent_to_contact: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub city: String,
    #[serde(default)]
    pub is_donor: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor: Option<DonorProfile>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Merge a partial update into this cached copy.
    ///
    /// Donor fields only land when the user already has a donor profile or
    /// the update opts in with a blood group. Coordinates move as a pair.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(v) = &update.first_name {
            self.first_name = v.clone();
        }
        if let Some(v) = &update.last_name {
            self.last_name = v.clone();
        }
        if let Some(v) = &update.phone_number {
            self.phone_number = v.clone();
        }
        if let Some(v) = &update.city {
            self.city = v.clone();
        }
        if let Some(is_donor) = update.is_donor {
            self.is_donor = is_donor;
        }

        if self.donor.is_none() && update.is_donor == Some(true) {
            if let Some(group) = update.blood_group {
                self.donor = Some(DonorProfile {
                    blood_group: group,
                    last_donation_date: None,
                    available_for_donation: false,
                    consent_to_contact: false,
                    latitude: None,
                    longitude: None,
                });
            }
        }

        if let Some(donor) = self.donor.as_mut() {
            if let Some(group) = update.blood_group {
                donor.blood_group = group;
            }
            if let Some(date) = update.last_donation_date {
                donor.last_donation_date = Some(date);
            }
            if let Some(v) = update.available_for_donation {
                donor.available_for_donation = v;
            }
            if let Some(v) = update.consent_to_contact {
                donor.consent_to_contact = v;
            }
            if let (Some(lat), Some(lon)) = (update.latitude, update.longitude) {
                donor.latitude = Some(lat);
                donor.longitude = Some(lon);
            }
        }
    }
}

/// Entry returned by the donor listing and donor detail endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub blood_group: BloodGroup,
    pub location: String,
    #[serde(default)]
    pub last_donated: Option<NaiveDate>,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl DonorRecord {
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }

    /// Whole days between the last donation and `today`, if known.
    pub fn days_since_donation(&self, today: NaiveDate) -> Option<i64> {
        self.last_donated
            .map(|date| today.signed_duration_since(date).num_days())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body for `POST /register`. Donor keys are absent unless `is_donor`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
    pub city: String,
    pub is_donor: bool,
    #[serde(flatten)]
    pub donor: Option<DonorDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorDetails {
    pub blood_group: BloodGroup,
    pub last_donation_date: Option<NaiveDate>,
    pub available_for_donation: bool,
    pub consent_to_contact: bool,
}

/// Partial body for `PUT /update-profile`; unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_donor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<BloodGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_donation_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_for_donation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_to_contact: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Optional listing filters. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DonorFilters {
    pub blood_group: Option<BloodGroup>,
    pub location: Option<String>,
}

impl DonorFilters {
    pub fn new(blood_group: Option<BloodGroup>, location: Option<&str>) -> Self {
        Self {
            blood_group,
            location: location
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blood_group.is_none() && self.location.is_none()
    }

    /// Query parameters sent to `GET /donors`.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(group) = self.blood_group {
            pairs.push(("bloodGroup", group.as_str().to_string()));
        }
        if let Some(location) = &self.location {
            pairs.push(("city", location.clone()));
        }
        pairs
    }

    pub fn matches(&self, record: &DonorRecord) -> bool {
        if let Some(group) = self.blood_group {
            if record.blood_group != group {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if !record
                .location
                .to_lowercase()
                .contains(&location.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// `{"message": "..."}` bodies the server uses for both success and errors.
#[derive(Debug, Deserialize)]
pub(crate) struct MessageBody {
    pub message: Option<String>,
}
