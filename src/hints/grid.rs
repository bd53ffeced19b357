//! Grid cells and planar distance

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metres per degree of latitude on a spherical Earth (R = 6,371 km)
const METERS_PER_DEGREE: f64 = 111_194.93;

/// Round to 3 decimal places (~111 m), normalising negative zero
pub fn round3(value: f64) -> f64 {
    let r = (value * 1000.0).round() / 1000.0;
    if r == 0.0 { 0.0 } else { r }
}

/// A ~111 m cell: latitude/longitude rounded to 3 decimals.
///
/// Stored as integer thousandths so equality and hashing are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GridKey {
    lat_milli: i32,
    lon_milli: i32,
}

impl GridKey {
    pub fn from_coords(lat: f64, lon: f64) -> Self {
        Self {
            lat_milli: (lat * 1000.0).round() as i32,
            lon_milli: (lon * 1000.0).round() as i32,
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat_milli as f64 / 1000.0
    }

    pub fn lon(&self) -> f64 {
        self.lon_milli as f64 / 1000.0
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3},{:.3}", round3(self.lat()), round3(self.lon()))
    }
}

impl FromStr for GridKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| format!("grid key '{}' is not 'lat,lon'", s))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|e| format!("bad latitude in '{}': {}", s, e))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|e| format!("bad longitude in '{}': {}", s, e))?;
        Ok(Self::from_coords(lat, lon))
    }
}

impl TryFrom<String> for GridKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GridKey> for String {
    fn from(key: GridKey) -> Self {
        key.to_string()
    }
}

/// Equirectangular distance in metres.
///
/// Longitude is scaled by `cos(lat)` at the first point; adequate at the
/// tens-of-kilometres scale hints are shared over.
pub fn planar_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dy = lat2 - lat1;
    let dx = (lon2 - lon1) * (lat1 * std::f64::consts::PI / 180.0).cos();
    (dx * dx + dy * dy).sqrt() * METERS_PER_DEGREE
}
