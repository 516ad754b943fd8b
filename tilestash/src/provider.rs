//! Map tile provider catalog.
//!
//! Providers are persisted as stable integer ids in the `type` columns and
//! shown as short strings at the API surface. The catalog also carries the
//! per-provider zoom limits, the average-tile-size baselines used for size
//! estimates before a set is fully downloaded, and the canonical tile hash
//! every cache lookup is keyed by.

use std::fmt;
use std::str::FromStr;

/// Average tile size assumed when a provider has no recorded baseline.
pub const DEFAULT_AVERAGE_TILE_SIZE: u64 = 13_652;

/// A map tile source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileProvider {
    /// OpenStreetMap raster tiles
    #[default]
    OpenStreetMap,
    /// Bing Maps road layer
    BingRoad,
    /// Bing Maps satellite imagery
    BingSatellite,
    /// Google Maps street layer
    GoogleStreet,
    /// Google Maps satellite imagery
    GoogleSatellite,
    /// Esri World Imagery basemap
    EsriWorldImagery,
}

impl TileProvider {
    /// Every provider in the catalog.
    pub const ALL: [TileProvider; 6] = [
        TileProvider::OpenStreetMap,
        TileProvider::BingRoad,
        TileProvider::BingSatellite,
        TileProvider::GoogleStreet,
        TileProvider::GoogleSatellite,
        TileProvider::EsriWorldImagery,
    ];

    /// Stable integer id used in the `type` columns.
    pub fn id(&self) -> i64 {
        match self {
            TileProvider::OpenStreetMap => 1,
            TileProvider::BingRoad => 2,
            TileProvider::BingSatellite => 3,
            TileProvider::GoogleStreet => 4,
            TileProvider::GoogleSatellite => 5,
            TileProvider::EsriWorldImagery => 6,
        }
    }

    /// Resolve a persisted id back to a provider.
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.id() == id)
    }

    /// Human-readable name, stored in `TileSets.typeStr` for display.
    pub fn name(&self) -> &'static str {
        match self {
            TileProvider::OpenStreetMap => "OpenStreetMap",
            TileProvider::BingRoad => "Bing Road",
            TileProvider::BingSatellite => "Bing Satellite",
            TileProvider::GoogleStreet => "Google Street",
            TileProvider::GoogleSatellite => "Google Satellite",
            TileProvider::EsriWorldImagery => "Esri World Imagery",
        }
    }

    /// Short identifier used at the API surface and on the command line.
    pub fn short_name(&self) -> &'static str {
        match self {
            TileProvider::OpenStreetMap => "osm",
            TileProvider::BingRoad => "bing-road",
            TileProvider::BingSatellite => "bing-sat",
            TileProvider::GoogleStreet => "google-street",
            TileProvider::GoogleSatellite => "google-sat",
            TileProvider::EsriWorldImagery => "esri",
        }
    }

    /// Minimum zoom level the provider serves.
    pub fn min_zoom(&self) -> u8 {
        match self {
            TileProvider::BingRoad | TileProvider::BingSatellite => 1,
            _ => 0,
        }
    }

    /// Maximum zoom level the provider serves.
    pub fn max_zoom(&self) -> u8 {
        match self {
            TileProvider::OpenStreetMap => 19,
            TileProvider::BingRoad | TileProvider::BingSatellite => 20,
            TileProvider::GoogleStreet | TileProvider::GoogleSatellite => 21,
            TileProvider::EsriWorldImagery => 19,
        }
    }

    /// Observed average tile size in bytes, used to estimate the size of a
    /// set before enough of it has been downloaded to measure.
    pub fn average_tile_size(&self) -> u64 {
        match self {
            TileProvider::OpenStreetMap => 11_169,
            TileProvider::BingRoad => 1_297,
            TileProvider::BingSatellite => 19_597,
            TileProvider::GoogleStreet => 4_913,
            TileProvider::GoogleSatellite => 56_887,
            TileProvider::EsriWorldImagery => 33_842,
        }
    }

    /// Canonical cache hash for a tile of this provider.
    ///
    /// The hash is the zero-padded concatenation of the provider id and the
    /// tile address, so it is unique across providers and stable across runs.
    pub fn tile_hash(&self, x: u32, y: u32, zoom: u8) -> String {
        format!("{:010}{:08}{:08}{:03}", self.id(), x, y, zoom)
    }
}

impl fmt::Display for TileProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error parsing a provider short name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown tile provider: {}", self.0)
    }
}

impl std::error::Error for UnknownProvider {}

impl FromStr for TileProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.short_name() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}
