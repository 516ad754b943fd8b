//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude)
//! and Web Mercator tile coordinates, and enumerates the tile rectangle a
//! bounding box covers at a given zoom level.

mod types;

pub use types::{
    BoundingBox, CoordError, TileCoord, TileRange, MAX_LAT, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM,
};

use std::f64::consts::PI;

/// Converts geographic coordinates to a tile address.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 21)
#[inline]
pub fn to_tile_coord(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=180.0).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(i32::from(zoom));

    let x = ((lon + 180.0) / 360.0 * n) as u32;

    let lat_rad = lat * PI / 180.0;
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u32;

    // The outer edge of the map lands exactly on tile count n; clamp back in.
    let max_index = (n as u32).saturating_sub(1);
    Ok(TileCoord {
        x: x.min(max_index),
        y: y.min(max_index),
        zoom,
    })
}

/// Converts a tile address back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    let n = 2.0_f64.powi(i32::from(tile.zoom));

    let lon = f64::from(tile.x) / n * 360.0 - 180.0;

    let y = f64::from(tile.y) / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}

/// Computes the inclusive tile rectangle a bounding box covers at one zoom.
///
/// The corners are normalized so a box given with swapped edges still yields
/// an ordered range.
pub fn tile_range(zoom: u8, bbox: &BoundingBox) -> Result<TileRange, CoordError> {
    let top_left = to_tile_coord(bbox.top_left_lat, bbox.top_left_lon, zoom)?;
    let bottom_right = to_tile_coord(bbox.bottom_right_lat, bbox.bottom_right_lon, zoom)?;

    Ok(TileRange {
        x0: top_left.x.min(bottom_right.x),
        x1: top_left.x.max(bottom_right.x),
        y0: top_left.y.min(bottom_right.y),
        y1: top_left.y.max(bottom_right.y),
        zoom,
    })
}

/// Total number of tiles a bounding box covers across a zoom range.
pub fn planned_tile_count(
    min_zoom: u8,
    max_zoom: u8,
    bbox: &BoundingBox,
) -> Result<u64, CoordError> {
    let mut total = 0;
    for zoom in min_zoom..=max_zoom {
        total += tile_range(zoom, bbox)?.count();
    }
    Ok(total)
}
