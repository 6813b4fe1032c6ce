//! Markers placed on an image for a counter, and their two encodings.
//!
//! On disk a counter's markers are a blob of packed little-endian `f32`
//! pairs, one `(x, y)` pair per marker. In spreadsheets the same positions
//! are written as `x,y` pairs with six decimals, separated by `|`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Separates the x and y coordinates of a position in spreadsheet form.
pub const MARKER_COORDINATE_SEPARATOR: char = ',';

/// Separates positions in spreadsheet form.
pub const MARKER_POSITION_SEPARATOR: char = '|';

const BYTES_PER_POSITION: usize = 2 * std::mem::size_of::<f32>();

/// A location on the image canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Creates a point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One marker on a file, belonging to a counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Data label of the counter this marker counts towards.
    pub data_label: String,
    /// Draw the marker with visual emphasis.
    pub emphasize: bool,
    /// Draw the marker highlighted.
    pub highlight: bool,
    /// The label has already been shown next to the marker.
    pub label_shown_previously: bool,
    /// Normalized position on [0, 1] × [0, 1].
    pub position: Point,
    /// Show the counter's label next to the marker.
    pub show_label: bool,
    /// Tooltip text, typically the counter's label.
    pub tooltip: Option<String>,
}

impl Marker {
    /// Creates a marker at a normalized position.
    pub fn new(data_label: impl Into<String>, position: Point) -> Self {
        Self {
            data_label: data_label.into(),
            emphasize: false,
            highlight: false,
            label_shown_previously: true,
            position,
            show_label: false,
            tooltip: None,
        }
    }

    /// Converts a canvas point to a size invariant ratio.
    pub fn convert_point_to_ratio(point: Point, width: f64, height: f64) -> Point {
        Point::new(point.x / width, point.y / height)
    }

    /// Converts a ratio back to a point on a canvas of the given size.
    pub fn convert_ratio_to_point(ratio: Point, width: f64, height: f64) -> Point {
        Point::new(ratio.x * width, ratio.y * height)
    }

    fn spreadsheet_position(&self) -> String {
        format_position(self.position.x as f32, self.position.y as f32)
    }
}

/// The markers of one counter on one file.
///
/// # Examples
///
/// ```
/// use carnassial_core::{Marker, MarkersForCounter, Point};
///
/// let mut markers = MarkersForCounter::new("Deer", 0);
/// markers.add_marker(Marker::new("Deer", Point::new(0.5, 0.5)));
/// assert_eq!(markers.count(), 1);
/// assert_eq!(markers.to_spreadsheet_string().as_deref(), Some("0.500000,0.500000"));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkersForCounter {
    count: i32,
    data_label: String,
    markers: Vec<Marker>,
}

impl MarkersForCounter {
    /// Creates an empty marker set for a counter currently holding `count`.
    pub fn new(data_label: impl Into<String>, count: i32) -> Self {
        Self {
            count,
            data_label: data_label.into(),
            markers: Vec::new(),
        }
    }

    /// Creates a marker set from a stored position blob.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMarkerBlob`] if the blob is not a whole
    /// number of positions.
    pub fn from_packed_floats(data_label: impl Into<String>, count: i32, packed: &[u8]) -> Result<Self> {
        let mut markers = Self::new(data_label, count);
        for (x, y) in unpack_positions(packed)? {
            let marker = Marker::new(markers.data_label.clone(), Point::new(f64::from(x), f64::from(y)));
            markers.markers.push(marker);
        }
        Ok(markers)
    }

    /// Value of the counter.
    pub fn count(&self) -> i32 {
        self.count
    }

    /// Data label of the counter.
    pub fn data_label(&self) -> &str {
        &self.data_label
    }

    /// Markers in placement order.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Adds a marker and increments the count.
    pub fn add_marker(&mut self, marker: Marker) {
        debug_assert_eq!(marker.data_label, self.data_label, "marker belongs to a different counter");
        self.count += 1;
        self.markers.push(marker);
    }

    /// Removes the marker at the same position as `marker` and decrements the
    /// count. Returns `false` if no marker is at that position.
    pub fn remove_marker(&mut self, marker: &Marker) -> bool {
        match self.markers.iter().position(|candidate| candidate.position == marker.position) {
            Some(index) => {
                self.markers.remove(index);
                self.count -= 1;
                true
            }
            None => false,
        }
    }

    /// Encodes marker positions as the stored blob.
    pub fn to_packed_floats(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(self.markers.len() * BYTES_PER_POSITION);
        for marker in &self.markers {
            packed.extend_from_slice(&(marker.position.x as f32).to_le_bytes());
            packed.extend_from_slice(&(marker.position.y as f32).to_le_bytes());
        }
        packed
    }

    /// Encodes marker positions for a spreadsheet, or `None` if there are no
    /// markers.
    pub fn to_spreadsheet_string(&self) -> Option<String> {
        if self.markers.is_empty() {
            return None;
        }
        let positions: Vec<String> = self.markers.iter().map(Marker::spreadsheet_position).collect();
        Some(positions.join(&MARKER_POSITION_SEPARATOR.to_string()))
    }
}

fn format_position(x: f32, y: f32) -> String {
    format!("{x:.6}{MARKER_COORDINATE_SEPARATOR}{y:.6}")
}

fn unpack_positions(packed: &[u8]) -> Result<Vec<(f32, f32)>> {
    if packed.len() % BYTES_PER_POSITION != 0 {
        return Err(CoreError::InvalidMarkerBlob(packed.len()));
    }
    Ok(packed
        .chunks_exact(BYTES_PER_POSITION)
        .map(|chunk| {
            let x = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let y = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            (x, y)
        })
        .collect())
}

/// Converts a stored blob directly to spreadsheet form.
///
/// Returns `Ok(None)` for an empty blob.
pub fn packed_floats_to_spreadsheet_string(packed: &[u8]) -> Result<Option<String>> {
    let positions = unpack_positions(packed)?;
    if positions.is_empty() {
        return Ok(None);
    }
    let formatted: Vec<String> = positions.into_iter().map(|(x, y)| format_position(x, y)).collect();
    Ok(Some(formatted.join(&MARKER_POSITION_SEPARATOR.to_string())))
}

/// Parses spreadsheet marker positions into the stored blob.
///
/// An empty string has no positions and yields an empty blob.
///
/// # Examples
///
/// ```
/// use carnassial_core::marker::spreadsheet_string_to_packed_floats;
///
/// let packed = spreadsheet_string_to_packed_floats("0.250000,0.500000|0.750000,0.100000").unwrap();
/// assert_eq!(packed.len(), 16);
/// assert!(spreadsheet_string_to_packed_floats("0.5").is_err());
/// assert!(spreadsheet_string_to_packed_floats("").unwrap().is_empty());
/// ```
pub fn spreadsheet_string_to_packed_floats(value: &str) -> Result<Vec<u8>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let invalid = || CoreError::InvalidMarkerPositions(value.to_string());
    let mut packed = Vec::new();
    for position in value.split(MARKER_POSITION_SEPARATOR) {
        let (x, y) = position.split_once(MARKER_COORDINATE_SEPARATOR).ok_or_else(invalid)?;
        let x: f32 = x.trim().parse().map_err(|_| invalid())?;
        let y: f32 = y.trim().parse().map_err(|_| invalid())?;
        packed.extend_from_slice(&x.to_le_bytes());
        packed.extend_from_slice(&y.to_le_bytes());
    }
    Ok(packed)
}
