//! Reference Trajectory Store
//!
//! Loads the recorder's CSV once per session into a two-level index:
//! trajectory identity first, then time code. A session resolves its
//! [`Trajectory`] up front, so the per-frame lookup only hashes a `Copy` key.
//!
//! Loading is lenient. A bad numeric cell is stored as absent and a row with
//! an unreadable timestamp is skipped. When two rows share a key the first
//! wins. Only an unreadable file or a header without the key columns fails
//! the load.

use super::key::{ReferenceKey, TimeCode, TrajectoryKey};
use super::row::ReferenceRow;
use crate::landmark::{LandmarkId, HAND_LANDMARK_COUNT, MAX_HANDS, POSE_LANDMARK_COUNT};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Which CSV columns carry the key fields
///
/// The recorder stores trajectory identity in its generic `m`, `n`, `x`
/// columns; the mapping says which one is which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub timestamp: String,
    pub fps: String,
    pub exercise: String,
    pub subject: String,
    pub intensity: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".to_string(),
            fps: "fps".to_string(),
            exercise: "n".to_string(),
            subject: "m".to_string(),
            intensity: "x".to_string(),
        }
    }
}

/// Coordinate axis of a landmark column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}

/// Column indices resolved from the header row
#[derive(Debug)]
struct ColumnLayout {
    timestamp: usize,
    exercise: usize,
    subject: usize,
    intensity: usize,
    fps: Option<usize>,
    cells: Vec<(usize, LandmarkId, Axis)>,
}

impl ColumnLayout {
    fn from_headers(headers: &csv::StringRecord, mapping: &ColumnMapping) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                Error::Reference(format!("reference table has no '{}' column", name))
            })
        };

        let timestamp = require(&mapping.timestamp)?;
        let exercise = require(&mapping.exercise)?;
        let subject = require(&mapping.subject)?;
        let intensity = require(&mapping.intensity)?;
        let fps = find(&mapping.fps);

        let cells: Vec<_> = headers
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| parse_landmark_column(name).map(|(id, axis)| (idx, id, axis)))
            .collect();

        let expected = (POSE_LANDMARK_COUNT + MAX_HANDS * HAND_LANDMARK_COUNT) * 3;
        if cells.len() < expected {
            debug!(
                "reference header has {} of {} landmark columns; the rest read as absent",
                cells.len(),
                expected
            );
        }

        Ok(Self {
            timestamp,
            exercise,
            subject,
            intensity,
            fps,
            cells,
        })
    }
}

/// Decode `pose_landmark_{i}_{axis}` and `hand_{h}_landmark_{i}_{axis}`
fn parse_landmark_column(name: &str) -> Option<(LandmarkId, Axis)> {
    let (stem, axis) = name.rsplit_once('_')?;
    let axis = match axis {
        "x" => Axis::X,
        "y" => Axis::Y,
        "z" => Axis::Z,
        _ => return None,
    };

    if let Some(index) = stem.strip_prefix("pose_landmark_") {
        let index: usize = index.parse().ok()?;
        if index >= POSE_LANDMARK_COUNT {
            return None;
        }
        return Some((LandmarkId::pose(index as u8), axis));
    }

    let rest = stem.strip_prefix("hand_")?;
    let (hand, index) = rest.split_once("_landmark_")?;
    let hand: usize = hand.parse().ok()?;
    let index: usize = index.parse().ok()?;
    if hand >= MAX_HANDS || index >= HAND_LANDMARK_COUNT {
        return None;
    }
    Some((LandmarkId::hand(hand as u8, index as u8), axis))
}

/// Outcome of reading one numeric cell
#[derive(Debug, PartialEq)]
enum CellValue {
    Empty,
    Value(f64),
    Malformed,
}

fn parse_cell(raw: &str) -> CellValue {
    let raw = raw.trim();
    if raw.is_empty() {
        return CellValue::Empty;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => CellValue::Value(v),
        _ => CellValue::Malformed,
    }
}

/// Load statistics, reported once after parsing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableStats {
    /// Rows indexed into the table
    pub rows_loaded: usize,
    /// Rows dropped because their key could not be read
    pub rows_skipped: usize,
    /// Numeric cells that failed to parse and were stored as absent
    pub malformed_cells: usize,
    /// Rows ignored because an earlier row had the same key
    pub duplicate_keys: usize,
    /// Distinct `fps` values reported by the recorder
    pub recorded_fps: Vec<f64>,
}

impl TableStats {
    fn note_fps(&mut self, fps: f64) {
        if !self.recorded_fps.iter().any(|f| (f - fps).abs() < 1e-6) {
            self.recorded_fps.push(fps);
        }
    }
}

/// All rows of one recorded trajectory, indexed by time code
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    rows: HashMap<TimeCode, ReferenceRow>,
}

impl Trajectory {
    #[inline]
    pub fn get(&self, time: TimeCode) -> Option<&ReferenceRow> {
        self.rows.get(&time)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows sorted by time code
    pub fn rows_in_order(&self) -> Vec<(TimeCode, &ReferenceRow)> {
        let mut rows: Vec<_> = self.rows.iter().map(|(t, r)| (*t, r)).collect();
        rows.sort_by_key(|(t, _)| *t);
        rows
    }

    /// First recorder fps value found in this trajectory
    pub fn recorded_fps(&self) -> Option<f64> {
        self.rows_in_order()
            .into_iter()
            .find_map(|(_, row)| row.recorded_fps)
    }

    /// Largest time bucket present
    pub fn max_time_bucket(&self) -> Option<u32> {
        self.rows.keys().map(|t| t.time_bucket).max()
    }
}

/// The loaded reference table
#[derive(Debug, Clone, Default)]
pub struct TrajectoryTable {
    trajectories: HashMap<TrajectoryKey, Trajectory>,
    stats: TableStats,
}

impl TrajectoryTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a CSV file
    pub fn load(path: &Path, mapping: &ColumnMapping) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Reference(format!("cannot open reference table {}: {}", path.display(), e))
        })?;
        let table = Self::from_reader(file, mapping)?;
        info!(
            "Loaded reference table {} ({} rows, {} trajectories)",
            path.display(),
            table.stats.rows_loaded,
            table.trajectory_count()
        );
        Ok(table)
    }

    /// Parse a table from any CSV byte stream
    pub fn from_reader<R: Read>(reader: R, mapping: &ColumnMapping) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        // An input without even a header row is an empty table, not an error
        let headers = rdr.headers()?.clone();
        if headers.is_empty() || (headers.len() == 1 && headers[0].trim().is_empty()) {
            warn!("Reference table is empty; running without reference");
            return Ok(Self::new());
        }
        let layout = ColumnLayout::from_headers(&headers, mapping)?;

        let mut table = Self::new();
        for (row_number, record) in rdr.records().enumerate() {
            let line = row_number + 2;
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping unreadable reference row at line {}: {}", line, e);
                    table.stats.rows_skipped += 1;
                    continue;
                }
            };
            table.ingest(&layout, &record, line);
        }

        if table.stats.malformed_cells > 0 {
            warn!(
                "Reference table had {} malformed cells; they are treated as absent",
                table.stats.malformed_cells
            );
        }
        if table.stats.duplicate_keys > 0 {
            warn!(
                "Reference table had {} duplicate keys; the first row of each was kept",
                table.stats.duplicate_keys
            );
        }
        if table.is_empty() {
            warn!("Reference table has no usable rows; running without reference");
        }

        Ok(table)
    }

    fn ingest(&mut self, layout: &ColumnLayout, record: &csv::StringRecord, line: usize) {
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

        let time: TimeCode = match field(layout.timestamp).parse() {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping reference row at line {}: {}", line, e);
                self.stats.rows_skipped += 1;
                return;
            }
        };
        let trajectory = TrajectoryKey::new(
            field(layout.exercise),
            field(layout.subject),
            field(layout.intensity),
        );

        let mut row = ReferenceRow::absent();
        row.recorded_fps = layout.fps.and_then(|idx| match parse_cell(field(idx)) {
            CellValue::Value(v) if v > 0.0 => Some(v),
            _ => None,
        });

        for &(idx, id, axis) in &layout.cells {
            let value = match parse_cell(field(idx)) {
                CellValue::Empty => continue,
                CellValue::Value(v) => v,
                CellValue::Malformed => {
                    debug!(
                        "Malformed cell '{}' at line {} ({}), stored as absent",
                        field(idx),
                        line,
                        id
                    );
                    self.stats.malformed_cells += 1;
                    continue;
                }
            };
            if let Some(cell) = row.cell_mut(id) {
                match axis {
                    Axis::X => cell.x = Some(value),
                    Axis::Y => cell.y = Some(value),
                    Axis::Z => cell.z = Some(value),
                }
            }
        }

        if !self.insert_row(trajectory, time, row) {
            warn!(
                "Duplicate reference key at line {} ({}); keeping the first row",
                line, time
            );
        }
    }

    fn insert_row(&mut self, trajectory: TrajectoryKey, time: TimeCode, row: ReferenceRow) -> bool {
        let rows = &mut self.trajectories.entry(trajectory).or_default().rows;
        if rows.contains_key(&time) {
            self.stats.duplicate_keys += 1;
            return false;
        }
        if let Some(fps) = row.recorded_fps {
            self.stats.note_fps(fps);
        }
        rows.insert(time, row);
        self.stats.rows_loaded += 1;
        true
    }

    /// Insert a row under a full key
    ///
    /// Returns `false` and keeps the existing row if the key is already taken.
    pub fn insert(&mut self, key: &ReferenceKey, row: ReferenceRow) -> bool {
        self.insert_row(key.trajectory(), key.time_code(), row)
    }

    /// Look up the row for a full key
    pub fn lookup(&self, key: &ReferenceKey) -> Option<&ReferenceRow> {
        let found = self
            .trajectories
            .get(&key.trajectory())
            .and_then(|t| t.get(key.time_code()));
        if found.is_none() {
            debug!("No reference row for {}", key);
        }
        found
    }

    /// Resolve one trajectory for repeated time-code lookups
    pub fn trajectory(&self, key: &TrajectoryKey) -> Option<&Trajectory> {
        self.trajectories.get(key)
    }

    /// Trajectory identities, sorted
    pub fn trajectory_keys(&self) -> Vec<&TrajectoryKey> {
        let mut keys: Vec<_> = self.trajectories.keys().collect();
        keys.sort();
        keys
    }

    pub fn trajectory_count(&self) -> usize {
        self.trajectories.len()
    }

    /// Total indexed rows
    pub fn len(&self) -> usize {
        self.stats.rows_loaded
    }

    pub fn is_empty(&self) -> bool {
        self.stats.rows_loaded == 0
    }

    pub fn stats(&self) -> &TableStats {
        &self.stats
    }
}

/// Column header the recorder writes, in its order
pub fn recorder_header(mapping: &ColumnMapping) -> Vec<String> {
    // The recorder writes its identity columns as m, n, x regardless of meaning
    let mut header = vec![mapping.timestamp.clone(), mapping.fps.clone()];
    let mut ids = [
        mapping.exercise.clone(),
        mapping.subject.clone(),
        mapping.intensity.clone(),
    ];
    ids.sort();
    header.extend(ids);

    for i in 0..POSE_LANDMARK_COUNT {
        for axis in ["x", "y", "z"] {
            header.push(format!("pose_landmark_{}_{}", i, axis));
        }
    }
    for h in 0..MAX_HANDS {
        for i in 0..HAND_LANDMARK_COUNT {
            for axis in ["x", "y", "z"] {
                header.push(format!("hand_{}_landmark_{}_{}", h, i, axis));
            }
        }
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::LandmarkPoint;
    use crate::reference::row::ReferenceCell;

    const SMALL_HEADER: &str = "timestamp,fps,m,n,x,pose_landmark_25_x,pose_landmark_25_y,pose_landmark_25_z,hand_1_landmark_4_x,hand_1_landmark_4_y";

    fn load(csv: &str) -> TrajectoryTable {
        TrajectoryTable::from_reader(csv.as_bytes(), &ColumnMapping::default()).unwrap()
    }

    #[test]
    fn test_parse_landmark_column() {
        assert_eq!(
            parse_landmark_column("pose_landmark_25_x"),
            Some((LandmarkId::pose(25), Axis::X))
        );
        assert_eq!(
            parse_landmark_column("hand_1_landmark_20_z"),
            Some((LandmarkId::hand(1, 20), Axis::Z))
        );
        assert_eq!(parse_landmark_column("pose_landmark_33_x"), None);
        assert_eq!(parse_landmark_column("hand_2_landmark_0_x"), None);
        assert_eq!(parse_landmark_column("hand_0_landmark_21_y"), None);
        assert_eq!(parse_landmark_column("pose_landmark_3_w"), None);
        assert_eq!(parse_landmark_column("timestamp"), None);
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(""), CellValue::Empty);
        assert_eq!(parse_cell("  "), CellValue::Empty);
        assert_eq!(parse_cell("0.5"), CellValue::Value(0.5));
        assert_eq!(parse_cell("abc"), CellValue::Malformed);
        assert_eq!(parse_cell("nan"), CellValue::Malformed);
        assert_eq!(parse_cell("inf"), CellValue::Malformed);
    }

    #[test]
    fn test_load_and_lookup() {
        let csv = format!(
            "{}\n2_3,28,2,knee,weeks,0.50,0.50,0.1,0.3,0.7\n",
            SMALL_HEADER
        );
        let table = load(&csv);
        assert_eq!(table.len(), 1);
        assert_eq!(table.stats().recorded_fps, vec![28.0]);

        let key = ReferenceKey::new("knee", "2", "weeks", 2, 3);
        let row = table.lookup(&key).expect("row present");
        assert_eq!(row.pose(25), Some(LandmarkPoint::new(0.5, 0.5, 0.1)));
        assert_eq!(row.hand(1, 4), Some(LandmarkPoint::planar(0.3, 0.7)));
        assert!(row.pose(0).is_none());
        assert_eq!(row.recorded_fps, Some(28.0));
    }

    #[test]
    fn test_float_timestamp_matches_integer_key() {
        let csv = format!("{}\n2.0_3,28,2,knee,weeks,0.5,0.5,,,\n", SMALL_HEADER);
        let table = load(&csv);
        assert!(table
            .lookup(&ReferenceKey::new("knee", "2", "weeks", 2, 3))
            .is_some());
    }

    #[test]
    fn test_malformed_cell_is_absent_not_zero() {
        let csv = format!("{}\n0_1,28,2,knee,weeks,oops,0.5,,0.3,0.7\n", SMALL_HEADER);
        let table = load(&csv);
        assert_eq!(table.len(), 1, "row must survive a bad cell");
        assert_eq!(table.stats().malformed_cells, 1);

        let row = table
            .lookup(&ReferenceKey::new("knee", "2", "weeks", 0, 1))
            .unwrap();
        assert_eq!(row.pose[25].x, None);
        assert_eq!(row.pose[25].y, Some(0.5));
        assert!(row.pose(25).is_none());
        // The rest of the row is untouched
        assert!(row.hand(1, 4).is_some());
    }

    #[test]
    fn test_empty_cells_are_not_malformed() {
        let csv = format!("{}\n0_1,28,2,knee,weeks,,,,,\n", SMALL_HEADER);
        let table = load(&csv);
        assert_eq!(table.stats().malformed_cells, 0);
        let row = table
            .lookup(&ReferenceKey::new("knee", "2", "weeks", 0, 1))
            .unwrap();
        assert_eq!(row.pose[25], ReferenceCell::ABSENT);
    }

    #[test]
    fn test_duplicate_key_keeps_first() {
        let csv = format!(
            "{h}\n1_1,28,2,knee,weeks,0.1,0.1,,,\n1_1,28,2,knee,weeks,0.9,0.9,,,\n1.0_1,28,2,knee,weeks,0.8,0.8,,,\n",
            h = SMALL_HEADER
        );
        let table = load(&csv);
        assert_eq!(table.len(), 1);
        assert_eq!(table.stats().duplicate_keys, 2);
        let row = table
            .lookup(&ReferenceKey::new("knee", "2", "weeks", 1, 1))
            .unwrap();
        assert_eq!(row.pose(25), Some(LandmarkPoint::planar(0.1, 0.1)));
    }

    #[test]
    fn test_duplicate_row_fps_not_recorded() {
        let csv = format!(
            "{h}\n1_1,28,2,knee,weeks,0.1,0.1,,,\n1_1,30,2,knee,weeks,0.9,0.9,,,\n",
            h = SMALL_HEADER
        );
        let table = load(&csv);
        assert_eq!(table.stats().duplicate_keys, 1);
        assert_eq!(table.stats().recorded_fps, vec![28.0]);
    }

    #[test]
    fn test_bad_timestamp_skips_row() {
        let csv = format!(
            "{h}\nlater,28,2,knee,weeks,0.1,0.1,,,\n0_0,28,2,knee,weeks,0.2,0.2,,,\n",
            h = SMALL_HEADER
        );
        let table = load(&csv);
        assert_eq!(table.len(), 1);
        assert_eq!(table.stats().rows_skipped, 1);
    }

    #[test]
    fn test_short_row_reads_missing_cells_as_absent() {
        let csv = format!("{}\n0_0,28,2,knee,weeks,0.2\n", SMALL_HEADER);
        let table = load(&csv);
        let row = table
            .lookup(&ReferenceKey::new("knee", "2", "weeks", 0, 0))
            .unwrap();
        assert_eq!(row.pose[25].x, Some(0.2));
        assert_eq!(row.pose[25].y, None);
    }

    #[test]
    fn test_missing_key_column_is_an_error() {
        let csv = "timestamp,fps,m,x\n0_0,28,2,weeks\n";
        let result = TrajectoryTable::from_reader(csv.as_bytes(), &ColumnMapping::default());
        assert!(matches!(result, Err(Error::Reference(_))));
    }

    #[test]
    fn test_empty_input_is_empty_table() {
        let table = TrajectoryTable::from_reader("".as_bytes(), &ColumnMapping::default()).unwrap();
        assert!(table.is_empty());

        let table = load(&format!("{}\n", SMALL_HEADER));
        assert!(table.is_empty());
        assert_eq!(table.trajectory_count(), 0);
    }

    #[test]
    fn test_lookup_miss_returns_none() {
        let csv = format!("{}\n2_3,28,2,knee,weeks,0.5,0.5,,,\n", SMALL_HEADER);
        let table = load(&csv);
        assert!(table
            .lookup(&ReferenceKey::new("knee", "2", "weeks", 2, 4))
            .is_none());
        assert!(table
            .lookup(&ReferenceKey::new("wrist", "2", "weeks", 2, 3))
            .is_none());
    }

    #[test]
    fn test_custom_column_mapping() {
        let mapping = ColumnMapping {
            exercise: "m".to_string(),
            subject: "n".to_string(),
            ..ColumnMapping::default()
        };
        let csv = format!("{}\n2_3,28,knee,leon,easy,0.5,0.5,,,\n", SMALL_HEADER);
        let table = TrajectoryTable::from_reader(csv.as_bytes(), &mapping).unwrap();
        assert!(table
            .lookup(&ReferenceKey::new("knee", "leon", "easy", 2, 3))
            .is_some());
    }

    #[test]
    fn test_trajectory_rows_in_order() {
        let csv = format!(
            "{h}\n1_0,28,2,knee,weeks,0.1,0.1,,,\n0_5,28,2,knee,weeks,0.2,0.2,,,\n0_1,28,2,knee,weeks,0.3,0.3,,,\n",
            h = SMALL_HEADER
        );
        let table = load(&csv);
        let trajectory = table
            .trajectory(&TrajectoryKey::new("knee", "2", "weeks"))
            .unwrap();
        let order: Vec<_> = trajectory.rows_in_order().iter().map(|(t, _)| *t).collect();
        assert_eq!(
            order,
            vec![TimeCode::new(0, 1), TimeCode::new(0, 5), TimeCode::new(1, 0)]
        );
        assert_eq!(trajectory.max_time_bucket(), Some(1));
        assert_eq!(trajectory.recorded_fps(), Some(28.0));
    }

    #[test]
    fn test_insert_and_lookup_roundtrip() {
        let mut table = TrajectoryTable::new();
        let keys: Vec<_> = (0..3)
            .flat_map(|t| (0..4).map(move |f| ReferenceKey::new("wrist", "leon", "easy", t, f)))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            let mut row = ReferenceRow::absent();
            row.pose[15] = ReferenceCell::planar(i as f64 / 100.0, 0.5);
            assert!(table.insert(key, row));
        }
        for (i, key) in keys.iter().enumerate() {
            let row = table.lookup(key).unwrap();
            assert_eq!(row.pose(15), Some(LandmarkPoint::planar(i as f64 / 100.0, 0.5)));
        }
        assert!(!table.insert(&keys[0], ReferenceRow::absent()));
    }

    #[test]
    fn test_recorder_header_is_loadable() {
        let mapping = ColumnMapping::default();
        let header = recorder_header(&mapping);
        assert_eq!(header.len(), 5 + 33 * 3 + 2 * 21 * 3);
        assert_eq!(&header[..5], &["timestamp", "fps", "m", "n", "x"]);

        let headers = csv::StringRecord::from(header);
        let layout = ColumnLayout::from_headers(&headers, &mapping).unwrap();
        assert_eq!(layout.cells.len(), 33 * 3 + 2 * 21 * 3);
    }
}
