//! Point file loading for the bench binary.
//!
//! Two text layouts are accepted: comma-separated (`.csv`) and
//! whitespace-separated (`.xyz`, `.txt` and anything else). The first
//! three numeric fields of each row are taken as `x, y, z`; rows that do
//! not start with three numbers (headers, comments) are skipped.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use pylon_pipeline::{Point3, PointCloud};

/// A loaded cloud plus the number of rows that were not points.
pub struct Loaded {
    pub cloud: PointCloud,
    pub skipped_rows: usize,
}

/// Field separator implied by a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Comma,
    Whitespace,
}

impl Layout {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Comma,
            _ => Self::Whitespace,
        }
    }
}

/// Read the point file at `path`.
pub fn load(path: &Path) -> Result<Loaded, csv::Error> {
    let file = std::fs::File::open(path)?;
    read(file, Layout::from_path(path))
}

/// Read points from any byte stream.
pub fn read<R: Read>(source: R, layout: Layout) -> Result<Loaded, csv::Error> {
    let delimiter = match layout {
        Layout::Comma => b',',
        Layout::Whitespace => b' ',
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .delimiter(delimiter)
        .from_reader(source);

    let mut points = Vec::new();
    let mut skipped_rows = 0;
    for record in reader.records() {
        match parse_xyz(&record?) {
            Some(p) => points.push(p),
            None => skipped_rows += 1,
        }
    }
    log::debug!("read {} points, skipped {skipped_rows} rows", points.len());

    Ok(Loaded {
        cloud: PointCloud::new(points),
        skipped_rows,
    })
}

/// First three fields as coordinates, or `None` if any is not a number.
///
/// Fields are further split on whitespace so runs of spaces and tabs in
/// whitespace-separated files collapse.
fn parse_xyz(record: &StringRecord) -> Option<Point3> {
    let mut fields = record.iter().flat_map(str::split_whitespace);
    let x = fields.next()?.parse().ok()?;
    let y = fields.next()?.parse().ok()?;
    let z = fields.next()?.parse().ok()?;
    Some(Point3::new(x, y, z))
}
