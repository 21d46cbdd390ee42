//! Overlap raster: how many walks disturb each location.
//!
//! Builds a regular grid over the extent of the per-walk buffers and counts,
//! per cell, the walk buffers that contain the cell centre. Cells no buffer
//! covers hold `None` (no data) rather than 0, so summaries only ever see
//! disturbed habitat.
//!
//! - Extent: bounding box of all buffers, snapped outward to whole cells
//! - Row 0 is the northern edge, column 0 the western edge
//! - Coverage: scanline fill at each row's centre line, even-odd over the
//!   buffer's rings

use std::collections::BTreeMap;

use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point};
use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::{Bounds, PlanarPoint, Result, WalkBuffer, WalkError};

/// Refuse grids larger than this many cells.
const MAX_CELLS: usize = 1 << 26;

/// Per-cell walk overlap counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapRaster {
    /// Western edge of the grid
    pub origin_x: f64,
    /// Northern edge of the grid
    pub origin_y: f64,
    /// Cell edge length in metres
    pub cell_size: f64,
    pub rows: usize,
    pub cols: usize,
    /// Number of walk buffers rasterized
    pub walk_count: usize,
    /// Row-major; `None` where no walk buffer covers the cell
    cells: Vec<Option<u32>>,
}

impl OverlapRaster {
    fn empty(cell_size: f64, walk_count: usize) -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_size,
            rows: 0,
            cols: 0,
            walk_count,
            cells: vec![],
        }
    }

    /// Rasterize per-walk buffers at `cell_size` metres.
    ///
    /// # Example
    /// ```
    /// use walk_disturbance::{buffer_polyline, OverlapRaster, PlanarPoint, WalkBuffer};
    ///
    /// let line = |y: f64| vec![PlanarPoint::new(0.0, y), PlanarPoint::new(50.0, y)];
    /// let buffers = vec![
    ///     WalkBuffer { walk_id: 1, polygon: buffer_polyline(&line(0.0), 8.5, 8), degenerate: false },
    ///     WalkBuffer { walk_id: 2, polygon: buffer_polyline(&line(10.0), 8.5, 8), degenerate: false },
    /// ];
    ///
    /// let raster = OverlapRaster::from_buffers(&buffers, 1.0).unwrap();
    /// let by_count = raster.area_by_count();
    /// assert!(by_count[&1] > 0.0);
    /// assert!(by_count[&2] > 0.0);
    /// assert!(raster.covered_area() <= raster.extent_area());
    /// ```
    pub fn from_buffers(buffers: &[WalkBuffer], cell_size: f64) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(WalkError::InvalidParameter {
                name: "cell_size",
                reason: format!("must be a positive length, got {cell_size}"),
            });
        }

        let extent = buffers
            .iter()
            .filter_map(|b| b.polygon.bounding_rect())
            .map(Bounds::from)
            .reduce(|a, b| a.union(&b));

        let Some(extent) = extent else {
            return Ok(Self::empty(cell_size, buffers.len()));
        };

        let grid = extent.snapped(cell_size);
        let cols = ((grid.width() / cell_size).round() as usize).max(1);
        let rows = ((grid.height() / cell_size).round() as usize).max(1);

        if rows.saturating_mul(cols) > MAX_CELLS {
            return Err(WalkError::InvalidParameter {
                name: "cell_size",
                reason: format!("{rows} x {cols} cells is too many; use larger cells"),
            });
        }

        let mut raster = Self {
            origin_x: grid.min_x,
            origin_y: grid.max_y,
            cell_size,
            rows,
            cols,
            walk_count: buffers.len(),
            cells: vec![],
        };

        let mut cells = vec![None; rows * cols];
        for buffer in buffers {
            let filled = raster.scan_fill(&buffer.polygon, &mut cells);
            debug!("Walk {}: {} cells covered", buffer.walk_id, filled);
        }
        raster.cells = cells;

        info!(
            "Overlap raster {} x {} at {} m, max overlap {}",
            rows,
            cols,
            cell_size,
            raster.max_count().unwrap_or(0)
        );
        Ok(raster)
    }

    /// Add one to every cell whose centre lies inside `polygon`. Returns the
    /// number of cells touched.
    fn scan_fill(&self, polygon: &MultiPolygon<f64>, cells: &mut [Option<u32>]) -> usize {
        let Some(rect) = polygon.bounding_rect() else {
            return 0;
        };

        let edges: Vec<(Coord<f64>, Coord<f64>)> = polygon
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .flat_map(|ring| ring.lines().map(|l| (l.start, l.end)))
            .collect();

        let cs = self.cell_size;
        let first_row = ((self.origin_y - rect.max().y) / cs - 0.5).ceil().max(0.0) as usize;
        let last_row = ((self.origin_y - rect.min().y) / cs - 0.5).floor();
        if last_row < 0.0 {
            return 0;
        }
        let last_row = (last_row as usize).min(self.rows - 1);

        let mut filled = 0;
        let mut crossings: Vec<f64> = Vec::new();
        for row in first_row..=last_row {
            let y = self.origin_y - (row as f64 + 0.5) * cs;

            crossings.clear();
            for (a, b) in &edges {
                if (a.y <= y) != (b.y <= y) {
                    crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));

            for span in crossings.chunks_exact(2) {
                let start = self.first_col_at_or_after(span[0]);
                let end = self.first_col_at_or_after(span[1]);
                for cell in &mut cells[row * self.cols + start..row * self.cols + end] {
                    *cell = Some(cell.map_or(1, |c| c + 1));
                }
                filled += end - start;
            }
        }
        filled
    }

    /// First column whose centre is at or east of `x`, clamped to the grid.
    fn first_col_at_or_after(&self, x: f64) -> usize {
        let col = ((x - self.origin_x) / self.cell_size - 0.5).ceil();
        col.clamp(0.0, self.cols as f64) as usize
    }

    pub fn cell_area(&self) -> f64 {
        self.cell_size * self.cell_size
    }

    /// Overlap count at (row, col); `None` for no data or outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<u32> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells[row * self.cols + col]
    }

    /// Overlap count of the cell containing a planar point.
    pub fn value_at(&self, point: PlanarPoint) -> Option<u32> {
        let col = ((point.x - self.origin_x) / self.cell_size).floor();
        let row = ((self.origin_y - point.y) / self.cell_size).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        self.get(row as usize, col as usize)
    }

    pub fn cell_center(&self, row: usize, col: usize) -> PlanarPoint {
        PlanarPoint::new(
            self.origin_x + (col as f64 + 0.5) * self.cell_size,
            self.origin_y - (row as f64 + 0.5) * self.cell_size,
        )
    }

    /// Every cell as (row, col, count), row-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, Option<u32>)> + '_ {
        let cols = self.cols.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, value)| (i / cols, i % cols, *value))
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min_x: self.origin_x,
            max_x: self.origin_x + self.cols as f64 * self.cell_size,
            min_y: self.origin_y - self.rows as f64 * self.cell_size,
            max_y: self.origin_y,
        }
    }

    pub fn max_count(&self) -> Option<u32> {
        self.cells.iter().flatten().copied().max()
    }

    /// Area (m²) disturbed by exactly N walks, for every N present.
    /// No-data cells are excluded.
    pub fn area_by_count(&self) -> BTreeMap<u32, f64> {
        let cell_area = self.cell_area();
        let mut areas = BTreeMap::new();
        for count in self.cells.iter().flatten() {
            *areas.entry(*count).or_insert(0.0) += cell_area;
        }
        areas
    }

    /// Area (m²) disturbed by at least one walk.
    pub fn covered_area(&self) -> f64 {
        self.cells.iter().flatten().count() as f64 * self.cell_area()
    }

    /// Area (m²) of the whole grid, no-data cells included.
    pub fn extent_area(&self) -> f64 {
        self.bounds().area()
    }
}

// ============================================================================
// Point queries
// ============================================================================

/// Bounding box of one walk buffer (for R-tree indexing).
#[derive(Debug, Clone)]
struct BufferEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for BufferEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over walk buffers, answering "which walks disturb this spot".
pub struct BufferIndex<'a> {
    buffers: &'a [WalkBuffer],
    tree: RTree<BufferEnvelope>,
}

impl<'a> BufferIndex<'a> {
    pub fn new(buffers: &'a [WalkBuffer]) -> Self {
        let envelopes: Vec<BufferEnvelope> = buffers
            .iter()
            .enumerate()
            .filter_map(|(index, b)| {
                let rect = b.polygon.bounding_rect()?;
                Some(BufferEnvelope {
                    index,
                    envelope: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self { buffers, tree: RTree::bulk_load(envelopes) }
    }

    /// Ids of the walks whose buffer contains `point`, ascending.
    pub fn walks_at(&self, point: PlanarPoint) -> Vec<u32> {
        let location = Point::from(point);
        let mut ids: Vec<u32> = self
            .tree
            .locate_in_envelope_intersecting(&AABB::from_point([point.x, point.y]))
            .map(|e| &self.buffers[e.index])
            .filter(|b| b.polygon.contains(&location))
            .map(|b| b.walk_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_polyline;
    use geo::{Area, LineString, Polygon, Rect};

    fn rect_buffer(walk_id: u32, min: (f64, f64), max: (f64, f64)) -> WalkBuffer {
        WalkBuffer {
            walk_id,
            polygon: MultiPolygon::new(vec![Rect::new(min, max).to_polygon()]),
            degenerate: false,
        }
    }

    #[test]
    fn test_empty_raster() {
        let raster = OverlapRaster::from_buffers(&[], 1.0).unwrap();
        assert_eq!(raster.rows, 0);
        assert_eq!(raster.cols, 0);
        assert!(raster.area_by_count().is_empty());
        assert_eq!(raster.max_count(), None);
        assert_eq!(raster.cells().count(), 0);
    }

    #[test]
    fn test_invalid_cell_size() {
        let buffers = vec![rect_buffer(1, (0.0, 0.0), (10.0, 5.0))];
        assert!(OverlapRaster::from_buffers(&buffers, 0.0).is_err());
        assert!(OverlapRaster::from_buffers(&buffers, f64::NAN).is_err());
    }

    #[test]
    fn test_oversized_grid_is_refused() {
        let buffers = vec![rect_buffer(1, (0.0, 0.0), (100_000.0, 100_000.0))];
        assert!(matches!(
            OverlapRaster::from_buffers(&buffers, 1.0),
            Err(WalkError::InvalidParameter { name: "cell_size", .. })
        ));

        let raster = OverlapRaster::from_buffers(&buffers, 50.0).unwrap();
        assert_eq!((raster.rows, raster.cols), (2000, 2000));
        assert_eq!(raster.covered_area(), 1e10);
    }

    #[test]
    fn test_single_rectangle() {
        let buffers = vec![rect_buffer(1, (0.0, 0.0), (10.0, 5.0))];
        let raster = OverlapRaster::from_buffers(&buffers, 1.0).unwrap();

        assert_eq!((raster.rows, raster.cols), (5, 10));
        assert_eq!(raster.origin_x, 0.0);
        assert_eq!(raster.origin_y, 5.0);
        assert_eq!(raster.area_by_count(), BTreeMap::from([(1, 50.0)]));
        assert_eq!(raster.extent_area(), 50.0);
    }

    #[test]
    fn test_overlap_counts_and_no_data() {
        let buffers = vec![
            rect_buffer(1, (0.0, 0.0), (10.0, 10.0)),
            rect_buffer(2, (5.0, 0.0), (15.0, 10.0)),
            rect_buffer(3, (20.0, 0.0), (25.0, 5.0)),
        ];
        let raster = OverlapRaster::from_buffers(&buffers, 1.0).unwrap();

        assert_eq!((raster.rows, raster.cols), (10, 25));
        let by_count = raster.area_by_count();
        assert_eq!(by_count[&1], 100.0 + 25.0);
        assert_eq!(by_count[&2], 50.0);
        assert_eq!(raster.max_count(), Some(2));

        // Gap between the rectangles is no data, not zero
        assert_eq!(raster.value_at(PlanarPoint::new(17.5, 2.5)), None);
        assert_eq!(raster.value_at(PlanarPoint::new(7.5, 2.5)), Some(2));
        assert_eq!(raster.value_at(PlanarPoint::new(2.5, 2.5)), Some(1));
        assert_eq!(raster.value_at(PlanarPoint::new(-1.0, 2.5)), None);
        assert_eq!(raster.covered_area(), 175.0);
        assert_eq!(raster.extent_area(), 250.0);
        assert_eq!(raster.cells().filter(|(_, _, v)| v.is_none()).count(), 75);
    }

    #[test]
    fn test_holes_are_not_covered() {
        let exterior = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let hole = LineString::from(vec![(4.0, 4.0), (6.0, 4.0), (6.0, 6.0), (4.0, 6.0)]);
        let buffers = vec![WalkBuffer {
            walk_id: 1,
            polygon: MultiPolygon::new(vec![Polygon::new(exterior, vec![hole])]),
            degenerate: false,
        }];
        let raster = OverlapRaster::from_buffers(&buffers, 1.0).unwrap();

        assert_eq!(raster.value_at(PlanarPoint::new(5.0, 5.0)), None);
        assert_eq!(raster.value_at(PlanarPoint::new(1.5, 1.5)), Some(1));
        assert_eq!(raster.covered_area(), 96.0);
    }

    #[test]
    fn test_cell_geometry() {
        let buffers = vec![rect_buffer(1, (100.2, 50.7), (103.9, 52.1))];
        let raster = OverlapRaster::from_buffers(&buffers, 0.5).unwrap();

        let bounds = raster.bounds();
        assert_eq!(bounds.min_x, 100.0);
        assert_eq!(bounds.max_x, 104.0);
        assert_eq!(bounds.min_y, 50.5);
        assert_eq!(bounds.max_y, 52.5);
        assert_eq!(raster.cell_center(0, 0), PlanarPoint::new(100.25, 52.25));
        assert_eq!(raster.get(0, 0), None);
        assert_eq!(raster.get(raster.rows, 0), None);
    }

    #[test]
    fn test_raster_area_matches_buffer_area() {
        let line = vec![
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(120.0, 40.0),
            PlanarPoint::new(200.0, -30.0),
        ];
        let polygon = buffer_polyline(&line, 8.5, 8);
        let exact = polygon.unsigned_area();
        let buffers = vec![WalkBuffer { walk_id: 1, polygon, degenerate: false }];

        let raster = OverlapRaster::from_buffers(&buffers, 1.0).unwrap();
        let covered = raster.covered_area();
        assert!((covered - exact).abs() / exact < 0.02, "{covered} vs {exact}");
    }

    #[test]
    fn test_buffer_index() {
        let buffers = vec![
            rect_buffer(1, (0.0, 0.0), (10.0, 10.0)),
            rect_buffer(2, (5.0, 0.0), (15.0, 10.0)),
            rect_buffer(3, (20.0, 0.0), (25.0, 5.0)),
        ];
        let index = BufferIndex::new(&buffers);

        assert_eq!(index.walks_at(PlanarPoint::new(7.0, 5.0)), vec![1, 2]);
        assert_eq!(index.walks_at(PlanarPoint::new(22.0, 1.0)), vec![3]);
        assert!(index.walks_at(PlanarPoint::new(17.0, 1.0)).is_empty());
    }
}
