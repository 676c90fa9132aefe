//! Projection of a sparse parcel list onto a dense rectangular grid.
//!
//! Grid addresses are zero based `(row, col)`; the matching garden coordinate
//! is `(col + min_x, row + min_y)`. A projection is rebuilt from scratch for
//! every parcel snapshot and never patched in place.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::{Parcel, ParcelCoord};

/// Upper bound on allocated cells. Coordinates are not compacted, so two
/// parcels far apart produce a wide, mostly empty grid.
pub const DEFAULT_MAX_CELLS: usize = 1 << 22;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid of {columns} x {rows} cells exceeds the limit of {limit} cells")]
    TooLarge { columns: u64, rows: u64, limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridAddress {
    pub row: usize,
    pub col: usize,
}

impl GridAddress {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridBounds {
    pub min_x: i32,
    pub min_y: i32,
    pub columns: usize,
    pub rows: usize,
}

impl GridBounds {
    /// Bounds used when no parcel has a usable coordinate.
    pub const DEGENERATE: GridBounds = GridBounds {
        min_x: 0,
        min_y: 0,
        columns: 1,
        rows: 1,
    };

    /// Cells a dense grid over these bounds holds, `None` on overflow.
    pub fn cell_count(&self) -> Option<usize> {
        self.columns.checked_mul(self.rows)
    }

    /// Garden coordinate shown for a grid address.
    pub fn to_world(&self, address: GridAddress) -> Option<ParcelCoord> {
        if address.row >= self.rows || address.col >= self.columns {
            return None;
        }
        let x = i64::from(self.min_x) + address.col as i64;
        let y = i64::from(self.min_y) + address.row as i64;
        Some(ParcelCoord::new(i32::try_from(x).ok()?, i32::try_from(y).ok()?))
    }

    pub fn to_grid(&self, coord: ParcelCoord) -> Option<GridAddress> {
        let col = i64::from(coord.x) - i64::from(self.min_x);
        let row = i64::from(coord.y) - i64::from(self.min_y);
        if col < 0 || row < 0 {
            return None;
        }
        let (col, row) = (col as u64, row as u64);
        if col >= self.columns as u64 || row >= self.rows as u64 {
            return None;
        }
        Some(GridAddress::new(row as usize, col as usize))
    }

    fn index(&self, address: GridAddress) -> usize {
        address.row * self.columns + address.col
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridCell<'a> {
    Occupied(&'a Parcel),
    Empty,
}

impl<'a> GridCell<'a> {
    pub fn parcel(&self) -> Option<&'a Parcel> {
        match self {
            GridCell::Occupied(parcel) => Some(parcel),
            GridCell::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, GridCell::Empty)
    }
}

/// Dense view over one parcel snapshot.
#[derive(Debug, Clone)]
pub struct ParcelGrid {
    parcels: Arc<[Parcel]>,
    /// Row-major; each slot holds an index into `parcels`.
    cells: Vec<Option<usize>>,
    bounds: GridBounds,
    excluded: usize,
    duplicates: usize,
}

impl ParcelGrid {
    fn degenerate(parcels: Arc<[Parcel]>, excluded: usize) -> Self {
        Self {
            parcels,
            cells: vec![None],
            bounds: GridBounds::DEGENERATE,
            excluded,
            duplicates: 0,
        }
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn rows(&self) -> usize {
        self.bounds.rows
    }

    pub fn columns(&self) -> usize {
        self.bounds.columns
    }

    /// Every parcel of the snapshot, including ones left off the grid.
    pub fn parcels(&self) -> &[Parcel] {
        &self.parcels
    }

    pub fn parcel_count(&self) -> usize {
        self.parcels.len()
    }

    pub fn cell(&self, address: GridAddress) -> Option<GridCell<'_>> {
        if address.row >= self.bounds.rows || address.col >= self.bounds.columns {
            return None;
        }
        Some(self.cell_at_index(self.bounds.index(address)))
    }

    pub fn parcel_at(&self, coord: ParcelCoord) -> Option<&Parcel> {
        self.bounds
            .to_grid(coord)
            .and_then(|address| self.cell(address))
            .and_then(|cell| cell.parcel())
    }

    pub fn to_world(&self, address: GridAddress) -> Option<ParcelCoord> {
        self.bounds.to_world(address)
    }

    /// Cells of one row, left to right.
    pub fn row(&self, row: usize) -> impl Iterator<Item = GridCell<'_>> + '_ {
        let columns = self.bounds.columns;
        let range = if row < self.bounds.rows {
            row * columns..(row + 1) * columns
        } else {
            0..0
        };
        range.map(move |index| self.cell_at_index(index))
    }

    /// All cells in row-major order with their addresses.
    pub fn iter(&self) -> impl Iterator<Item = (GridAddress, GridCell<'_>)> + '_ {
        let columns = self.bounds.columns;
        (0..self.cells.len()).map(move |index| {
            (
                GridAddress::new(index / columns, index % columns),
                self.cell_at_index(index),
            )
        })
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|slot| slot.is_some()).count()
    }

    /// Parcels left off the grid because their coordinates were unusable.
    pub fn excluded_count(&self) -> usize {
        self.excluded
    }

    /// Placements that overwrote an earlier parcel at the same coordinate.
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    fn cell_at_index(&self, index: usize) -> GridCell<'_> {
        match self.cells.get(index).copied().flatten() {
            Some(parcel) => GridCell::Occupied(&self.parcels[parcel]),
            None => GridCell::Empty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridProjector {
    pub max_cells: usize,
}

impl Default for GridProjector {
    fn default() -> Self {
        Self {
            max_cells: DEFAULT_MAX_CELLS,
        }
    }
}

impl GridProjector {
    pub fn with_max_cells(max_cells: usize) -> Self {
        Self {
            max_cells: max_cells.max(1),
        }
    }

    /// Project a snapshot. Parcels without coordinates are kept in the
    /// snapshot but take no part in bounds or placement; when a coordinate
    /// repeats, the parcel that comes later in the list wins the cell.
    pub fn project(&self, parcels: impl Into<Arc<[Parcel]>>) -> Result<ParcelGrid, GridError> {
        let parcels: Arc<[Parcel]> = parcels.into();
        let excluded = parcels.iter().filter(|p| p.coord().is_none()).count();

        let Some((min_x, min_y, max_x, max_y)) = parcels
            .iter()
            .filter_map(Parcel::coord)
            .fold(None, |acc, coord| match acc {
                None => Some((coord.x, coord.y, coord.x, coord.y)),
                Some((min_x, min_y, max_x, max_y)) => Some((
                    min_x.min(coord.x),
                    min_y.min(coord.y),
                    max_x.max(coord.x),
                    max_y.max(coord.y),
                )),
            })
        else {
            return Ok(ParcelGrid::degenerate(parcels, excluded));
        };

        let columns = (i64::from(max_x) - i64::from(min_x) + 1) as u64;
        let rows = (i64::from(max_y) - i64::from(min_y) + 1) as u64;
        let too_large = GridError::TooLarge {
            columns,
            rows,
            limit: self.max_cells,
        };
        let cell_count = columns.checked_mul(rows).ok_or_else(|| too_large.clone())?;
        if cell_count > self.max_cells as u64 {
            return Err(too_large);
        }

        let bounds = GridBounds {
            min_x,
            min_y,
            columns: columns as usize,
            rows: rows as usize,
        };
        let mut cells = vec![None; cell_count as usize];
        let mut duplicates = 0;
        for (index, parcel) in parcels.iter().enumerate() {
            let Some(address) = parcel.coord().and_then(|coord| bounds.to_grid(coord)) else {
                continue;
            };
            let slot = &mut cells[bounds.index(address)];
            if let Some(previous) = slot.replace(index) {
                duplicates += 1;
                debug!(
                    target: "garden::grid",
                    overwritten = %parcels[previous].id,
                    winner = %parcel.id,
                    row = address.row,
                    col = address.col,
                    "grid.duplicate_coordinate"
                );
            }
        }

        Ok(ParcelGrid {
            parcels,
            cells,
            bounds,
            excluded,
            duplicates,
        })
    }
}

/// Project with the default cell limit.
pub fn project_parcels(parcels: impl Into<Arc<[Parcel]>>) -> Result<ParcelGrid, GridError> {
    GridProjector::default().project(parcels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParcelId;

    #[test]
    fn empty_snapshot_yields_single_empty_cell() {
        let grid = project_parcels(Vec::<Parcel>::new()).expect("projection");
        assert_eq!(grid.bounds(), GridBounds::DEGENERATE);
        assert_eq!(grid.iter().count(), 1);
        assert_eq!(grid.cell(GridAddress::new(0, 0)), Some(GridCell::Empty));
    }

    #[test]
    fn all_malformed_matches_empty_projection() {
        let parcels = vec![Parcel::new(1, None), Parcel::new(2, None)];
        let grid = project_parcels(parcels).expect("projection");
        assert_eq!(grid.bounds(), GridBounds::DEGENERATE);
        assert_eq!(grid.occupied_count(), 0);
        assert_eq!(grid.excluded_count(), 2);
        assert_eq!(grid.parcel_count(), 2);
    }

    #[test]
    fn square_is_fully_occupied() {
        let parcels = vec![
            Parcel::at(1, 0, 0),
            Parcel::at(2, 0, 1),
            Parcel::at(3, 1, 0),
            Parcel::at(4, 1, 1),
        ];
        let grid = project_parcels(parcels).expect("projection");
        assert_eq!(
            grid.bounds(),
            GridBounds {
                min_x: 0,
                min_y: 0,
                columns: 2,
                rows: 2
            }
        );
        assert!(grid.iter().all(|(_, cell)| !cell.is_empty()));
    }

    #[test]
    fn cell_count_matches_projection_and_guards_overflow() {
        let grid = project_parcels(vec![Parcel::at(1, -2, 3), Parcel::at(2, 4, -1)])
            .expect("projection");
        assert_eq!(grid.bounds().cell_count(), Some(35));
        assert_eq!(grid.bounds().cell_count(), Some(grid.iter().count()));
        assert_eq!(GridBounds::DEGENERATE.cell_count(), Some(1));

        let huge = GridBounds {
            min_x: 0,
            min_y: 0,
            columns: usize::MAX,
            rows: 2,
        };
        assert_eq!(huge.cell_count(), None);
    }

    #[test]
    fn later_duplicate_wins() {
        let parcels = vec![Parcel::at(10, 5, 5), Parcel::at(11, 5, 5)];
        let grid = project_parcels(parcels).expect("projection");
        assert_eq!(grid.occupied_count(), 1);
        assert_eq!(grid.duplicate_count(), 1);
        let cell = grid.cell(GridAddress::new(0, 0)).and_then(|c| c.parcel());
        assert_eq!(cell.map(|p| p.id), Some(ParcelId(11)));
    }

    #[test]
    fn negative_coordinates_offset_into_grid() {
        let parcels = vec![Parcel::at(1, -2, 3), Parcel::at(2, 4, -1)];
        let grid = project_parcels(parcels).expect("projection");
        assert_eq!(
            grid.bounds(),
            GridBounds {
                min_x: -2,
                min_y: -1,
                columns: 7,
                rows: 5
            }
        );
        let address = GridAddress::new(4, 0);
        let parcel = grid.cell(address).and_then(|c| c.parcel()).expect("occupied");
        assert_eq!(parcel.id, ParcelId(1));
        assert_eq!(grid.to_world(address), Some(ParcelCoord::new(-2, 3)));
        assert_eq!(grid.occupied_count(), 2);
    }

    #[test]
    fn malformed_parcels_are_skipped_not_fatal() {
        let parcels = vec![Parcel::at(1, 3, 3), Parcel::new(2, None), Parcel::at(3, 4, 3)];
        let grid = project_parcels(parcels).expect("projection");
        assert_eq!(grid.columns(), 2);
        assert_eq!(grid.rows(), 1);
        assert_eq!(grid.excluded_count(), 1);
        assert_eq!(grid.parcel_count(), 3);
        let ids: Vec<_> = grid.row(0).filter_map(|c| c.parcel()).map(|p| p.id).collect();
        assert_eq!(ids, vec![ParcelId(1), ParcelId(3)]);
    }

    #[test]
    fn wide_spread_grid_is_allocated_densely() {
        let parcels = vec![Parcel::at(1, 0, 0), Parcel::at(2, 10_000, 0)];
        let grid = project_parcels(parcels).expect("projection");
        assert_eq!(grid.columns(), 10_001);
        assert_eq!(grid.occupied_count(), 2);
    }

    #[test]
    fn oversized_grid_is_an_error() {
        let parcels = vec![Parcel::at(1, i32::MIN, i32::MIN), Parcel::at(2, i32::MAX, i32::MAX)];
        let err = project_parcels(parcels).unwrap_err();
        assert!(matches!(err, GridError::TooLarge { columns, .. } if columns == 1u64 << 32));

        let small = GridProjector::with_max_cells(4);
        let err = small
            .project(vec![Parcel::at(1, 0, 0), Parcel::at(2, 2, 1)])
            .unwrap_err();
        assert_eq!(
            err,
            GridError::TooLarge {
                columns: 3,
                rows: 2,
                limit: 4
            }
        );
    }

    #[test]
    fn bounds_reject_addresses_outside_grid() {
        let bounds = GridBounds {
            min_x: -1,
            min_y: 2,
            columns: 3,
            rows: 2,
        };
        assert_eq!(bounds.to_world(GridAddress::new(2, 0)), None);
        assert_eq!(bounds.to_grid(ParcelCoord::new(-2, 2)), None);
        assert_eq!(bounds.to_grid(ParcelCoord::new(2, 2)), None);
        assert_eq!(
            bounds.to_grid(ParcelCoord::new(1, 3)),
            Some(GridAddress::new(1, 2))
        );
    }
}
