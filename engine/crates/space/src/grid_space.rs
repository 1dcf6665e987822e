use serde::{Deserialize, Serialize};

use crate::model::GridError;

/// 2D integer coordinate. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance between two cells.
    pub fn manhattan(self, other: GridPos) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }
}

/// Static walkability matrix for one area.
///
/// Cells are stored row-major; `0` is walkable and `1` is an obstacle.
/// Grids are loaded once at startup and shared read-only between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AreaGrid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl AreaGrid {
    /// Build a grid from rows of `'0'`/`'1'` characters.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, GridError> {
        let width = rows
            .first()
            .map(|r| r.as_ref().chars().count())
            .ok_or(GridError::Empty)?;
        if width == 0 {
            return Err(GridError::Empty);
        }

        let mut cells = Vec::with_capacity(width * rows.len());
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != width {
                return Err(GridError::RaggedRow {
                    row: y,
                    expected: width,
                    got: row.chars().count(),
                });
            }
            for (x, ch) in row.chars().enumerate() {
                match ch {
                    '0' => cells.push(0),
                    '1' => cells.push(1),
                    value => return Err(GridError::InvalidCell { x, y, value }),
                }
            }
        }

        Ok(Self {
            width,
            height: rows.len(),
            cells,
        })
    }

    /// An obstacle-free grid of the given size.
    pub fn open(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    /// False for obstacles and for anything outside the grid.
    pub fn is_walkable(&self, pos: GridPos) -> bool {
        self.cell(pos) == Some(0)
    }

    /// Raw cell value, or `None` when out of bounds.
    pub fn cell(&self, pos: GridPos) -> Option<u8> {
        if !self.in_bounds(pos) {
            return None;
        }
        self.cells.get(pos.y as usize * self.width + pos.x as usize).copied()
    }

    /// Bounds-checked walkability, distinguishing out-of-bounds from blocked.
    pub fn check(&self, pos: GridPos) -> Result<bool, GridError> {
        self.cell(pos)
            .map(|c| c == 0)
            .ok_or(GridError::OutOfBounds { x: pos.x, y: pos.y })
    }

    /// All walkable cells in row-major order.
    pub fn walkable_cells(&self) -> Vec<GridPos> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == 0)
            .map(|(i, _)| GridPos::new((i % self.width) as i32, (i / self.width) as i32))
            .collect()
    }

    /// One digit per cell, row-major. Length is always `width * height`.
    pub fn to_digits(&self) -> String {
        self.cells
            .iter()
            .map(|&c| if c == 0 { '0' } else { '1' })
            .collect()
    }

    fn to_rows(&self) -> Vec<String> {
        let digits = self.to_digits();
        digits
            .as_bytes()
            .chunks(self.width.max(1))
            .map(|row| String::from_utf8_lossy(row).into_owned())
            .collect()
    }
}

impl TryFrom<Vec<String>> for AreaGrid {
    type Error = GridError;

    fn try_from(rows: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_rows(&rows)
    }
}

impl From<AreaGrid> for Vec<String> {
    fn from(grid: AreaGrid) -> Self {
        grid.to_rows()
    }
}
