//! Terrain grids: elevation and thermal strength, addressed by integer cell.

use thiserror::Error;

/// Indexable 2D scalar field.
///
/// Callers must only ask for in-bounds cells; implementations may panic
/// otherwise. Positions off the low edge are caught earlier, in
/// [`crate::vec3::grid_cell`].
pub trait Field {
    fn at(&self, x: usize, y: usize) -> f64;
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("grid JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("grid is empty")]
    Empty,
    #[error("grid column {column} has {len} cells, expected {expected}")]
    Ragged {
        column: usize,
        len: usize,
        expected: usize,
    },
}

/// Dense grid stored column-major so `values[x * height + y]` is cell `(x, y)`,
/// matching the `map[x][y]` layout of the map files.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl Grid {
    /// Grid where every cell holds `value`.
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self {
            width,
            height,
            values: vec![value; width * height],
        }
    }

    /// Parse a `[[f64; height]; width]` JSON document.
    pub fn from_json(json: &str) -> Result<Self, GridError> {
        let columns: Vec<Vec<f64>> = serde_json::from_str(json)?;
        Self::from_columns(columns)
    }

    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self, GridError> {
        let width = columns.len();
        let height = columns.first().map(Vec::len).unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(GridError::Empty);
        }
        let mut values = Vec::with_capacity(width * height);
        for (x, cells) in columns.into_iter().enumerate() {
            if cells.len() != height {
                return Err(GridError::Ragged {
                    column: x,
                    len: cells.len(),
                    expected: height,
                });
            }
            values.extend(cells);
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        self.values[x * self.height + y] = value;
    }
}

impl Field for Grid {
    fn at(&self, x: usize, y: usize) -> f64 {
        assert!(x < self.width && y < self.height, "cell ({x}, {y}) out of bounds");
        self.values[x * self.height + y]
    }
}
