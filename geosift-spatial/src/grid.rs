//! Grid partitioning of region envelopes.
//!
//! A region's envelope is widened by a margin on its max edges and split
//! into `width × height` equal cells. Cells tile the widened envelope
//! exactly: adjacent cells share edges, and the last row and column are
//! snapped to the max edges so floating-point steps never leave a gap.

use crate::config::GridSpec;
use crate::error::{Result, SpatialError};
use crate::geometry::Envelope;

/// One cell of a partitioned envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    pub envelope: Envelope,
}

/// Splits envelopes into grid cells.
#[derive(Debug, Clone, Copy)]
pub struct GridPartitioner {
    margin: f64,
}

impl GridPartitioner {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Partition `envelope` into `spec.width × spec.height` cells, row-major
    /// from the min corner.
    pub fn partition(&self, envelope: &Envelope, spec: GridSpec) -> Result<Vec<GridCell>> {
        spec.validate()?;
        if !envelope.is_finite() {
            return Err(SpatialError::InvalidGeometry(format!(
                "cannot partition non-finite envelope {envelope:?}"
            )));
        }

        let widened = envelope.inflate_max(self.margin);
        let step_x = widened.width() / spec.width as f64;
        let step_y = widened.height() / spec.height as f64;

        let edge_x = |i: u32| {
            if i == spec.width {
                widened.max_x
            } else {
                widened.min_x + step_x * i as f64
            }
        };
        let edge_y = |j: u32| {
            if j == spec.height {
                widened.max_y
            } else {
                widened.min_y + step_y * j as f64
            }
        };

        let mut cells = Vec::with_capacity(spec.cell_count());
        for row in 0..spec.height {
            for col in 0..spec.width {
                cells.push(GridCell {
                    row,
                    col,
                    envelope: Envelope {
                        min_x: edge_x(col),
                        min_y: edge_y(row),
                        max_x: edge_x(col + 1),
                        max_y: edge_y(row + 1),
                    },
                });
            }
        }
        Ok(cells)
    }
}

impl Default for GridPartitioner {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EDGE_MARGIN)
    }
}
