//! Partitioned display area
//!
//! The display is split into a grid of equally sized cells separated by a
//! fixed spacing. Each cell keeps the indices of the stimuli living in it;
//! the stimuli themselves stay in the session's arena.

use std::fmt;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;
use crate::error::{Error, Result};

/// Grid coordinates of a partition within its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId {
    pub column: usize,
    pub row: usize,
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.column, self.row)
    }
}

/// A leaf partition: its walls plus the stimuli resident in it
#[derive(Debug, Clone)]
pub struct Partition {
    pub id: PartitionId,
    pub bounds: BoundingBox,
    /// Indices into the stimulus arena, in movement order
    pub residents: Vec<usize>,
}

/// The whole display area and its grid of child partitions
#[derive(Debug, Clone)]
pub struct Partitions {
    bounds: BoundingBox,
    columns: usize,
    rows: usize,
    /// Column-major: index = column * rows + row
    cells: Vec<Partition>,
}

impl Partitions {
    /// Split `dimensions` (centred on `center`) into `columns x rows` cells
    /// separated by `spacing`.
    pub fn new(dimensions: DVec2, center: DVec2, split: [usize; 2], spacing: DVec2) -> Result<Self> {
        let [columns, rows] = split;
        if columns == 0 || rows == 0 {
            return Err(Error::DegeneratePartition(format!(
                "split must be at least 1x1, got {columns}x{rows}"
            )));
        }

        let split_v = DVec2::new(columns as f64, rows as f64);
        let cell = (dimensions - (split_v - DVec2::ONE) * spacing) / split_v;
        if !(cell.x > 0.0 && cell.y > 0.0) {
            return Err(Error::DegeneratePartition(format!(
                "cells of {:.4}x{:.4} left after spacing",
                cell.x, cell.y
            )));
        }

        let outer = BoundingBox::from_center(center, dimensions);
        let step = cell + spacing;

        let mut cells = Vec::with_capacity(columns * rows);
        for column in 0..columns {
            for row in 0..rows {
                let min = outer.min + step * DVec2::new(column as f64, row as f64);
                let mut max = min + cell;
                // Outermost cells end exactly on the parent edge
                if column + 1 == columns {
                    max.x = outer.max.x;
                }
                if row + 1 == rows {
                    max.y = outer.max.y;
                }
                cells.push(Partition {
                    id: PartitionId { column, row },
                    bounds: BoundingBox::new(min, max),
                    residents: Vec::new(),
                });
            }
        }

        Ok(Self {
            bounds: outer,
            columns,
            rows,
            cells,
        })
    }

    /// Outer display area
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of leaf partitions
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Width and height shared by every leaf partition
    pub fn inner_dimensions(&self) -> DVec2 {
        // `new` guarantees at least one cell
        self.cells
            .first()
            .map(|p| p.bounds.dimensions())
            .unwrap_or(DVec2::ZERO)
    }

    fn index_of(&self, id: PartitionId) -> Option<usize> {
        (id.column < self.columns && id.row < self.rows).then(|| id.column * self.rows + id.row)
    }

    pub fn get(&self, id: PartitionId) -> Option<&Partition> {
        self.index_of(id).map(|i| &self.cells[i])
    }

    pub fn get_mut(&mut self, id: PartitionId) -> Option<&mut Partition> {
        let index = self.index_of(id)?;
        self.cells.get_mut(index)
    }

    /// Partitions in column-major order (the order stimuli are moved in)
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.cells.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Partition> {
        self.cells.iter_mut()
    }

    /// Drop every residency list (start of a new trial)
    pub fn clear_residents(&mut self) {
        for cell in &mut self.cells {
            cell.residents.clear();
        }
    }
}
