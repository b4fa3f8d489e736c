//! Start placement
//!
//! Positions are drawn from a discretised occupancy grid covering one
//! partition. Each placed stimulus blocks a square of cells around itself,
//! which slightly over-excludes (square around a circle) but never lets two
//! discs overlap.

use glam::DVec2;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use super::partition::{PartitionId, Partitions};
use super::stimulus::Stimulus;
use crate::error::{Error, Result};
use crate::heading_to_unit;

/// Legal/illegal start cells for one partition
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    /// Cells per axis
    shape: [usize; 2],
    /// Size of one cell in coordinate units
    cell_size: DVec2,
    /// Radius of a stimulus in cells, rounded up, per axis
    exclusion: [usize; 2],
    /// Legality after wall margins only
    template: Vec<bool>,
    template_legal: usize,
    cells: Vec<bool>,
    legal: usize,
}

impl OccupancyGrid {
    /// Grid over a partition of `dimensions` with `cells_per_unit` resolution
    /// for stimuli of `radius`.
    pub fn new(dimensions: DVec2, cells_per_unit: f64, radius: f64) -> Result<Self> {
        let nx = (dimensions.x * cells_per_unit) as usize;
        let ny = (dimensions.y * cells_per_unit) as usize;
        if nx == 0 || ny == 0 {
            return Err(Error::InvalidConfig(format!(
                "occupancy grid of {nx}x{ny} cells is empty"
            )));
        }
        let cell_size = dimensions / DVec2::new(nx as f64, ny as f64);

        // Cells within one radius of a wall are never legal
        let lo = (DVec2::splat(radius) / cell_size).floor();
        let hi = ((dimensions - DVec2::splat(radius)) / cell_size).floor().max(DVec2::ZERO);
        let (lo_x, lo_y) = (lo.x as usize, lo.y as usize);
        let (hi_x, hi_y) = ((hi.x as usize).min(nx), (hi.y as usize).min(ny));

        let mut template = vec![false; nx * ny];
        let mut legal = 0;
        for x in (lo_x + 1)..hi_x {
            for y in (lo_y + 1)..hi_y {
                template[x * ny + y] = true;
                legal += 1;
            }
        }
        if legal == 0 {
            return Err(Error::InvalidConfig(format!(
                "stimuli of radius {radius} do not fit in a {:.4}x{:.4} partition",
                dimensions.x, dimensions.y
            )));
        }

        let exclusion = (DVec2::splat(radius) / cell_size).ceil();
        Ok(Self {
            shape: [nx, ny],
            cell_size,
            exclusion: [exclusion.x as usize, exclusion.y as usize],
            cells: template.clone(),
            template,
            template_legal: legal,
            legal,
        })
    }

    /// Back to wall margins only
    pub fn reset(&mut self) {
        self.cells.copy_from_slice(&self.template);
        self.legal = self.template_legal;
    }

    pub fn legal_cells(&self) -> usize {
        self.legal
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    /// Stimuli that always fit, whatever cells the earlier ones landed on
    pub fn guaranteed_capacity(&self) -> usize {
        let [ex, ey] = self.exclusion;
        let block = (4 * ex + 2) * (4 * ey + 2);
        1 + (self.template_legal - 1) / block
    }

    /// Pick a random legal cell, block its surroundings and return a
    /// continuous position relative to the partition's lower-left corner.
    pub fn claim<R: Rng>(&mut self, rng: &mut R) -> Option<DVec2> {
        if self.legal == 0 {
            return None;
        }

        let pick = rng.random_range(0..self.legal);
        let index = self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, legal)| **legal)
            .nth(pick)
            .map(|(i, _)| i)?;
        let [_, ny] = self.shape;
        let (cx, cy) = (index / ny, index % ny);

        self.block_around(cx, cy);

        // Uniform within the chosen cell to avoid quantisation artefacts
        let corner = DVec2::new(cx as f64, cy as f64) * self.cell_size;
        let jitter = DVec2::new(rng.random::<f64>(), rng.random::<f64>());
        Some(corner + jitter * self.cell_size)
    }

    /// Square block of `2 * exclusion + 1` cells either side of the centre
    fn block_around(&mut self, cx: usize, cy: usize) {
        let [nx, ny] = self.shape;
        let reach_x = 2 * self.exclusion[0] + 1;
        let reach_y = 2 * self.exclusion[1] + 1;
        for x in cx.saturating_sub(reach_x)..(cx + reach_x).min(nx) {
            for y in cy.saturating_sub(reach_y)..(cy + reach_y).min(ny) {
                let cell = &mut self.cells[x * ny + y];
                if *cell {
                    *cell = false;
                    self.legal -= 1;
                }
            }
        }
    }
}

/// Where a stimulus started a trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartInfo {
    pub id: usize,
    pub partition_id: PartitionId,
    pub starting_pos: DVec2,
    pub starting_vel: DVec2,
    pub is_tracked: bool,
}

/// Placement result handed back to the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub tracked_ids: Vec<usize>,
    pub stim_info: Vec<StartInfo>,
}

/// Random direction scaled to `speed`
pub fn random_velocity<R: Rng>(rng: &mut R, speed: f64) -> DVec2 {
    let theta = rng.random_range(0.0..std::f64::consts::TAU);
    heading_to_unit(theta) * speed
}

/// Tracked stimuli per partition, indexed `[column][row]`.
///
/// Each slot goes to a partition holding the fewest tracked stimuli that also
/// lies in a least-filled column and a least-filled row, so whole rows and
/// columns fill before any partition gets a second one.
pub fn tracked_per_partition<R: Rng>(rng: &mut R, split: [usize; 2], n_tracked: usize) -> Vec<Vec<usize>> {
    let [columns, rows] = split;
    let mut tracked = vec![vec![0usize; rows]; columns];
    if columns == 0 || rows == 0 {
        return tracked;
    }

    for _ in 0..n_tracked {
        let global_min = tracked.iter().flatten().copied().min().unwrap_or(0);
        let col_sums: Vec<usize> = tracked.iter().map(|col| col.iter().sum()).collect();
        let row_sums: Vec<usize> = (0..rows)
            .map(|r| tracked.iter().map(|col| col[r]).sum())
            .collect();
        let min_col = col_sums.iter().copied().min().unwrap_or(0);
        let min_row = row_sums.iter().copied().min().unwrap_or(0);

        let mut candidates: Vec<(usize, usize)> = Vec::new();
        for c in (0..columns).filter(|&c| col_sums[c] == min_col) {
            for r in (0..rows).filter(|&r| row_sums[r] == min_row) {
                if tracked[c][r] == global_min {
                    candidates.push((c, r));
                }
            }
        }
        // Column and row minima can disagree; any least-filled cell keeps
        // the one-extra bound
        if candidates.is_empty() {
            for (c, col) in tracked.iter().enumerate() {
                for (r, &n) in col.iter().enumerate() {
                    if n == global_min {
                        candidates.push((c, r));
                    }
                }
            }
        }

        if let Some(&(c, r)) = candidates.choose(rng) {
            tracked[c][r] += 1;
        }
    }

    tracked
}

/// Assign every stimulus a partition, a non-overlapping start position, a
/// random velocity, and tracked status.
///
/// Stimuli are dealt to partitions in order: the first `n / partitions`
/// go to partition (0, 0), the next to (0, 1), and so on column-major.
pub fn place_stimuli<R: Rng>(
    rng: &mut R,
    partitions: &mut Partitions,
    stims: &mut [Stimulus],
    grid: &mut OccupancyGrid,
    n_tracked: usize,
    speed_per_frame: f64,
) -> Result<Placement> {
    let n_partitions = partitions.len();
    if n_partitions == 0 || stims.len() % n_partitions != 0 {
        return Err(Error::InvalidConfig(format!(
            "{} stimuli cannot be spread evenly over {} partitions",
            stims.len(),
            n_partitions
        )));
    }
    let per_partition = stims.len() / n_partitions;
    let tracked = tracked_per_partition(rng, [partitions.columns(), partitions.rows()], n_tracked);

    partitions.clear_residents();
    let mut placement = Placement::default();
    let mut next = 0;

    for partition in partitions.iter_mut() {
        grid.reset();
        let n_tracked_here = tracked[partition.id.column][partition.id.row];
        if n_tracked_here > per_partition {
            return Err(Error::InvalidConfig(format!(
                "{n_tracked_here} tracked stimuli do not fit among {per_partition} in partition {}",
                partition.id
            )));
        }

        for i in 0..per_partition {
            let stim = &mut stims[next];
            stim.reset_for_trial();

            let local = grid.claim(rng).ok_or(Error::PlacementExhausted {
                partition: partition.id,
                placed: i,
                requested: per_partition,
            })?;
            let vel = random_velocity(rng, speed_per_frame);
            stim.set_motion(partition.bounds.min + local, vel);
            stim.partition_id = Some(partition.id);
            stim.is_tracked = i < n_tracked_here;

            partition.residents.push(next);
            if stim.is_tracked {
                placement.tracked_ids.push(stim.id);
            }
            placement.stim_info.push(StartInfo {
                id: stim.id,
                partition_id: partition.id,
                starting_pos: stim.pos,
                starting_vel: stim.vel,
                is_tracked: stim.is_tracked,
            });
            next += 1;
        }
    }

    log::debug!(
        "Placed {} stimuli over {} partitions ({} tracked)",
        stims.len(),
        n_partitions,
        placement.tracked_ids.len()
    );
    Ok(placement)
}
