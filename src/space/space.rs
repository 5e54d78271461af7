// src/space/space.rs

//! The space: owner of the particle arrays and the cell tree.

use log::debug;

use crate::cells::{make_multipoles, sanitize, split_cell, Cell, CellArena, CellId};
use crate::engine::Engine;
use crate::errors::SimError;
use crate::particles::{
    relink_gparts_to_parts, relink_gparts_to_sparts, relink_parts_to_gparts,
    relink_sparts_to_gparts, GPart, Part, SPart, XPart,
};

use super::config::SpaceConfig;

/// The simulation volume: particle arrays, the cell arena, and the
/// top-level decomposition. Cells only ever hold windows into the arrays
/// owned here.
pub struct Space {
    pub config: SpaceConfig,
    pub parts: Vec<Part>,
    pub xparts: Vec<XPart>,
    pub gparts: Vec<GPart>,
    pub sparts: Vec<SPart>,
    pub cells: CellArena,
    /// The top-level cells, in grid order.
    pub top: Vec<CellId>,
}

impl Space {
    /// Build a space around the given particle arrays. Cross-species
    /// links must already be consistent; the extended gas state is
    /// derived here.
    pub fn new(
        config: SpaceConfig,
        parts: Vec<Part>,
        gparts: Vec<GPart>,
        sparts: Vec<SPart>,
    ) -> Result<Self, SimError> {
        if config.dim.iter().any(|&d| d <= 0.0) {
            return Err(SimError::InvalidDomain);
        }

        let xparts = parts
            .iter()
            .map(|p| XPart { v_full: p.v, ..XPart::default() })
            .collect();

        Ok(Space {
            config,
            parts,
            xparts,
            gparts,
            sparts,
            cells: CellArena::new(),
            top: Vec::new(),
        })
    }

    /// Allocate `n` blank cells from the pool.
    pub fn get_cells(&mut self, n: usize) -> Vec<CellId> {
        (0..n)
            .map(|_| self.cells.insert(Cell::new([0.0; 3], self.config.dim, 0, None)))
            .collect()
    }

    /// Index of the top-level cell containing a position.
    fn top_cell_index(&self, x: &[f64; 3]) -> usize {
        let grid = self.config.top_grid;
        let mut idx = [0usize; 3];
        for k in 0..3 {
            let width = self.config.dim[k] / grid[k] as f64;
            idx[k] = ((x[k] / width) as usize).min(grid[k] - 1);
        }
        (idx[0] * grid[1] + idx[1]) * grid[2] + idx[2]
    }

    /// Sort one particle array into top-cell order, returning the bucket
    /// boundaries. `aux` follows the same permutation.
    fn sort_into_top_cells<T: Copy, A: Copy>(
        keys: Vec<usize>,
        items: &mut [T],
        mut aux: Option<&mut [A]>,
        nr_buckets: usize,
    ) -> Vec<usize> {
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by_key(|&i| keys[i]);

        let old_items: Vec<T> = items.to_vec();
        for (new_i, &old_i) in order.iter().enumerate() {
            items[new_i] = old_items[old_i];
        }
        if let Some(aux) = aux.as_deref_mut() {
            let old_aux: Vec<A> = aux.to_vec();
            for (new_i, &old_i) in order.iter().enumerate() {
                aux[new_i] = old_aux[old_i];
            }
        }

        let mut boundaries = vec![0usize; nr_buckets + 1];
        for &i in &order {
            boundaries[keys[i] + 1] += 1;
        }
        for k in 1..=nr_buckets {
            boundaries[k] += boundaries[k - 1];
        }
        boundaries
    }

    /// Discard the current decomposition and build a fresh one: bin the
    /// particles into the top-level grid, re-derive the cross-species
    /// links, subdivide every top cell down to the split threshold, and
    /// reset the motion envelopes.
    pub fn rebuild(&mut self, e: &Engine) {
        for c in std::mem::take(&mut self.top) {
            self.cells.recycle(c);
        }

        let grid = self.config.top_grid;
        let nr_top = grid[0] * grid[1] * grid[2];

        // Bin the particles.
        let part_keys: Vec<usize> = self.parts.iter().map(|p| self.top_cell_index(&p.x)).collect();
        let gpart_keys: Vec<usize> =
            self.gparts.iter().map(|gp| self.top_cell_index(&gp.x)).collect();
        let spart_keys: Vec<usize> =
            self.sparts.iter().map(|sp| self.top_cell_index(&sp.x)).collect();

        let part_bounds = Self::sort_into_top_cells(
            part_keys,
            &mut self.parts,
            Some(&mut self.xparts),
            nr_top,
        );
        relink_gparts_to_parts(&self.parts, 0, &mut self.gparts);

        let spart_bounds = Self::sort_into_top_cells::<SPart, XPart>(
            spart_keys,
            &mut self.sparts,
            None,
            nr_top,
        );
        relink_gparts_to_sparts(&self.sparts, 0, &mut self.gparts);

        let gpart_bounds = Self::sort_into_top_cells::<GPart, XPart>(
            gpart_keys,
            &mut self.gparts,
            None,
            nr_top,
        );
        relink_parts_to_gparts(&self.gparts, 0, &mut self.parts);
        relink_sparts_to_gparts(&self.gparts, 0, &mut self.sparts);

        // The envelopes restart from the new decomposition.
        for xp in &mut self.xparts {
            xp.x_diff = [0.0; 3];
            xp.x_diff_sort = [0.0; 3];
        }
        for gp in &mut self.gparts {
            gp.x_diff = [0.0; 3];
        }

        // Lay out the top-level grid. Ownership is a contiguous slab
        // decomposition along the first axis; on a single rank every
        // slab collapses onto node 0.
        let width = [
            self.config.dim[0] / grid[0] as f64,
            self.config.dim[1] / grid[1] as f64,
            self.config.dim[2] / grid[2] as f64,
        ];
        for i in 0..grid[0] {
            for j in 0..grid[1] {
                for k in 0..grid[2] {
                    let flat = (i * grid[1] + j) * grid[2] + k;
                    let loc = [i as f64 * width[0], j as f64 * width[1], k as f64 * width[2]];
                    let mut cell = Cell::new(loc, width, 0, None);
                    cell.node_id = ((i * e.nr_nodes as usize) / grid[0]) as i32;
                    cell.parts_offset = part_bounds[flat];
                    cell.count = part_bounds[flat + 1] - part_bounds[flat];
                    cell.gparts_offset = gpart_bounds[flat];
                    cell.gcount = gpart_bounds[flat + 1] - gpart_bounds[flat];
                    cell.sparts_offset = spart_bounds[flat];
                    cell.scount = spart_bounds[flat + 1] - spart_bounds[flat];
                    cell.ti_old_part = e.ti_current;
                    cell.ti_old_gpart = e.ti_current;
                    let id = self.cells.insert(cell);
                    self.top.push(id);
                }
            }
        }

        // Subdivide and stamp.
        for idx in 0..self.top.len() {
            let c = self.top[idx];
            self.split_recursive(c, e);
            sanitize(&mut self.cells, &mut self.parts, c, false);
            make_multipoles(&mut self.cells, &self.gparts, c, e.ti_current);
        }

        debug!(
            "space rebuilt: {} top-level cells, {} cells total",
            self.top.len(),
            self.cells.len()
        );
    }

    /// Keep subdividing a cell while it holds more particles than the
    /// split threshold.
    fn split_recursive(&mut self, c: CellId, e: &Engine) {
        let (count, gcount, depth) = {
            let cell = &self.cells[c];
            (cell.count, cell.gcount, cell.depth)
        };
        if (count <= self.config.split_size && gcount <= self.config.split_size)
            || depth >= self.config.max_depth
        {
            return;
        }

        let Space { cells, parts, xparts, gparts, sparts, .. } = self;
        split_cell(cells, c, parts, xparts, gparts, sparts);

        let progeny = self.cells[c].progeny;
        for child in progeny.into_iter().flatten() {
            {
                let cp = &mut self.cells[child];
                cp.ti_old_part = e.ti_current;
                cp.ti_old_gpart = e.ti_current;
            }
            self.split_recursive(child, e);
        }
    }
}
