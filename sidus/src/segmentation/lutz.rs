//! Single-pass run-based region labeling.
//!
//! Rows are fed one at a time. Each row is split into runs of "on" pixels;
//! runs touching a region of the previous row join it, and a run touching
//! several regions merges them. A region that has no run on the current row
//! can never grow again and is emitted immediately, so working memory is
//! bounded by the image width, not its height.

use crate::config::Connectivity;
use crate::math::PixelCoordinate;

// ============================================================================
// Runs
// ============================================================================

/// A horizontal run of "on" pixels.
#[derive(Debug, Clone, Copy)]
struct Run {
    start: u32, // Starting x coordinate (inclusive)
    end: u32,   // Ending x coordinate (exclusive)
    region: u32,
}

impl Run {
    /// Window of previous-row x coordinates that can touch this run.
    #[inline]
    fn search_window(&self, connectivity: Connectivity) -> (u32, u32) {
        match connectivity {
            Connectivity::Four => (self.start, self.end),
            Connectivity::Eight => (self.start.saturating_sub(1), self.end + 1),
        }
    }
}

#[inline]
fn runs_connected(prev: &Run, curr: &Run, connectivity: Connectivity) -> bool {
    match connectivity {
        Connectivity::Four => prev.start < curr.end && prev.end > curr.start,
        Connectivity::Eight => prev.start < curr.end + 1 && prev.end + 1 > curr.start,
    }
}

fn extract_runs(on: &[bool], runs: &mut Vec<Run>) {
    runs.clear();
    let mut run_start = None;
    for (x, &is_on) in on.iter().enumerate() {
        match (is_on, run_start) {
            (true, None) => run_start = Some(x as u32),
            (false, Some(start)) => {
                runs.push(Run {
                    start,
                    end: x as u32,
                    region: 0,
                });
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push(Run {
            start,
            end: on.len() as u32,
            region: 0,
        });
    }
}

// ============================================================================
// Region slab
// ============================================================================

#[derive(Debug, Default)]
struct Region {
    pixels: Vec<PixelCoordinate>,
    /// Creation order; a merged region keeps the older value.
    seq: u64,
    y_min: usize,
}

/// Regions still being grown, addressed by slot. Merged slots point at their
/// survivor through `parent` until the end of the row, then get recycled.
#[derive(Debug, Default)]
struct RegionSlab {
    regions: Vec<Region>,
    parent: Vec<u32>,
    free: Vec<u32>,
    next_seq: u64,
}

impl RegionSlab {
    fn open(&mut self, y: usize) -> u32 {
        let region = Region {
            pixels: Vec::new(),
            seq: self.next_seq,
            y_min: y,
        };
        self.next_seq += 1;

        if let Some(slot) = self.free.pop() {
            self.regions[slot as usize] = region;
            self.parent[slot as usize] = slot;
            slot
        } else {
            let slot = self.regions.len() as u32;
            self.regions.push(region);
            self.parent.push(slot);
            slot
        }
    }

    fn find(&mut self, slot: u32) -> u32 {
        let mut root = slot;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut current = slot;
        while current != root {
            let next = self.parent[current as usize];
            self.parent[current as usize] = root;
            current = next;
        }
        root
    }

    /// Merge two roots; returns (survivor, absorbed).
    fn union(&mut self, a: u32, b: u32) -> (u32, u32) {
        let (keep, gone) = if self.regions[a as usize].pixels.len()
            >= self.regions[b as usize].pixels.len()
        {
            (a, b)
        } else {
            (b, a)
        };

        let absorbed = std::mem::take(&mut self.regions[gone as usize]);
        let survivor = &mut self.regions[keep as usize];
        survivor.pixels.extend(absorbed.pixels);
        survivor.seq = survivor.seq.min(absorbed.seq);
        survivor.y_min = survivor.y_min.min(absorbed.y_min);
        self.parent[gone as usize] = keep;
        (keep, gone)
    }

    fn release(&mut self, slot: u32) -> Region {
        self.parent[slot as usize] = slot;
        self.free.push(slot);
        std::mem::take(&mut self.regions[slot as usize])
    }
}

// ============================================================================
// Labeler
// ============================================================================

/// Incremental labeler over rows of a fixed width.
#[derive(Debug)]
pub struct LutzLabeler {
    width: usize,
    connectivity: Connectivity,
    row: usize,
    prev_runs: Vec<Run>,
    curr_runs: Vec<Run>,
    slab: RegionSlab,
    absorbed: Vec<u32>,
    closing: Vec<u32>,
}

impl LutzLabeler {
    pub fn new(width: usize, connectivity: Connectivity) -> Self {
        Self {
            width,
            connectivity,
            row: 0,
            prev_runs: Vec::new(),
            curr_runs: Vec::new(),
            slab: RegionSlab::default(),
            absorbed: Vec::new(),
            closing: Vec::new(),
        }
    }

    /// Index of the next row to be processed.
    pub fn row(&self) -> usize {
        self.row
    }

    /// Number of regions currently open.
    pub fn open_regions(&self) -> usize {
        self.slab.regions.len() - self.slab.free.len()
    }

    /// Lowest row a region emitted in the future can occupy.
    pub fn safe_line(&self) -> usize {
        self.prev_runs
            .iter()
            .map(|run| self.slab.regions[run.region as usize].y_min)
            .min()
            .unwrap_or(self.row)
    }

    /// Feed the next row. Regions closed by this row are appended to `closed`
    /// in creation order.
    pub fn process_row(&mut self, on: &[bool], closed: &mut Vec<Vec<PixelCoordinate>>) {
        assert_eq!(on.len(), self.width, "row width mismatch");
        let y = self.row;

        let mut curr_runs = std::mem::take(&mut self.curr_runs);
        extract_runs(on, &mut curr_runs);
        self.merge_runs_with_prev(&mut curr_runs, y);

        // Resolve labels after every merge of this row.
        for run in curr_runs.iter_mut() {
            run.region = self.slab.find(run.region);
        }
        for i in 0..self.prev_runs.len() {
            let root = self.slab.find(self.prev_runs[i].region);
            self.prev_runs[i].region = root;
        }

        self.closing.clear();
        for prev in &self.prev_runs {
            let continues = curr_runs.iter().any(|curr| curr.region == prev.region);
            if !continues && !self.closing.contains(&prev.region) {
                self.closing.push(prev.region);
            }
        }
        self.emit_closing(closed);

        for slot in self.absorbed.drain(..) {
            self.slab.release(slot);
        }

        self.curr_runs = std::mem::replace(&mut self.prev_runs, curr_runs);
        self.row += 1;
    }

    /// Close every open region; the labeler can be reused for a new image of
    /// the same width afterwards.
    pub fn finish(&mut self, closed: &mut Vec<Vec<PixelCoordinate>>) {
        self.closing.clear();
        for prev in &self.prev_runs {
            if !self.closing.contains(&prev.region) {
                self.closing.push(prev.region);
            }
        }
        self.emit_closing(closed);
        self.prev_runs.clear();
        self.row = 0;
    }

    fn merge_runs_with_prev(&mut self, curr_runs: &mut [Run], y: usize) {
        let connectivity = self.connectivity;
        let mut prev_idx = 0;

        for run in curr_runs.iter_mut() {
            let (search_start, search_end) = run.search_window(connectivity);

            while prev_idx < self.prev_runs.len() && self.prev_runs[prev_idx].end <= search_start
            {
                prev_idx += 1;
            }

            let mut assigned: Option<u32> = None;
            let mut check_idx = prev_idx;
            while check_idx < self.prev_runs.len()
                && self.prev_runs[check_idx].start < search_end
            {
                let prev_run = self.prev_runs[check_idx];
                if runs_connected(&prev_run, run, connectivity) {
                    let other = self.slab.find(prev_run.region);
                    assigned = match assigned {
                        None => Some(other),
                        Some(root) if root == other => Some(root),
                        Some(root) => {
                            let (keep, gone) = self.slab.union(root, other);
                            self.absorbed.push(gone);
                            Some(keep)
                        }
                    };
                }
                check_idx += 1;
            }

            let root = match assigned {
                Some(root) => root,
                None => self.slab.open(y),
            };
            let region = &mut self.slab.regions[root as usize];
            region
                .pixels
                .extend((run.start..run.end).map(|x| PixelCoordinate::new(x as usize, y)));
            run.region = root;
        }
    }

    fn emit_closing(&mut self, closed: &mut Vec<Vec<PixelCoordinate>>) {
        let slab = &self.slab;
        self.closing
            .sort_by_key(|&slot| slab.regions[slot as usize].seq);
        for &slot in &self.closing {
            closed.push(self.slab.release(slot).pixels);
        }
    }
}
