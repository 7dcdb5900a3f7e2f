//! Inter-search collaborator and history-based motion vector prediction.
//!
//! Motion search, merge derivation and motion compensation live outside this
//! crate. The quadtree search drives them through [`InterSearch`] and owns
//! only the bookkeeping it is responsible for: the per-LCU-row HMVP table,
//! which it snapshots before speculative evaluation and updates on commit.

use std::fmt::Debug;

use parking_lot::{Mutex, MutexGuard};

use crate::config::{FrameParams, SearchConfig};
use crate::cu::{CuInfo, InterInfo, PartMode};
use crate::kernels::PixelKernels;
use crate::picture::Picture;
use crate::work_tree::Lcu;

/// Maximum number of HMVP candidates per LCU row.
pub const MAX_NUM_HMVP_CANDS: usize = 5;

/// History of the motion of recently coded inter CUs in one LCU row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HmvpRow {
    entries: Vec<InterInfo>,
}

impl HmvpRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_NUM_HMVP_CANDS),
        }
    }

    /// Candidates, oldest first.
    pub fn entries(&self) -> &[InterInfo] {
        &self.entries
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the row holds no candidates.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every candidate.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record the motion of a committed CU. Intra CUs are ignored.
    ///
    /// An identical candidate is moved to the newest position; otherwise the
    /// oldest candidate makes room once the row is full.
    pub fn add(&mut self, cu: &CuInfo) {
        if !cu.is_inter() {
            return;
        }
        if let Some(pos) = self.entries.iter().position(|e| *e == cu.inter) {
            self.entries.remove(pos);
        } else if self.entries.len() == MAX_NUM_HMVP_CANDS {
            self.entries.remove(0);
        }
        self.entries.push(cu.inter);
    }
}

/// One [`HmvpRow`] per LCU row of a picture.
///
/// Rows are locked independently so that wavefront workers on different rows
/// do not contend.
#[derive(Debug, Default)]
pub struct HmvpTable {
    rows: Vec<Mutex<HmvpRow>>,
}

impl HmvpTable {
    /// Create a table with `lcu_rows` empty rows.
    pub fn new(lcu_rows: usize) -> Self {
        Self {
            rows: (0..lcu_rows).map(|_| Mutex::new(HmvpRow::new())).collect(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Lock the row of LCU row `row`.
    pub fn lock_row(&self, row: usize) -> MutexGuard<'_, HmvpRow> {
        self.rows[row].lock()
    }

    /// Empty every row.
    pub fn reset(&self) {
        for row in &self.rows {
            row.lock().clear();
        }
    }
}

/// Read-only state an inter search can consult.
#[derive(Debug, Clone, Copy)]
pub struct InterContext<'a> {
    /// Search configuration.
    pub cfg: &'a SearchConfig,
    /// Per-picture parameters.
    pub frame: &'a FrameParams,
    /// Picture under search.
    pub pic: &'a Picture,
    /// HMVP candidates of the LCU row.
    pub hmvp: &'a HmvpRow,
    /// Pixel kernels.
    pub kernels: &'a PixelKernels,
}

/// Outcome of an inter mode search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterCandidate {
    /// Estimated RD cost of the best candidate.
    pub cost: f64,
    /// Estimated bits of its motion information.
    pub bitcost: u32,
}

impl InterCandidate {
    /// A candidate that never wins.
    pub const NONE: Self = Self {
        cost: f64::INFINITY,
        bitcost: u32::MAX,
    };
}

/// Inter prediction collaborator.
///
/// Every method receives picture luma coordinates of a square CU of width
/// `LCU_WIDTH >> depth`. Results are written to the CU record at the CU's
/// top-left SCU in the given [`Lcu`].
pub trait InterSearch: Send + Debug {
    /// Search 2Nx2N inter modes. Sets the motion fields of the CU record
    /// (`merged`, `skipped`, `merge_idx`, `inter`) but not its type.
    fn search_cu_inter(&mut self, ctx: &InterContext<'_>, x: usize, y: usize, depth: u8, lcu: &mut Lcu) -> InterCandidate;

    /// Search the partition `part_mode` into `lcu`, the next level of the
    /// work tree. On success every PU record in `lcu` is complete.
    fn search_cu_smp(
        &mut self,
        ctx: &InterContext<'_>,
        x: usize,
        y: usize,
        depth: u8,
        part_mode: PartMode,
        lcu: &mut Lcu,
    ) -> InterCandidate;

    /// Motion compensate the CU into the LCU reconstruction.
    fn recon_cu(&mut self, ctx: &InterContext<'_>, lcu: &mut Lcu, x: usize, y: usize, width: usize, luma: bool, chroma: bool);
}

/// Inter search for intra-only coding. Never produces a candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterSearch;

impl InterSearch for NoInterSearch {
    fn search_cu_inter(&mut self, _ctx: &InterContext<'_>, _x: usize, _y: usize, _depth: u8, _lcu: &mut Lcu) -> InterCandidate {
        InterCandidate::NONE
    }

    fn search_cu_smp(
        &mut self,
        _ctx: &InterContext<'_>,
        _x: usize,
        _y: usize,
        _depth: u8,
        _part_mode: PartMode,
        _lcu: &mut Lcu,
    ) -> InterCandidate {
        InterCandidate::NONE
    }

    fn recon_cu(&mut self, _ctx: &InterContext<'_>, _lcu: &mut Lcu, _x: usize, _y: usize, _width: usize, _luma: bool, _chroma: bool) {}
}
