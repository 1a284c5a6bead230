//! Exact Vietoris-Rips Persistence over a Sparse Filtration
//!
//! Built-in engine behind [`PersistenceSolver`]. It follows the standard
//! algorithm:
//!
//! 1. Read vertex births from the diagonal and edge lengths from the
//!    off-diagonal entries (absent entries are no edge)
//! 2. Enumerate the clique complex up to dimension `max_dim + 1`; a simplex
//!    appears at the largest length among its edges
//! 3. Sort simplices by (birth, dimension, vertices)
//! 4. Reduce the boundary matrix over Z/2 with column additions
//! 5. Read persistence pairs off the pivots; unpaired creators are essential
//!
//! ## Reference
//!
//! Edelsbrunner, Letscher, Zomorodian (2002). "Topological Persistence
//! and Simplification". Discrete & Computational Geometry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::debug;

use super::solver::{PersistenceSolver, RawPersistence, SolverOptions};
use super::sparse::SparseFiltration;
use crate::error::{Result, TopologyError};

const NAME: &str = "rips";

/// Largest tolerated gap between the (i, j) and (j, i) values of an edge
const MIRROR_TOLERANCE: f64 = 1e-9;

/// A simplex in the filtration with its birth time
#[derive(Debug, Clone)]
struct FilteredSimplex {
    /// Vertex indices (sorted)
    vertices: Vec<usize>,
    /// Filtration value when simplex appears
    birth: f64,
}

impl FilteredSimplex {
    fn dimension(&self) -> usize {
        self.vertices.len() - 1
    }
}

/// Sparse column representation for boundary matrix
#[derive(Debug, Clone, Default)]
struct SparseColumn {
    rows: BTreeSet<usize>,
}

impl SparseColumn {
    fn is_zero(&self) -> bool {
        self.rows.is_empty()
    }

    /// Lowest (maximum) non-zero index
    fn low(&self) -> Option<usize> {
        self.rows.iter().next_back().copied()
    }

    /// Symmetric difference: addition in Z/2Z
    fn add_assign(&mut self, other: &SparseColumn) {
        for &row in &other.rows {
            if !self.rows.remove(&row) {
                self.rows.insert(row);
            }
        }
    }
}

/// Weighted graph read from the sparse filtration
struct FiltrationGraph {
    vertex_birth: Vec<f64>,
    edges: HashMap<(usize, usize), f64>,
    /// Neighbours with a larger index
    upper: Vec<Vec<usize>>,
}

impl FiltrationGraph {
    fn from_sparse(filtration: &SparseFiltration) -> Result<Self> {
        let n = filtration.n_nodes();
        let mut vertex_birth = vec![0.0; n];
        let mut lengths: HashMap<(usize, usize), f64> = HashMap::new();
        let mut seen: HashSet<(usize, usize)> = HashSet::with_capacity(filtration.nnz());

        for e in filtration.entries() {
            if e.row >= n || e.col >= n {
                return Err(TopologyError::solver(
                    NAME,
                    format!("entry ({}, {}) outside a {n}×{n} matrix", e.row, e.col),
                ));
            }
            if !e.value.is_finite() {
                return Err(TopologyError::solver(
                    NAME,
                    format!("entry ({}, {}) has non-finite value {}", e.row, e.col, e.value),
                ));
            }
            if !seen.insert((e.row, e.col)) {
                return Err(TopologyError::solver(
                    NAME,
                    format!("entry ({}, {}) appears more than once", e.row, e.col),
                ));
            }
            if e.row == e.col {
                vertex_birth[e.row] = e.value;
                continue;
            }

            let key = (e.row.min(e.col), e.row.max(e.col));
            match lengths.get_mut(&key) {
                Some(mirror) if (*mirror - e.value).abs() > MIRROR_TOLERANCE => {
                    return Err(TopologyError::solver(
                        NAME,
                        format!(
                            "entries ({}, {}) = {} and ({}, {}) = {} disagree",
                            e.row, e.col, e.value, e.col, e.row, mirror
                        ),
                    ));
                }
                Some(mirror) => *mirror = mirror.min(e.value),
                None => {
                    lengths.insert(key, e.value);
                }
            }
        }

        let mut upper = vec![Vec::new(); n];
        let mut edges = HashMap::with_capacity(lengths.len());
        for ((i, j), d) in lengths {
            // An edge cannot appear before its endpoints
            let birth = d.max(vertex_birth[i]).max(vertex_birth[j]);
            edges.insert((i, j), birth);
            upper[i].push(j);
        }
        for list in &mut upper {
            list.sort_unstable();
        }

        Ok(Self {
            vertex_birth,
            edges,
            upper,
        })
    }

    fn edge(&self, i: usize, j: usize) -> Option<f64> {
        self.edges.get(&(i.min(j), i.max(j))).copied()
    }

    /// Every clique with lowest vertex `v` and at most `max_vertices` vertices.
    fn cliques_from(
        &self,
        v: usize,
        max_vertices: usize,
        counter: &AtomicUsize,
        budget: usize,
    ) -> Vec<FilteredSimplex> {
        let mut out = Vec::new();
        let mut stack = vec![(vec![v], self.vertex_birth[v], self.upper[v].clone())];

        while let Some((clique, birth, candidates)) = stack.pop() {
            if counter.fetch_add(1, Ordering::Relaxed) >= budget {
                return out;
            }
            if clique.len() < max_vertices {
                for (pos, &w) in candidates.iter().enumerate() {
                    let mut grown_birth = birth.max(self.vertex_birth[w]);
                    let mut connected = true;
                    for &u in &clique {
                        match self.edge(u, w) {
                            Some(d) => grown_birth = grown_birth.max(d),
                            None => {
                                connected = false;
                                break;
                            }
                        }
                    }
                    if !connected {
                        continue;
                    }
                    let remaining: Vec<usize> = candidates[pos + 1..]
                        .iter()
                        .copied()
                        .filter(|&x| self.edge(w, x).is_some())
                        .collect();
                    let mut grown = clique.clone();
                    grown.push(w);
                    stack.push((grown, grown_birth, remaining));
                }
            }
            out.push(FilteredSimplex {
                vertices: clique,
                birth,
            });
        }
        out
    }
}

/// Exact in-process engine for sparse Vietoris-Rips filtrations
#[derive(Debug, Clone, Copy, Default)]
pub struct RipsSolver;

impl RipsSolver {
    pub fn new() -> Self {
        Self
    }
}

impl PersistenceSolver for RipsSolver {
    fn name(&self) -> &str {
        NAME
    }

    fn compute(
        &self,
        filtration: &SparseFiltration,
        options: &SolverOptions,
    ) -> Result<RawPersistence> {
        let max_dim = options.max_dim;
        let mut dgms: Vec<Vec<[f64; 2]>> = vec![Vec::new(); max_dim + 1];
        let graph = FiltrationGraph::from_sparse(filtration)?;
        let n = graph.vertex_birth.len();
        if n == 0 {
            return Ok(RawPersistence { dgms });
        }
        if options.collapse_edges {
            debug!("edge collapse is not performed by the rips engine; diagrams are identical");
        }

        // Step 1: clique complex up to max_dim + 1, vertices in parallel
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.n_threads.unwrap_or(0))
            .build()
            .map_err(|e| TopologyError::solver(NAME, format!("thread pool: {e}")))?;
        let budget = options.max_simplices.unwrap_or(usize::MAX);
        let counter = AtomicUsize::new(0);
        let max_vertices = max_dim + 2;

        let mut simplices: Vec<FilteredSimplex> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .flat_map_iter(|v| graph.cliques_from(v, max_vertices, &counter, budget))
                .collect()
        });
        if counter.load(Ordering::Relaxed) > budget {
            return Err(TopologyError::solver(
                NAME,
                format!("simplex budget of {budget} exhausted (resource limit)"),
            ));
        }

        // Step 2: sort by (birth, dimension, lexicographic vertices)
        simplices.sort_by(|a, b| {
            a.birth
                .total_cmp(&b.birth)
                .then(a.dimension().cmp(&b.dimension()))
                .then(a.vertices.cmp(&b.vertices))
        });

        let simplex_index: HashMap<&[usize], usize> = simplices
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.vertices.as_slice(), idx))
            .collect();

        debug!(n, simplices = simplices.len(), max_dim, "reducing boundary matrix");

        // Step 3: build and reduce boundary matrix
        let m = simplices.len();
        let mut columns: Vec<SparseColumn> = Vec::with_capacity(m);
        let mut low_to_col: HashMap<usize, usize> = HashMap::new();

        for (col_idx, simplex) in simplices.iter().enumerate() {
            let mut boundary = SparseColumn::default();

            if simplex.dimension() > 0 {
                for skip in 0..simplex.vertices.len() {
                    let face: Vec<usize> = simplex
                        .vertices
                        .iter()
                        .enumerate()
                        .filter(|&(k, _)| k != skip)
                        .map(|(_, &v)| v)
                        .collect();
                    if let Some(&face_idx) = simplex_index.get(face.as_slice()) {
                        if !boundary.rows.remove(&face_idx) {
                            boundary.rows.insert(face_idx);
                        }
                    }
                }
            }

            while let Some(low_idx) = boundary.low() {
                match low_to_col.get(&low_idx) {
                    Some(&pivot_col) => boundary.add_assign(&columns[pivot_col]),
                    None => break,
                }
            }
            if let Some(low_idx) = boundary.low() {
                low_to_col.insert(low_idx, col_idx);
            }
            columns.push(boundary);
        }

        // Step 4: extract persistence pairs
        let mut paired = vec![false; m];
        for (col_idx, column) in columns.iter().enumerate() {
            if let Some(low_idx) = column.low() {
                let birth_simplex = &simplices[low_idx];
                let death_simplex = &simplices[col_idx];
                paired[low_idx] = true;
                paired[col_idx] = true;

                let dim = birth_simplex.dimension();
                if dim <= max_dim && death_simplex.birth > birth_simplex.birth {
                    dgms[dim].push([birth_simplex.birth, death_simplex.birth]);
                }
            }
        }

        // Essential classes: unpaired creators within the reported range
        for (idx, simplex) in simplices.iter().enumerate() {
            let dim = simplex.dimension();
            if dim <= max_dim && !paired[idx] && columns[idx].is_zero() {
                dgms[dim].push([simplex.birth, f64::INFINITY]);
            }
        }

        Ok(RawPersistence { dgms })
    }
}
