use indexmap::IndexMap;
use nalgebra::Vector3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    track::{cov_index, TrackState, COV_LEN},
    HfvtxError, HfvtxResult,
};

/// An event that can be used to test the vertexing chain. It contains a two-prong decay at
/// $`(0.5, 0.3, 0.2)`$ cm (tracks 0 and 1, opposite charges, $`p_T = 2`$ GeV) and a track from
/// another collision 25 cm down the beam (track 2) which does not form a vertex with either.
/// The tracks are meant for a 5 kG field.
pub fn test_event() -> Event {
    let vertex = Vector3::new(0.5, 0.3, 0.2);
    let cov = test_covariance();
    Event::new(
        0,
        vec![
            record_at(0, &vertex, 0.3, 0.1, 0.5, cov),
            record_at(1, &vertex, 0.8, -0.2, -0.5, cov),
            record_at(2, &Vector3::new(0.0, 0.0, 25.0), -1.2, 0.0, 1.25, cov),
        ],
    )
}

fn test_covariance() -> [f64; COV_LEN] {
    let mut cov = [0.0; COV_LEN];
    for (i, sigma) in [2e-3, 2e-3, 1e-4, 1e-4, 1e-3].iter().enumerate() {
        cov[cov_index(i, i)] = sigma * sigma;
    }
    cov
}

/// A record whose frame is aligned with the direction of motion at `position`.
fn record_at(
    index: usize,
    position: &Vector3<f64>,
    phi: f64,
    tgl: f64,
    q2pt: f64,
    cov: [f64; COV_LEN],
) -> TrackRecord {
    let (sp, cp) = phi.sin_cos();
    TrackRecord {
        index,
        x: position.x * cp + position.y * sp,
        alpha: phi,
        params: [-position.x * sp + position.y * cp, position.z, 0.0, tgl, q2pt],
        cov,
    }
}

/// An ordered, named collection of rows. Rows are addressed by their position and every lookup
/// is bounds-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table<T> {
    name: String,
    rows: Vec<T>,
}

impl<T> Table<T> {
    pub fn new<S: Into<String>>(name: S, rows: Vec<T>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// Returns [`HfvtxError::IndexOutOfRange`] if the table has no row `index`.
    pub fn get(&self, index: usize) -> HfvtxResult<&T> {
        self.rows.get(index).ok_or_else(|| HfvtxError::IndexOutOfRange {
            table: self.name.clone(),
            index,
            len: self.rows.len(),
        })
    }

    /// Append a row and return its index.
    pub fn push(&mut self, row: T) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    /// All unordered pairs of row indices `(i, j)` with `i < j`.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> {
        let n = self.rows.len();
        (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
    }
}

impl<'a, T> IntoIterator for &'a Table<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// A reconstructed track as stored in the per-event track table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Position of the track in the table.
    pub index: usize,
    pub x: f64,
    pub alpha: f64,
    /// `[y, z, snp, tgl, q2pt]`
    pub params: [f64; 5],
    /// Packed lower triangle of the parameter covariance.
    pub cov: [f64; COV_LEN],
}

impl TrackRecord {
    pub fn from_state(index: usize, state: &TrackState) -> Self {
        Self {
            index,
            x: state.x(),
            alpha: state.alpha(),
            params: *state.params(),
            cov: *state.cov(),
        }
    }

    /// The working [`TrackState`] of this record.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::DegenerateTrajectory`] for a record which is not a valid state.
    pub fn state(&self) -> HfvtxResult<TrackState> {
        TrackState::new(self.x, self.alpha, self.params, self.cov)
    }
}

pub type TrackTable = Table<TrackRecord>;

/// One collision: an id and the tracks reconstructed in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub tracks: TrackTable,
}

impl Event {
    pub fn new(id: u64, tracks: Vec<TrackRecord>) -> Self {
        Self {
            id,
            tracks: Table::new("tracks", tracks),
        }
    }
}

/// A reconstructed secondary vertex and the tracks which form it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecondaryVertexRecord {
    pub event_id: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub index0: usize,
    pub index1: usize,
    /// Third daughter of a three-prong vertex.
    pub index2: Option<usize>,
    /// Local `y` of each daughter at the vertex.
    pub tracky0: f64,
    pub tracky1: f64,
    pub tracky2: Option<f64>,
    pub chi2: f64,
}

impl SecondaryVertexRecord {
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn is_three_prong(&self) -> bool {
        self.index2.is_some()
    }
}

/// A two-prong decay candidate derived from a [`SecondaryVertexRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cand2ProngRecord {
    pub event_id: u64,
    /// Row of the secondary vertex within its event.
    pub vertex_row: usize,
    /// Invariant mass under the two-body hypothesis, in GeV.
    pub mass: f64,
    /// Transverse momentum of the pair, in GeV.
    pub pt: f64,
}

/// An append-only, thread-safe store of output rows keyed by event id.
///
/// Events are kept in the order in which they were first appended, which depends on scheduling
/// when appending from several threads; [`into_rows`](RecordCollector::into_rows) sorts by event
/// id.
#[derive(Debug)]
pub struct RecordCollector<T> {
    rows: Mutex<IndexMap<u64, Vec<T>>>,
}

impl<T> Default for RecordCollector<T> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(IndexMap::new()),
        }
    }
}

impl<T> RecordCollector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows for an event. An event is registered even when it contributes no rows.
    pub fn append<I: IntoIterator<Item = T>>(&self, event_id: u64, rows: I) {
        let mut guard = self.rows.lock();
        guard.entry(event_id).or_default().extend(rows);
    }

    /// Total number of rows over all events.
    pub fn len(&self) -> usize {
        self.rows.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events seen.
    pub fn n_events(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn rows_for(&self, event_id: u64) -> Vec<T>
    where
        T: Clone,
    {
        self.rows
            .lock()
            .get(&event_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn into_inner(self) -> IndexMap<u64, Vec<T>> {
        self.rows.into_inner()
    }

    /// All rows, ordered by event id and by append order within an event.
    pub fn into_rows(self) -> Vec<T> {
        let mut rows = self.rows.into_inner();
        rows.sort_keys();
        rows.into_values().flatten().collect()
    }
}
