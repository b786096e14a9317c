use std::{fmt::Display, str::FromStr};

use hfvtx_core::{
    utils::constants::{MASS_KAON, MASS_PION, MASS_PROTON},
    Cand2ProngRecord, HfvtxError, HfvtxResult, Propagator, SecondaryVertexRecord, TrackState,
    TrackTable, VertexCandidate,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Mass assignments for the two daughters of a two-body decay, in the order the daughters are
/// stored in the vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoBodyHypothesis {
    pub mass0: f64,
    pub mass1: f64,
}

impl TwoBodyHypothesis {
    pub const fn new(mass0: f64, mass1: f64) -> Self {
        Self { mass0, mass1 }
    }
    pub const fn pion_pion() -> Self {
        Self::new(MASS_PION, MASS_PION)
    }
    pub const fn kaon_pion() -> Self {
        Self::new(MASS_KAON, MASS_PION)
    }
    pub const fn pion_kaon() -> Self {
        Self::new(MASS_PION, MASS_KAON)
    }
    pub const fn proton_pion() -> Self {
        Self::new(MASS_PROTON, MASS_PION)
    }
}

impl Default for TwoBodyHypothesis {
    fn default() -> Self {
        Self::kaon_pion()
    }
}

impl Display for TwoBodyHypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6} GeV, {:.6} GeV)", self.mass0, self.mass1)
    }
}

impl FromStr for TwoBodyHypothesis {
    type Err = HfvtxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "pipi" | "pionpion" => Ok(Self::pion_pion()),
            "kpi" | "kaonpion" => Ok(Self::kaon_pion()),
            "pik" | "pionkaon" => Ok(Self::pion_kaon()),
            "ppi" | "protonpion" => Ok(Self::proton_pion()),
            _ => Err(HfvtxError::ParseError {
                name: s.to_string(),
                object: "TwoBodyHypothesis".to_string(),
            }),
        }
    }
}

/// Invariant mass and transverse momentum of a pair of tracks under a mass hypothesis. `None`
/// when either track has no measured curvature and therefore no finite momentum.
pub fn pair_kinematics(
    track_a: &TrackState,
    track_b: &TrackState,
    hypothesis: &TwoBodyHypothesis,
) -> Option<(f64, f64)> {
    if !(track_a.pt().is_finite() && track_b.pt().is_finite()) {
        return None;
    }
    let pair = track_a.p4(hypothesis.mass0) + track_b.p4(hypothesis.mass1);
    Some((pair.m(), pair.pt()))
}

/// The records produced from one accepted vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssembledCandidate {
    pub vertex: SecondaryVertexRecord,
    /// Present when a hypothesis is configured and both tracks have a finite momentum.
    pub two_prong: Option<Cand2ProngRecord>,
}

/// Builds output records from [`VertexCandidate`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAssembler {
    hypothesis: Option<TwoBodyHypothesis>,
    max_third_dca: f64,
}

impl Default for CandidateAssembler {
    fn default() -> Self {
        Self {
            hypothesis: Some(TwoBodyHypothesis::default()),
            max_third_dca: 10.0,
        }
    }
}

impl CandidateAssembler {
    pub fn new(hypothesis: Option<TwoBodyHypothesis>) -> Self {
        Self {
            hypothesis,
            ..Default::default()
        }
    }

    /// Largest distance (cm) between a third track and a two-prong vertex for the three of
    /// them to be kept as a three-prong vertex.
    pub fn with_max_third_dca(mut self, max_third_dca: f64) -> Self {
        self.max_third_dca = max_third_dca;
        self
    }

    pub fn hypothesis(&self) -> Option<&TwoBodyHypothesis> {
        self.hypothesis.as_ref()
    }

    /// Records for a two-prong vertex. `vertex_row` is the row the vertex record will occupy in
    /// its event and is referenced by the two-prong candidate.
    pub fn assemble(
        &self,
        event_id: u64,
        vertex_row: usize,
        candidate: &VertexCandidate,
        index_a: usize,
        index_b: usize,
    ) -> AssembledCandidate {
        let [track_a, track_b] = &candidate.tracks;
        let vertex = SecondaryVertexRecord {
            event_id,
            x: candidate.position.x,
            y: candidate.position.y,
            z: candidate.position.z,
            index0: index_a,
            index1: index_b,
            index2: None,
            tracky0: track_a.y(),
            tracky1: track_b.y(),
            tracky2: None,
            chi2: candidate.chi2,
        };
        let two_prong = self.hypothesis.as_ref().and_then(|hypothesis| {
            pair_kinematics(track_a, track_b, hypothesis).map(|(mass, pt)| Cand2ProngRecord {
                event_id,
                vertex_row,
                mass,
                pt,
            })
        });
        AssembledCandidate { vertex, two_prong }
    }

    /// Extend a two-prong vertex with a third track.
    ///
    /// The third track is moved to its closest approach to the two-prong vertex; the vertex
    /// position is not refitted. Returns `Ok(None)` when the third track passes further than the
    /// configured distance.
    ///
    /// # Errors
    ///
    /// Propagation failures of the third track are returned as they are; they are recoverable
    /// (see [`HfvtxError::is_recoverable`]).
    pub fn assemble_three_prong(
        &self,
        event_id: u64,
        candidate: &VertexCandidate,
        indices: (usize, usize),
        third: &TrackState,
        index_c: usize,
        propagator: &Propagator,
    ) -> HfvtxResult<Option<SecondaryVertexRecord>> {
        let third_at = propagator.propagate_to_dca(third, &candidate.position)?;
        let distance = (third_at.global_position() - candidate.position).norm();
        if distance > self.max_third_dca {
            trace!("third track {index_c} passes {distance:.3} cm from the vertex");
            return Ok(None);
        }
        let mut vertex = self
            .assemble(event_id, 0, candidate, indices.0, indices.1)
            .vertex;
        vertex.index2 = Some(index_c);
        vertex.tracky2 = Some(third_at.y());
        Ok(Some(vertex))
    }
}

/// Rebuild a two-prong candidate from a stored vertex and the event's track table.
///
/// Both daughters are looked up by index, moved to their closest approach to the stored vertex,
/// and combined under `hypothesis`. Returns `Ok(None)` when a daughter has no finite momentum.
///
/// # Errors
///
/// Returns [`HfvtxError::IndexOutOfRange`] if the record refers to tracks which are not in the
/// table, and propagation errors as they are.
pub fn build_two_prong(
    record: &SecondaryVertexRecord,
    vertex_row: usize,
    tracks: &TrackTable,
    propagator: &Propagator,
    hypothesis: &TwoBodyHypothesis,
) -> HfvtxResult<Option<Cand2ProngRecord>> {
    let position = record.position();
    let track_a = propagator.propagate_to_dca(&tracks.get(record.index0)?.state()?, &position)?;
    let track_b = propagator.propagate_to_dca(&tracks.get(record.index1)?.state()?, &position)?;
    Ok(
        pair_kinematics(&track_a, &track_b, hypothesis).map(|(mass, pt)| Cand2ProngRecord {
            event_id: record.event_id,
            vertex_row,
            mass,
            pt,
        }),
    )
}
