use std::{fmt::Display, str::FromStr};

use hfvtx_core::HfvtxError;
use serde::{Deserialize, Serialize};

/// An n-sigma range wider than this on both sides turns the selection off.
const DISABLED_N_SIGMA: f64 = 999.0;

/// Particle hypotheses for which n-sigma values are stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PidSpecies {
    Pion,
    Proton,
}

impl Display for PidSpecies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PidSpecies::Pion => write!(f, "pion"),
            PidSpecies::Proton => write!(f, "proton"),
        }
    }
}

/// Outcome of an identification test.
///
/// The variants are ordered from least to most favourable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PidStatus {
    /// The detector has no information for the track, or the track is outside the momentum range
    /// where it is used.
    NotApplicable,
    Rejected,
    /// Outside the acceptance window but inside the wider window which defers the decision to
    /// the other detector.
    Conditional,
    Accepted,
}

impl PidStatus {
    pub fn is_accepted(&self) -> bool {
        *self == PidStatus::Accepted
    }
}

impl Display for PidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PidStatus::NotApplicable => write!(f, "not applicable"),
            PidStatus::Rejected => write!(f, "rejected"),
            PidStatus::Conditional => write!(f, "conditional"),
            PidStatus::Accepted => write!(f, "accepted"),
        }
    }
}

/// Which detectors are used to identify tracks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PidMode {
    /// The TPC alone.
    TpcOnly,
    /// Either detector may accept, see [`TrackSelectorPid::status_tpc_or_tof`].
    TpcOrTofCombined,
}

impl TryFrom<(bool, bool)> for PidMode {
    type Error = HfvtxError;

    /// Convert the pair of flags `(use_pid_tpc_only, use_pid_tpc_tof_combined)`. Exactly one of
    /// them must be set.
    fn try_from(flags: (bool, bool)) -> Result<Self, Self::Error> {
        match flags {
            (true, false) => Ok(PidMode::TpcOnly),
            (false, true) => Ok(PidMode::TpcOrTofCombined),
            (tpc_only, combined) => Err(HfvtxError::InvalidConfiguration {
                reason: format!(
                    "use_pid_tpc_only ({tpc_only}) and use_pid_tpc_tof_combined ({combined}) \
                     can't have the same value"
                ),
            }),
        }
    }
}

impl Display for PidMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PidMode::TpcOnly => write!(f, "tpc"),
            PidMode::TpcOrTofCombined => write!(f, "tpc-or-tof"),
        }
    }
}

impl FromStr for PidMode {
    type Err = HfvtxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "tpc" | "tpconly" | "tpc-only" => Ok(Self::TpcOnly),
            "tpc-or-tof" | "tpcortof" | "combined" => Ok(Self::TpcOrTofCombined),
            _ => Err(HfvtxError::ParseError {
                name: s.to_string(),
                object: "PidMode".to_string(),
            }),
        }
    }
}

/// Identification and detector-quality information of a reconstructed track.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidTrack {
    pub pt: f64,
    pub has_tpc: bool,
    pub has_tof: bool,
    pub tpc_n_sigma_pi: f64,
    pub tpc_n_sigma_pr: f64,
    pub tof_n_sigma_pi: f64,
    pub tof_n_sigma_pr: f64,
    pub tpc_n_clusters_found: i32,
    pub tpc_n_crossed_rows: i32,
    pub tpc_crossed_rows_over_findable: f64,
    pub tpc_chi2_per_cluster: f64,
    pub its_n_clusters: u8,
    pub its_n_clusters_inner_barrel: u8,
    pub its_chi2_per_cluster: f64,
}

impl Default for PidTrack {
    /// A track without detector information.
    fn default() -> Self {
        Self {
            pt: 0.0,
            has_tpc: false,
            has_tof: false,
            tpc_n_sigma_pi: -999.0,
            tpc_n_sigma_pr: -999.0,
            tof_n_sigma_pi: -999.0,
            tof_n_sigma_pr: -999.0,
            tpc_n_clusters_found: 0,
            tpc_n_crossed_rows: 0,
            tpc_crossed_rows_over_findable: 0.0,
            tpc_chi2_per_cluster: 0.0,
            its_n_clusters: 0,
            its_n_clusters_inner_barrel: 0,
            its_chi2_per_cluster: 0.0,
        }
    }
}

impl PidTrack {
    pub fn tpc_n_sigma(&self, species: PidSpecies) -> f64 {
        match species {
            PidSpecies::Pion => self.tpc_n_sigma_pi,
            PidSpecies::Proton => self.tpc_n_sigma_pr,
        }
    }

    pub fn tof_n_sigma(&self, species: PidSpecies) -> f64 {
        match species {
            PidSpecies::Pion => self.tof_n_sigma_pi,
            PidSpecies::Proton => self.tof_n_sigma_pr,
        }
    }
}

fn contains(range: (f64, f64), value: f64) -> bool {
    range.0 <= value && value <= range.1
}

fn is_disabled(range: (f64, f64)) -> bool {
    range.0 < -DISABLED_N_SIGMA && range.1 > DISABLED_N_SIGMA
}

/// n-sigma identification of one species with the TPC and TOF detectors.
///
/// Each detector has a transverse-momentum range in which it is used, an acceptance window, and
/// a conditional window: a track outside the acceptance window but inside the conditional one is
/// [`PidStatus::Conditional`] and may still be accepted in combination with the other detector.
/// All ranges are inclusive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSelectorPid {
    species: PidSpecies,
    pt_tpc: (f64, f64),
    n_sigma_tpc: (f64, f64),
    n_sigma_tpc_cond_tof: (f64, f64),
    pt_tof: (f64, f64),
    n_sigma_tof: (f64, f64),
    n_sigma_tof_cond_tpc: (f64, f64),
}

impl TrackSelectorPid {
    /// A selector accepting within 3 sigma in both detectors, for $`0.1 < p_T < 100`$ GeV, with
    /// no conditional windows.
    pub fn new(species: PidSpecies) -> Self {
        Self {
            species,
            pt_tpc: (0.1, 100.0),
            n_sigma_tpc: (-3.0, 3.0),
            n_sigma_tpc_cond_tof: (0.0, 0.0),
            pt_tof: (0.1, 100.0),
            n_sigma_tof: (-3.0, 3.0),
            n_sigma_tof_cond_tpc: (0.0, 0.0),
        }
    }

    pub fn species(&self) -> PidSpecies {
        self.species
    }

    pub fn with_range_pt_tpc(mut self, min: f64, max: f64) -> Self {
        self.pt_tpc = (min, max);
        self
    }

    pub fn with_range_n_sigma_tpc(mut self, min: f64, max: f64) -> Self {
        self.n_sigma_tpc = (min, max);
        self
    }

    pub fn with_range_n_sigma_tpc_cond_tof(mut self, min: f64, max: f64) -> Self {
        self.n_sigma_tpc_cond_tof = (min, max);
        self
    }

    pub fn with_range_pt_tof(mut self, min: f64, max: f64) -> Self {
        self.pt_tof = (min, max);
        self
    }

    pub fn with_range_n_sigma_tof(mut self, min: f64, max: f64) -> Self {
        self.n_sigma_tof = (min, max);
        self
    }

    pub fn with_range_n_sigma_tof_cond_tpc(mut self, min: f64, max: f64) -> Self {
        self.n_sigma_tof_cond_tpc = (min, max);
        self
    }

    pub fn is_valid_for_tpc(&self, track: &PidTrack) -> bool {
        track.has_tpc && contains(self.pt_tpc, track.pt)
    }

    pub fn is_valid_for_tof(&self, track: &PidTrack) -> bool {
        track.has_tof && contains(self.pt_tof, track.pt)
    }

    /// `(accepted, conditional)` for an n-sigma value.
    fn test_n_sigma(window: (f64, f64), conditional: (f64, f64), n_sigma: f64) -> (bool, bool) {
        if is_disabled(window) {
            return (true, false);
        }
        let conditional = is_disabled(conditional) || contains(conditional, n_sigma);
        (contains(window, n_sigma), conditional)
    }

    fn status_from(valid: bool, (accepted, conditional): (bool, bool)) -> PidStatus {
        if !valid {
            PidStatus::NotApplicable
        } else if accepted {
            PidStatus::Accepted
        } else if conditional {
            PidStatus::Conditional
        } else {
            PidStatus::Rejected
        }
    }

    pub fn status_tpc(&self, track: &PidTrack) -> PidStatus {
        Self::status_from(
            self.is_valid_for_tpc(track),
            Self::test_n_sigma(
                self.n_sigma_tpc,
                self.n_sigma_tpc_cond_tof,
                track.tpc_n_sigma(self.species),
            ),
        )
    }

    pub fn status_tof(&self, track: &PidTrack) -> PidStatus {
        Self::status_from(
            self.is_valid_for_tof(track),
            Self::test_n_sigma(
                self.n_sigma_tof,
                self.n_sigma_tof_cond_tpc,
                track.tof_n_sigma(self.species),
            ),
        )
    }

    /// Combined decision of both detectors: accepted when either accepts, or when both are
    /// conditional; rejected when either rejects; not applicable otherwise, which covers one
    /// detector not applying while the other is conditional.
    pub fn status_tpc_or_tof(&self, track: &PidTrack) -> PidStatus {
        match (self.status_tpc(track), self.status_tof(track)) {
            (PidStatus::Accepted, _) | (_, PidStatus::Accepted) => PidStatus::Accepted,
            (PidStatus::Conditional, PidStatus::Conditional) => PidStatus::Accepted,
            (PidStatus::Rejected, _) | (_, PidStatus::Rejected) => PidStatus::Rejected,
            _ => PidStatus::NotApplicable,
        }
    }

    pub fn status(&self, track: &PidTrack, mode: PidMode) -> PidStatus {
        match mode {
            PidMode::TpcOnly => self.status_tpc(track),
            PidMode::TpcOrTofCombined => self.status_tpc_or_tof(track),
        }
    }
}
