//! Selection of charm baryons decaying to $`\Xi^\mp\pi^\pm`$.
//!
//! The decay chain is $`\Xi_c^0 \to \Xi^-\pi^+`$, $`\Xi^- \to \Lambda\pi^-`$,
//! $`\Lambda \to p\pi^-`$ (and the charge conjugate). A candidate carries the topology and
//! kinematics computed when it was built, and refers to its four tracks by index: the three
//! light-flavour daughters (the two $`\Lambda`$ daughters and the pion from the $`\Xi`$) in one
//! table, and the pion from the charm baryon in another.
//!
//! [`XiPiSelector::select`] is a pure function from a candidate to an [`XiPiSelection`] holding
//! every verdict by name. Quality-assurance histograms are filled from a selection in a separate
//! step with [`fill_selection_qa`].

use hfvtx_core::{
    utils::constants::{MASS_LAMBDA, MASS_XI_MINUS},
    Configuration, HfvtxError, HfvtxResult, HistogramRegistry, QaSink, Table,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    pid::{PidMode, PidSpecies, PidStatus, PidTrack, TrackSelectorPid},
    quality::{is_selected_its_quality, is_selected_tpc_quality, ItsQuality, TpcQuality},
};

/// Bits of [`XiPiSelection::info_tpc_stored`] and [`XiPiSelection::info_tof_stored`].
pub mod info_bits {
    pub const PI_FROM_LAMBDA: u8 = 0;
    pub const PR_FROM_LAMBDA: u8 = 1;
    pub const PI_FROM_CASCADE: u8 = 2;
    pub const PI_FROM_CHARM: u8 = 3;
}

/// A charm-baryon candidate as produced by the candidate builder.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XiPiCandidate {
    /// Charge sign of the pion from the cascade; positive for the antiparticle decay.
    pub sign_decay: i8,
    /// Positive $`\Lambda`$ daughter, in the light-flavour track table.
    pub pos_track_id: usize,
    /// Negative $`\Lambda`$ daughter, in the light-flavour track table.
    pub neg_track_id: usize,
    /// Pion from the cascade, in the light-flavour track table.
    pub bachelor_id: usize,
    /// Pion from the charm baryon, in the charm track table.
    pub bachelor_from_charm_baryon_id: usize,
    pub eta_v0_pos_dau: f64,
    pub eta_v0_neg_dau: f64,
    pub eta_bach_from_casc: f64,
    pub eta_bach_from_charm_baryon: f64,
    pub x_decay_vtx_cascade: f64,
    pub y_decay_vtx_cascade: f64,
    pub x_decay_vtx_v0: f64,
    pub y_decay_vtx_v0: f64,
    pub cos_pa_casc: f64,
    pub cos_pa_v0: f64,
    pub dca_casc_dau: f64,
    pub dca_v0_dau: f64,
    pub dca_charm_baryon_dau: f64,
    /// Transverse DCA of the positive $`\Lambda`$ daughter to the primary vertex.
    pub dca_xy_to_pv_v0_dau0: f64,
    /// Transverse DCA of the negative $`\Lambda`$ daughter to the primary vertex.
    pub dca_xy_to_pv_v0_dau1: f64,
    pub dca_xy_to_pv_casc_dau: f64,
    pub impact_par_bach_from_charm_baryon_xy: f64,
    pub impact_par_bach_from_charm_baryon_z: f64,
    pub impact_par_casc_xy: f64,
    pub impact_par_casc_z: f64,
    pub px_bach_from_casc: f64,
    pub py_bach_from_casc: f64,
    pub px_bach_from_charm_baryon: f64,
    pub py_bach_from_charm_baryon: f64,
    pub inv_mass_lambda: f64,
    pub inv_mass_cascade: f64,
    pub inv_mass_charm_baryon: f64,
}

/// Settings of the [`XiPiSelector`]. Distances are in cm, momenta and masses in GeV.
///
/// PID is configured with two flags, exactly one of which must be set (see [`PidMode`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub radius_casc_min: f64,
    pub radius_v0_min: f64,
    pub cos_pa_v0_min: f64,
    pub cos_pa_casc_min: f64,
    pub dca_casc_dau_max: f64,
    pub dca_v0_dau_max: f64,
    pub dca_bach_to_pv_min: f64,
    pub dca_neg_to_pv_min: f64,
    pub dca_pos_to_pv_min: f64,
    pub v0_mass_window: f64,
    pub cascade_mass_window: f64,
    /// Apply the TPC quality requirements to the light-flavour daughters.
    pub apply_trk_sel_lf: bool,

    pub inv_mass_charm_baryon_min: f64,
    pub inv_mass_charm_baryon_max: f64,

    pub eta_track_charm_bach_max: f64,
    pub eta_track_lf_dau_max: f64,
    pub pt_pi_from_casc_min: f64,
    pub pt_pi_from_charm_baryon_min: f64,

    pub impact_parameter_xy_pi_from_charm_baryon_min: f64,
    pub impact_parameter_xy_pi_from_charm_baryon_max: f64,
    pub impact_parameter_z_pi_from_charm_baryon_min: f64,
    pub impact_parameter_z_pi_from_charm_baryon_max: f64,
    pub impact_parameter_xy_casc_min: f64,
    pub impact_parameter_xy_casc_max: f64,
    pub impact_parameter_z_casc_min: f64,
    pub impact_parameter_z_casc_max: f64,

    pub dca_charm_baryon_dau_max: f64,

    pub use_pid_tpc_only: bool,
    pub use_pid_tpc_tof_combined: bool,

    pub pt_pi_pid_tpc_min: f64,
    pub pt_pi_pid_tpc_max: f64,
    pub n_sigma_tpc_pi_max: f64,
    pub n_sigma_tpc_combined_pi_max: f64,
    pub pt_pr_pid_tpc_min: f64,
    pub pt_pr_pid_tpc_max: f64,
    pub n_sigma_tpc_pr_max: f64,
    pub n_sigma_tpc_combined_pr_max: f64,
    pub pt_pi_pid_tof_min: f64,
    pub pt_pi_pid_tof_max: f64,
    pub n_sigma_tof_pi_max: f64,
    pub n_sigma_tof_combined_pi_max: f64,
    pub pt_pr_pid_tof_min: f64,
    pub pt_pr_pid_tof_max: f64,
    pub n_sigma_tof_pr_max: f64,
    pub n_sigma_tof_combined_pr_max: f64,

    pub tpc_quality: TpcQuality,
    /// Applied to the pion from the charm baryon only.
    pub its_quality: ItsQuality,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            radius_casc_min: 0.6,
            radius_v0_min: 1.2,
            cos_pa_v0_min: 0.97,
            cos_pa_casc_min: 0.97,
            dca_casc_dau_max: 1.0,
            dca_v0_dau_max: 1.0,
            dca_bach_to_pv_min: 0.04,
            dca_neg_to_pv_min: 0.06,
            dca_pos_to_pv_min: 0.06,
            v0_mass_window: 0.01,
            cascade_mass_window: 0.01,
            apply_trk_sel_lf: true,
            inv_mass_charm_baryon_min: 2.0,
            inv_mass_charm_baryon_max: 3.1,
            eta_track_charm_bach_max: 0.8,
            eta_track_lf_dau_max: 1.0,
            pt_pi_from_casc_min: 0.15,
            pt_pi_from_charm_baryon_min: 0.2,
            impact_parameter_xy_pi_from_charm_baryon_min: 0.0,
            impact_parameter_xy_pi_from_charm_baryon_max: 10.0,
            impact_parameter_z_pi_from_charm_baryon_min: 0.0,
            impact_parameter_z_pi_from_charm_baryon_max: 10.0,
            impact_parameter_xy_casc_min: 0.0,
            impact_parameter_xy_casc_max: 10.0,
            impact_parameter_z_casc_min: 0.0,
            impact_parameter_z_casc_max: 10.0,
            dca_charm_baryon_dau_max: 2.0,
            use_pid_tpc_only: false,
            use_pid_tpc_tof_combined: true,
            pt_pi_pid_tpc_min: -1.0,
            pt_pi_pid_tpc_max: 9999.9,
            n_sigma_tpc_pi_max: 3.0,
            n_sigma_tpc_combined_pi_max: 0.0,
            pt_pr_pid_tpc_min: -1.0,
            pt_pr_pid_tpc_max: 9999.9,
            n_sigma_tpc_pr_max: 3.0,
            n_sigma_tpc_combined_pr_max: 0.0,
            pt_pi_pid_tof_min: -1.0,
            pt_pi_pid_tof_max: 9999.9,
            n_sigma_tof_pi_max: 3.0,
            n_sigma_tof_combined_pi_max: 0.0,
            pt_pr_pid_tof_min: -1.0,
            pt_pr_pid_tof_max: 9999.9,
            n_sigma_tof_pr_max: 3.0,
            n_sigma_tof_combined_pr_max: 0.0,
            tpc_quality: TpcQuality::default(),
            its_quality: ItsQuality::default(),
        }
    }
}

impl SelectorConfig {
    /// The PID mode selected by the two flags.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::InvalidConfiguration`] if both or neither flag is set.
    pub fn pid_mode(&self) -> HfvtxResult<PidMode> {
        PidMode::try_from((self.use_pid_tpc_only, self.use_pid_tpc_tof_combined))
    }

    fn pion_selector(&self) -> TrackSelectorPid {
        TrackSelectorPid::new(PidSpecies::Pion)
            .with_range_pt_tpc(self.pt_pi_pid_tpc_min, self.pt_pi_pid_tpc_max)
            .with_range_n_sigma_tpc(-self.n_sigma_tpc_pi_max, self.n_sigma_tpc_pi_max)
            .with_range_n_sigma_tpc_cond_tof(
                -self.n_sigma_tpc_combined_pi_max,
                self.n_sigma_tpc_combined_pi_max,
            )
            .with_range_pt_tof(self.pt_pi_pid_tof_min, self.pt_pi_pid_tof_max)
            .with_range_n_sigma_tof(-self.n_sigma_tof_pi_max, self.n_sigma_tof_pi_max)
            .with_range_n_sigma_tof_cond_tpc(
                -self.n_sigma_tof_combined_pi_max,
                self.n_sigma_tof_combined_pi_max,
            )
    }

    fn proton_selector(&self) -> TrackSelectorPid {
        TrackSelectorPid::new(PidSpecies::Proton)
            .with_range_pt_tpc(self.pt_pr_pid_tpc_min, self.pt_pr_pid_tpc_max)
            .with_range_n_sigma_tpc(-self.n_sigma_tpc_pr_max, self.n_sigma_tpc_pr_max)
            .with_range_n_sigma_tpc_cond_tof(
                -self.n_sigma_tpc_combined_pr_max,
                self.n_sigma_tpc_combined_pr_max,
            )
            .with_range_pt_tof(self.pt_pr_pid_tof_min, self.pt_pr_pid_tof_max)
            .with_range_n_sigma_tof(-self.n_sigma_tof_pr_max, self.n_sigma_tof_pr_max)
            .with_range_n_sigma_tof_cond_tpc(
                -self.n_sigma_tof_combined_pr_max,
                self.n_sigma_tof_combined_pr_max,
            )
    }
}

impl Configuration for SelectorConfig {
    fn validate(&self) -> HfvtxResult<()> {
        self.pid_mode()?;
        let ranges = [
            (
                "inv_mass_charm_baryon",
                self.inv_mass_charm_baryon_min,
                self.inv_mass_charm_baryon_max,
            ),
            (
                "impact_parameter_xy_pi_from_charm_baryon",
                self.impact_parameter_xy_pi_from_charm_baryon_min,
                self.impact_parameter_xy_pi_from_charm_baryon_max,
            ),
            (
                "impact_parameter_z_pi_from_charm_baryon",
                self.impact_parameter_z_pi_from_charm_baryon_min,
                self.impact_parameter_z_pi_from_charm_baryon_max,
            ),
            (
                "impact_parameter_xy_casc",
                self.impact_parameter_xy_casc_min,
                self.impact_parameter_xy_casc_max,
            ),
            (
                "impact_parameter_z_casc",
                self.impact_parameter_z_casc_min,
                self.impact_parameter_z_casc_max,
            ),
        ];
        for (name, min, max) in ranges {
            if !(min <= max) {
                return Err(HfvtxError::InvalidConfiguration {
                    reason: format!("{name}_min ({min}) is larger than {name}_max ({max})"),
                });
            }
        }
        if !(self.v0_mass_window > 0.0 && self.cascade_mass_window > 0.0) {
            return Err(HfvtxError::InvalidConfiguration {
                reason: "v0_mass_window and cascade_mass_window must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// n-sigma values of the four daughters, each for its own species hypothesis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PidInfo {
    pub tpc_n_sigma_pi_from_charm_baryon: f64,
    pub tpc_n_sigma_pi_from_casc: f64,
    pub tpc_n_sigma_pi_from_lambda: f64,
    pub tpc_n_sigma_pr_from_lambda: f64,
    pub tof_n_sigma_pi_from_charm_baryon: f64,
    pub tof_n_sigma_pi_from_casc: f64,
    pub tof_n_sigma_pi_from_lambda: f64,
    pub tof_n_sigma_pr_from_lambda: f64,
}

/// Every verdict of the selection of one candidate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct XiPiSelection {
    pub sign_decay: i8,
    pub eta_pos_v0_dau: bool,
    pub eta_neg_v0_dau: bool,
    pub eta_pi_from_casc: bool,
    pub eta_pi_from_charm: bool,
    pub radius_casc: bool,
    pub radius_v0: bool,
    pub cos_pa_casc: bool,
    pub cos_pa_v0: bool,
    pub dca_casc_dau: bool,
    pub dca_v0_dau: bool,
    pub dca_charm_dau: bool,
    pub dca_xy_to_pv_v0_daughters: bool,
    pub dca_xy_to_pv_pi_from_casc: bool,
    pub impact_parameter_xy_pi_from_charm: bool,
    pub impact_parameter_z_pi_from_charm: bool,
    pub impact_parameter_xy_casc: bool,
    pub impact_parameter_z_casc: bool,
    pub pt_pi_from_casc: bool,
    pub pt_pi_from_charm: bool,
    /// `None` when the light-flavour track selection is switched off.
    pub tpc_quality_pi_from_lambda: Option<bool>,
    pub tpc_quality_pr_from_lambda: Option<bool>,
    pub tpc_quality_pi_from_casc: Option<bool>,
    pub tpc_quality_pi_from_charm: bool,
    pub its_quality_pi_from_charm: bool,
    /// All of the topological, kinematic, and track-quality verdicts above.
    pub result_selections: bool,

    pub status_pid_pr_from_lambda: PidStatus,
    pub status_pid_pi_from_lambda: PidStatus,
    pub status_pid_pi_from_casc: PidStatus,
    pub status_pid_pi_from_charm_baryon: PidStatus,
    /// Both $`\Lambda`$ daughters are identified.
    pub status_pid_lambda: bool,
    /// The $`\Lambda`$ daughters and the pion from the cascade are identified.
    pub status_pid_cascade: bool,
    /// All four daughters are identified.
    pub status_pid_charm_baryon: bool,

    pub status_inv_mass_lambda: bool,
    pub status_inv_mass_cascade: bool,
    pub status_inv_mass_charm_baryon: bool,

    /// Bit mask of the daughters with TPC information, see [`info_bits`].
    pub info_tpc_stored: u8,
    /// Bit mask of the daughters with TOF information, see [`info_bits`].
    pub info_tof_stored: u8,
    pub pid_info: PidInfo,
    pub inv_mass_charm_baryon: f64,
}

impl XiPiSelection {
    /// The verdicts which make up [`result_selections`](XiPiSelection::result_selections),
    /// labelled with the name of their QA histogram. Track-quality verdicts of the light-flavour
    /// daughters are left out when they were not evaluated.
    pub fn verdicts(&self) -> Vec<(&'static str, bool)> {
        let mut verdicts = vec![
            ("hSelEtaPosV0Dau", self.eta_pos_v0_dau),
            ("hSelEtaNegV0Dau", self.eta_neg_v0_dau),
            ("hSelEtaPiFromCasc", self.eta_pi_from_casc),
            ("hSelEtaPiFromCharm", self.eta_pi_from_charm),
            ("hSelRadCasc", self.radius_casc),
            ("hSelRadV0", self.radius_v0),
            ("hSelCosPACasc", self.cos_pa_casc),
            ("hSelCosPAV0", self.cos_pa_v0),
            ("hSelDCACascDau", self.dca_casc_dau),
            ("hSelDCAV0Dau", self.dca_v0_dau),
            ("hSelDCACharmDau", self.dca_charm_dau),
            ("hSelDcaXYToPvV0Daughters", self.dca_xy_to_pv_v0_daughters),
            ("hSelDcaXYToPvPiFromCasc", self.dca_xy_to_pv_pi_from_casc),
            ("hSelDCAXYPrimPi", self.impact_parameter_xy_pi_from_charm),
            ("hSelDCAZPrimPi", self.impact_parameter_z_pi_from_charm),
            ("hSelDCAXYCasc", self.impact_parameter_xy_casc),
            ("hSelDCAZCasc", self.impact_parameter_z_casc),
            ("hSelPtPiFromCasc", self.pt_pi_from_casc),
            ("hSelPtPiFromCharm", self.pt_pi_from_charm),
        ];
        let lf_quality = [
            ("hSelTPCQualityPiFromLam", self.tpc_quality_pi_from_lambda),
            ("hSelTPCQualityPrFromLam", self.tpc_quality_pr_from_lambda),
            ("hSelTPCQualityPiFromCasc", self.tpc_quality_pi_from_casc),
        ];
        verdicts.extend(
            lf_quality
                .into_iter()
                .filter_map(|(name, verdict)| verdict.map(|v| (name, v))),
        );
        verdicts.push(("hSelTPCQualityPiFromCharm", self.tpc_quality_pi_from_charm));
        verdicts.push(("hSelITSQualityPiFromCharm", self.its_quality_pi_from_charm));
        verdicts
    }

    /// Whether the candidate passes everything: topology, identification, and mass windows.
    pub fn is_selected(&self) -> bool {
        self.result_selections
            && self.status_pid_lambda
            && self.status_pid_cascade
            && self.status_pid_charm_baryon
            && self.status_inv_mass_lambda
            && self.status_inv_mass_cascade
            && self.status_inv_mass_charm_baryon
    }

    pub fn record(&self) -> HfSelToXiPiRecord {
        HfSelToXiPiRecord {
            status_pid_lambda: self.status_pid_lambda,
            status_pid_cascade: self.status_pid_cascade,
            status_pid_charm_baryon: self.status_pid_charm_baryon,
            status_inv_mass_lambda: self.status_inv_mass_lambda,
            status_inv_mass_cascade: self.status_inv_mass_cascade,
            status_inv_mass_charm_baryon: self.status_inv_mass_charm_baryon,
            result_selections: self.result_selections,
            info_tpc_stored: self.info_tpc_stored,
            info_tof_stored: self.info_tof_stored,
            pid_info: self.pid_info,
        }
    }
}

/// The output row of the selector, one per candidate.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HfSelToXiPiRecord {
    pub status_pid_lambda: bool,
    pub status_pid_cascade: bool,
    pub status_pid_charm_baryon: bool,
    pub status_inv_mass_lambda: bool,
    pub status_inv_mass_cascade: bool,
    pub status_inv_mass_charm_baryon: bool,
    pub result_selections: bool,
    pub info_tpc_stored: u8,
    pub info_tof_stored: u8,
    pub pid_info: PidInfo,
}

/// Applies a [`SelectorConfig`] to [`XiPiCandidate`]s.
#[derive(Clone, Debug)]
pub struct XiPiSelector {
    config: SelectorConfig,
    pid_mode: PidMode,
    pion: TrackSelectorPid,
    proton: TrackSelectorPid,
}

fn outside(value: f64, min: f64, max: f64) -> bool {
    value.abs() < min || value.abs() > max
}

fn info_mask(flags: [bool; 4]) -> u8 {
    flags
        .iter()
        .zip([
            info_bits::PI_FROM_LAMBDA,
            info_bits::PR_FROM_LAMBDA,
            info_bits::PI_FROM_CASCADE,
            info_bits::PI_FROM_CHARM,
        ])
        .filter(|(set, _)| **set)
        .fold(0, |mask, (_, bit)| mask | (1 << bit))
}

impl XiPiSelector {
    /// # Errors
    ///
    /// Returns [`HfvtxError::InvalidConfiguration`] for a configuration which fails
    /// [`Configuration::validate`], in particular when the two PID flags are equal.
    pub fn new(config: SelectorConfig) -> HfvtxResult<Self> {
        config.validate()?;
        let pid_mode = config.pid_mode()?;
        Ok(Self {
            pion: config.pion_selector(),
            proton: config.proton_selector(),
            pid_mode,
            config,
        })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn pid_mode(&self) -> PidMode {
        self.pid_mode
    }

    /// Evaluate every selection on a candidate.
    ///
    /// `lf_tracks` holds the light-flavour daughters and `tracks` the pion from the charm
    /// baryon. For a positive [`sign_decay`](XiPiCandidate::sign_decay) the positive
    /// $`\Lambda`$ daughter is taken to be the pion and the negative one the (anti)proton.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::IndexOutOfRange`] if the candidate refers to a track which is not in
    /// its table.
    pub fn select(
        &self,
        candidate: &XiPiCandidate,
        tracks: &Table<PidTrack>,
        lf_tracks: &Table<PidTrack>,
    ) -> HfvtxResult<XiPiSelection> {
        let config = &self.config;
        let v0_pos = lf_tracks.get(candidate.pos_track_id)?;
        let v0_neg = lf_tracks.get(candidate.neg_track_id)?;
        let pi_from_casc = lf_tracks.get(candidate.bachelor_id)?;
        let pi_from_charm = tracks.get(candidate.bachelor_from_charm_baryon_id)?;
        let (pi_from_lambda, pr_from_lambda) = if candidate.sign_decay > 0 {
            (v0_pos, v0_neg)
        } else {
            (v0_neg, v0_pos)
        };

        let pt_pi_from_casc = candidate
            .px_bach_from_casc
            .hypot(candidate.py_bach_from_casc);
        let pt_pi_from_charm = candidate
            .px_bach_from_charm_baryon
            .hypot(candidate.py_bach_from_charm_baryon);
        let lf_quality = |track: &PidTrack| {
            config
                .apply_trk_sel_lf
                .then(|| is_selected_tpc_quality(track, &config.tpc_quality))
        };

        let mut selection = XiPiSelection {
            sign_decay: candidate.sign_decay,
            eta_pos_v0_dau: candidate.eta_v0_pos_dau.abs() <= config.eta_track_lf_dau_max,
            eta_neg_v0_dau: candidate.eta_v0_neg_dau.abs() <= config.eta_track_lf_dau_max,
            eta_pi_from_casc: candidate.eta_bach_from_casc.abs() <= config.eta_track_lf_dau_max,
            eta_pi_from_charm: candidate.eta_bach_from_charm_baryon.abs()
                <= config.eta_track_charm_bach_max,
            radius_casc: candidate
                .x_decay_vtx_cascade
                .hypot(candidate.y_decay_vtx_cascade)
                >= config.radius_casc_min,
            radius_v0: candidate.x_decay_vtx_v0.hypot(candidate.y_decay_vtx_v0)
                >= config.radius_v0_min,
            cos_pa_casc: candidate.cos_pa_casc >= config.cos_pa_casc_min,
            cos_pa_v0: candidate.cos_pa_v0 >= config.cos_pa_v0_min,
            dca_casc_dau: candidate.dca_casc_dau <= config.dca_casc_dau_max,
            dca_v0_dau: candidate.dca_v0_dau <= config.dca_v0_dau_max,
            dca_charm_dau: candidate.dca_charm_baryon_dau <= config.dca_charm_baryon_dau_max,
            dca_xy_to_pv_v0_daughters: candidate.dca_xy_to_pv_v0_dau0.abs()
                >= config.dca_pos_to_pv_min
                && candidate.dca_xy_to_pv_v0_dau1.abs() >= config.dca_neg_to_pv_min,
            dca_xy_to_pv_pi_from_casc: candidate.dca_xy_to_pv_casc_dau.abs()
                >= config.dca_bach_to_pv_min,
            impact_parameter_xy_pi_from_charm: !outside(
                candidate.impact_par_bach_from_charm_baryon_xy,
                config.impact_parameter_xy_pi_from_charm_baryon_min,
                config.impact_parameter_xy_pi_from_charm_baryon_max,
            ),
            impact_parameter_z_pi_from_charm: !outside(
                candidate.impact_par_bach_from_charm_baryon_z,
                config.impact_parameter_z_pi_from_charm_baryon_min,
                config.impact_parameter_z_pi_from_charm_baryon_max,
            ),
            impact_parameter_xy_casc: !outside(
                candidate.impact_par_casc_xy,
                config.impact_parameter_xy_casc_min,
                config.impact_parameter_xy_casc_max,
            ),
            impact_parameter_z_casc: !outside(
                candidate.impact_par_casc_z,
                config.impact_parameter_z_casc_min,
                config.impact_parameter_z_casc_max,
            ),
            pt_pi_from_casc: pt_pi_from_casc >= config.pt_pi_from_casc_min,
            pt_pi_from_charm: pt_pi_from_charm >= config.pt_pi_from_charm_baryon_min,
            tpc_quality_pi_from_lambda: lf_quality(pi_from_lambda),
            tpc_quality_pr_from_lambda: lf_quality(pr_from_lambda),
            tpc_quality_pi_from_casc: lf_quality(pi_from_casc),
            tpc_quality_pi_from_charm: is_selected_tpc_quality(pi_from_charm, &config.tpc_quality),
            its_quality_pi_from_charm: is_selected_its_quality(pi_from_charm, &config.its_quality),
            result_selections: false,
            status_pid_pr_from_lambda: self.proton.status(pr_from_lambda, self.pid_mode),
            status_pid_pi_from_lambda: self.pion.status(pi_from_lambda, self.pid_mode),
            status_pid_pi_from_casc: self.pion.status(pi_from_casc, self.pid_mode),
            status_pid_pi_from_charm_baryon: self.pion.status(pi_from_charm, self.pid_mode),
            status_pid_lambda: false,
            status_pid_cascade: false,
            status_pid_charm_baryon: false,
            status_inv_mass_lambda: (candidate.inv_mass_lambda - MASS_LAMBDA).abs()
                < config.v0_mass_window,
            status_inv_mass_cascade: (candidate.inv_mass_cascade - MASS_XI_MINUS).abs()
                < config.cascade_mass_window,
            status_inv_mass_charm_baryon: candidate.inv_mass_charm_baryon
                >= config.inv_mass_charm_baryon_min
                && candidate.inv_mass_charm_baryon <= config.inv_mass_charm_baryon_max,
            info_tpc_stored: info_mask([
                pi_from_lambda.has_tpc,
                pr_from_lambda.has_tpc,
                pi_from_casc.has_tpc,
                pi_from_charm.has_tpc,
            ]),
            info_tof_stored: info_mask([
                pi_from_lambda.has_tof,
                pr_from_lambda.has_tof,
                pi_from_casc.has_tof,
                pi_from_charm.has_tof,
            ]),
            pid_info: PidInfo {
                tpc_n_sigma_pi_from_charm_baryon: pi_from_charm.tpc_n_sigma_pi,
                tpc_n_sigma_pi_from_casc: pi_from_casc.tpc_n_sigma_pi,
                tpc_n_sigma_pi_from_lambda: pi_from_lambda.tpc_n_sigma_pi,
                tpc_n_sigma_pr_from_lambda: pr_from_lambda.tpc_n_sigma_pr,
                tof_n_sigma_pi_from_charm_baryon: pi_from_charm.tof_n_sigma_pi,
                tof_n_sigma_pi_from_casc: pi_from_casc.tof_n_sigma_pi,
                tof_n_sigma_pi_from_lambda: pi_from_lambda.tof_n_sigma_pi,
                tof_n_sigma_pr_from_lambda: pr_from_lambda.tof_n_sigma_pr,
            },
            inv_mass_charm_baryon: candidate.inv_mass_charm_baryon,
        };
        selection.result_selections = selection.verdicts().iter().all(|(_, pass)| *pass);
        selection.status_pid_lambda = selection.status_pid_pr_from_lambda.is_accepted()
            && selection.status_pid_pi_from_lambda.is_accepted();
        selection.status_pid_cascade =
            selection.status_pid_lambda && selection.status_pid_pi_from_casc.is_accepted();
        selection.status_pid_charm_baryon = selection.status_pid_cascade
            && selection.status_pid_pi_from_charm_baryon.is_accepted();
        Ok(selection)
    }

    /// Select every candidate, fill the QA histograms, and return one row per candidate.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::IndexOutOfRange`] if any candidate refers to a missing track; no
    /// rows are returned in that case.
    pub fn process(
        &self,
        candidates: &[XiPiCandidate],
        tracks: &Table<PidTrack>,
        lf_tracks: &Table<PidTrack>,
        sink: &dyn QaSink,
    ) -> HfvtxResult<Vec<HfSelToXiPiRecord>> {
        let mut records = Vec::with_capacity(candidates.len());
        let mut n_selected = 0;
        for candidate in candidates {
            let selection = self.select(candidate, tracks, lf_tracks)?;
            fill_selection_qa(&selection, sink);
            n_selected += usize::from(selection.is_selected());
            records.push(selection.record());
        }
        debug!(
            "{n_selected} of {} charm-baryon candidates selected",
            candidates.len()
        );
        Ok(records)
    }
}

/// Register the histograms filled by [`fill_selection_qa`].
pub fn register_selection_histograms(registry: &HistogramRegistry) -> HfvtxResult<()> {
    registry.add("hSelPID", 12, (0.0, 12.0))?;
    registry.add("hStatusCheck", 12, (0.0, 12.0))?;
    let pass_fail = (2, (-0.5, 1.5));
    registry.add("hSelSignDec", pass_fail.0, pass_fail.1)?;
    let empty = XiPiSelection::empty();
    for (name, _) in empty.verdicts() {
        registry.add(name, pass_fail.0, pass_fail.1)?;
    }
    for name in ["hSelMassLam", "hSelMassCasc", "hSelMassCharmBaryon"] {
        registry.add(name, pass_fail.0, pass_fail.1)?;
    }
    registry.add("hInvMassCharmBaryon", 500, (2.2, 3.1))
}

impl XiPiSelection {
    /// A selection with every verdict evaluated and failed.
    fn empty() -> Self {
        Self {
            sign_decay: 0,
            eta_pos_v0_dau: false,
            eta_neg_v0_dau: false,
            eta_pi_from_casc: false,
            eta_pi_from_charm: false,
            radius_casc: false,
            radius_v0: false,
            cos_pa_casc: false,
            cos_pa_v0: false,
            dca_casc_dau: false,
            dca_v0_dau: false,
            dca_charm_dau: false,
            dca_xy_to_pv_v0_daughters: false,
            dca_xy_to_pv_pi_from_casc: false,
            impact_parameter_xy_pi_from_charm: false,
            impact_parameter_z_pi_from_charm: false,
            impact_parameter_xy_casc: false,
            impact_parameter_z_casc: false,
            pt_pi_from_casc: false,
            pt_pi_from_charm: false,
            tpc_quality_pi_from_lambda: Some(false),
            tpc_quality_pr_from_lambda: Some(false),
            tpc_quality_pi_from_casc: Some(false),
            tpc_quality_pi_from_charm: false,
            its_quality_pi_from_charm: false,
            result_selections: false,
            status_pid_pr_from_lambda: PidStatus::NotApplicable,
            status_pid_pi_from_lambda: PidStatus::NotApplicable,
            status_pid_pi_from_casc: PidStatus::NotApplicable,
            status_pid_pi_from_charm_baryon: PidStatus::NotApplicable,
            status_pid_lambda: false,
            status_pid_cascade: false,
            status_pid_charm_baryon: false,
            status_inv_mass_lambda: false,
            status_inv_mass_cascade: false,
            status_inv_mass_charm_baryon: false,
            info_tpc_stored: 0,
            info_tof_stored: 0,
            pid_info: PidInfo::default(),
            inv_mass_charm_baryon: 0.0,
        }
    }
}

fn pass_fail(passed: bool) -> f64 {
    if passed {
        1.0
    } else {
        0.0
    }
}

/// Report a selection to a QA sink.
///
/// Every evaluated verdict is filled as 1 (pass) or 0 (fail). `hStatusCheck` counts candidates
/// passing consecutive steps (topology, then PID of the $`\Lambda`$, cascade, and charm baryon,
/// then the three mass windows) at 0.5, 1.5, ..., 5.5. For candidates passing the topological
/// selection, `hSelPID` gets one entry per status at `2k + 0.5` (fail) or `2k + 1.5` (pass).
/// The charm-baryon mass of fully selected candidates goes to `hInvMassCharmBaryon`.
pub fn fill_selection_qa(selection: &XiPiSelection, sink: &dyn QaSink) {
    match selection.sign_decay {
        s if s > 0 => sink.fill("hSelSignDec", 1.0),
        s if s < 0 => sink.fill("hSelSignDec", 0.0),
        _ => {}
    }
    for (name, passed) in selection.verdicts() {
        sink.fill(name, pass_fail(passed));
    }

    let steps = [
        selection.status_pid_lambda,
        selection.status_pid_cascade,
        selection.status_pid_charm_baryon,
    ];
    let topology = selection.result_selections;
    for (k, passed) in steps.iter().enumerate() {
        if topology && *passed {
            sink.fill("hStatusCheck", k as f64 + 0.5);
        }
    }
    let all_pid = steps.iter().all(|s| *s);
    let masses = [
        ("hSelMassLam", selection.status_inv_mass_lambda),
        ("hSelMassCasc", selection.status_inv_mass_cascade),
        ("hSelMassCharmBaryon", selection.status_inv_mass_charm_baryon),
    ];
    for (k, (name, passed)) in masses.iter().enumerate() {
        sink.fill(name, pass_fail(*passed));
        let previous = masses[..k].iter().all(|(_, p)| *p);
        if *passed && previous && all_pid && topology {
            sink.fill("hStatusCheck", k as f64 + 3.5);
        }
    }

    if topology {
        let statuses = [
            selection.status_pid_lambda,
            selection.status_pid_cascade,
            selection.status_pid_charm_baryon,
            selection.status_inv_mass_lambda,
            selection.status_inv_mass_cascade,
            selection.status_inv_mass_charm_baryon,
        ];
        for (k, passed) in statuses.iter().enumerate() {
            sink.fill("hSelPID", 2.0 * k as f64 + pass_fail(*passed) + 0.5);
        }
    }
    if selection.is_selected() {
        sink.fill("hInvMassCharmBaryon", selection.inv_mass_charm_baryon);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn identified(pt: f64) -> PidTrack {
        PidTrack {
            pt,
            has_tpc: true,
            has_tof: true,
            tpc_n_sigma_pi: 0.5,
            tpc_n_sigma_pr: 0.5,
            tof_n_sigma_pi: -0.5,
            tof_n_sigma_pr: -0.5,
            tpc_n_clusters_found: 140,
            tpc_n_crossed_rows: 145,
            tpc_crossed_rows_over_findable: 0.98,
            tpc_chi2_per_cluster: 1.1,
            its_n_clusters: 7,
            its_n_clusters_inner_barrel: 3,
            its_chi2_per_cluster: 1.5,
        }
    }

    /// Tables with light-flavour tracks (pos, neg, bachelor) and one charm bachelor.
    fn tables() -> (Table<PidTrack>, Table<PidTrack>) {
        let lf = Table::new(
            "lf_tracks",
            vec![identified(1.2), identified(0.4), identified(0.6)],
        );
        let charm = Table::new("tracks", vec![identified(1.5)]);
        (charm, lf)
    }

    fn good_candidate() -> XiPiCandidate {
        XiPiCandidate {
            sign_decay: -1,
            pos_track_id: 0,
            neg_track_id: 1,
            bachelor_id: 2,
            bachelor_from_charm_baryon_id: 0,
            eta_v0_pos_dau: 0.3,
            eta_v0_neg_dau: -0.2,
            eta_bach_from_casc: 0.1,
            eta_bach_from_charm_baryon: 0.5,
            x_decay_vtx_cascade: 1.5,
            y_decay_vtx_cascade: 2.0,
            x_decay_vtx_v0: 3.0,
            y_decay_vtx_v0: 4.0,
            cos_pa_casc: 0.995,
            cos_pa_v0: 0.99,
            dca_casc_dau: 0.3,
            dca_v0_dau: 0.4,
            dca_charm_baryon_dau: 0.05,
            dca_xy_to_pv_v0_dau0: 0.2,
            dca_xy_to_pv_v0_dau1: -0.3,
            dca_xy_to_pv_casc_dau: 0.1,
            impact_par_bach_from_charm_baryon_xy: 0.01,
            impact_par_bach_from_charm_baryon_z: -0.02,
            impact_par_casc_xy: 0.03,
            impact_par_casc_z: 0.04,
            px_bach_from_casc: 0.3,
            py_bach_from_casc: 0.4,
            px_bach_from_charm_baryon: 0.6,
            py_bach_from_charm_baryon: 0.8,
            inv_mass_lambda: 1.1157,
            inv_mass_cascade: 1.3217,
            inv_mass_charm_baryon: 2.47,
        }
    }

    fn selector() -> XiPiSelector {
        XiPiSelector::new(SelectorConfig::default()).unwrap()
    }

    #[test]
    fn test_good_candidate_is_selected() {
        let (charm, lf) = tables();
        let selection = selector().select(&good_candidate(), &charm, &lf).unwrap();
        assert!(selection.result_selections);
        assert_eq!(selection.verdicts().len(), 24);
        assert!(selection.status_pid_lambda);
        assert!(selection.status_pid_cascade);
        assert!(selection.status_pid_charm_baryon);
        assert!(selection.status_inv_mass_lambda);
        assert!(selection.status_inv_mass_cascade);
        assert!(selection.status_inv_mass_charm_baryon);
        assert!(selection.is_selected());
        assert_eq!(selection.info_tpc_stored, 0b1111);
        assert_eq!(selection.info_tof_stored, 0b1111);
        let record = selection.record();
        assert!(record.result_selections);
        assert_relative_eq!(record.pid_info.tpc_n_sigma_pr_from_lambda, 0.5);
    }

    #[test]
    fn test_topological_verdicts() {
        let (charm, lf) = tables();
        let selector = selector();
        let mut candidate = good_candidate();
        candidate.x_decay_vtx_cascade = 0.3;
        candidate.y_decay_vtx_cascade = 0.4;
        candidate.impact_par_casc_z = -12.0;
        candidate.eta_bach_from_charm_baryon = 0.9;
        let selection = selector.select(&candidate, &charm, &lf).unwrap();
        assert!(!selection.radius_casc);
        assert!(!selection.impact_parameter_z_casc);
        assert!(!selection.eta_pi_from_charm);
        assert!(selection.radius_v0);
        assert!(!selection.result_selections);
        assert!(!selection.is_selected());
        // identification does not depend on topology
        assert!(selection.status_pid_charm_baryon);

        let mut candidate = good_candidate();
        candidate.dca_xy_to_pv_v0_dau1 = 0.05;
        let selection = selector.select(&candidate, &charm, &lf).unwrap();
        assert!(!selection.dca_xy_to_pv_v0_daughters);
        assert!(!selection.result_selections);
    }

    #[test]
    fn test_sign_swaps_lambda_daughters() {
        let (charm, _) = tables();
        let proton_like = PidTrack {
            tpc_n_sigma_pi: 8.0,
            tof_n_sigma_pi: 8.0,
            ..identified(1.2)
        };
        let pion_like = PidTrack {
            tpc_n_sigma_pr: 8.0,
            tof_n_sigma_pr: 8.0,
            ..identified(0.4)
        };
        let lf = Table::new("lf_tracks", vec![proton_like, pion_like, identified(0.6)]);
        let selector = selector();
        let particle = selector.select(&good_candidate(), &charm, &lf).unwrap();
        assert!(particle.status_pid_lambda);
        let antiparticle = XiPiCandidate {
            sign_decay: 1,
            ..good_candidate()
        };
        let antiparticle = selector.select(&antiparticle, &charm, &lf).unwrap();
        assert_eq!(antiparticle.status_pid_pr_from_lambda, PidStatus::Rejected);
        assert_eq!(antiparticle.status_pid_pi_from_lambda, PidStatus::Rejected);
        assert!(!antiparticle.status_pid_lambda);
        assert!(!antiparticle.status_pid_charm_baryon);
    }

    #[test]
    fn test_pid_modes() {
        let (_, lf) = tables();
        // TPC says no, TOF says yes
        let charm = Table::new(
            "tracks",
            vec![PidTrack {
                tpc_n_sigma_pi: 5.0,
                ..identified(1.5)
            }],
        );
        let combined = selector().select(&good_candidate(), &charm, &lf).unwrap();
        assert_eq!(combined.status_pid_pi_from_charm_baryon, PidStatus::Accepted);
        assert!(combined.status_pid_charm_baryon);

        let tpc_only = XiPiSelector::new(SelectorConfig {
            use_pid_tpc_only: true,
            use_pid_tpc_tof_combined: false,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(tpc_only.pid_mode(), PidMode::TpcOnly);
        let selection = tpc_only.select(&good_candidate(), &charm, &lf).unwrap();
        assert_eq!(
            selection.status_pid_pi_from_charm_baryon,
            PidStatus::Rejected
        );
        assert!(selection.status_pid_cascade);
        assert!(!selection.status_pid_charm_baryon);
    }

    #[test]
    fn test_conflicting_pid_flags() {
        for (tpc_only, combined) in [(true, true), (false, false)] {
            let err = XiPiSelector::new(SelectorConfig {
                use_pid_tpc_only: tpc_only,
                use_pid_tpc_tof_combined: combined,
                ..Default::default()
            })
            .unwrap_err();
            assert!(matches!(err, HfvtxError::InvalidConfiguration { .. }));
        }
        let err = SelectorConfig::from_json_str(r#"{"use_pid_tpc_only": true}"#).unwrap_err();
        assert!(matches!(err, HfvtxError::InvalidConfiguration { .. }));
        let config = SelectorConfig::from_json_str(
            r#"{"v0_mass_window": 0.02, "tpc_quality": {"n_clusters_min": 50, "n_crossed_rows_min": 70, "crossed_rows_over_findable_min": 0.8, "chi2_per_cluster_max": 4.0}}"#,
        )
        .unwrap();
        assert_eq!(config.v0_mass_window, 0.02);
        assert_eq!(config.tpc_quality.n_clusters_min, 50);
        assert_eq!(config.cascade_mass_window, 0.01);
    }

    #[test]
    fn test_lf_quality_switch() {
        let (charm, _) = tables();
        let poor = PidTrack {
            tpc_n_clusters_found: 20,
            ..identified(0.6)
        };
        let lf = Table::new("lf_tracks", vec![identified(1.2), identified(0.4), poor]);
        let selection = selector().select(&good_candidate(), &charm, &lf).unwrap();
        assert_eq!(selection.tpc_quality_pi_from_casc, Some(false));
        assert!(!selection.result_selections);

        let relaxed = XiPiSelector::new(SelectorConfig {
            apply_trk_sel_lf: false,
            ..Default::default()
        })
        .unwrap();
        let selection = relaxed.select(&good_candidate(), &charm, &lf).unwrap();
        assert_eq!(selection.tpc_quality_pi_from_casc, None);
        assert_eq!(selection.verdicts().len(), 21);
        assert!(selection.result_selections);
    }

    #[test]
    fn test_missing_track() {
        let (charm, lf) = tables();
        let candidate = XiPiCandidate {
            bachelor_from_charm_baryon_id: 4,
            ..good_candidate()
        };
        let err = selector().select(&candidate, &charm, &lf).unwrap_err();
        match err {
            HfvtxError::IndexOutOfRange { table, index, len } => {
                assert_eq!(table, "tracks");
                assert_eq!(index, 4);
                assert_eq!(len, 1);
            }
            other => panic!("expected an out-of-range error, got {other:?}"),
        }
    }

    #[test]
    fn test_selection_qa() {
        let (charm, lf) = tables();
        let registry = HistogramRegistry::new();
        register_selection_histograms(&registry).unwrap();
        let mut bad_mass = good_candidate();
        bad_mass.inv_mass_cascade = 1.40;
        let records = selector()
            .process(&[good_candidate(), bad_mass], &charm, &lf, &registry)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[1].status_inv_mass_cascade);

        let sign = registry.histogram("hSelSignDec").unwrap();
        assert_eq!(sign.counts, vec![2.0, 0.0]);
        let radius = registry.histogram("hSelRadV0").unwrap();
        assert_eq!(radius.counts, vec![0.0, 2.0]);
        let mass = registry.histogram("hSelMassCasc").unwrap();
        assert_eq!(mass.counts, vec![1.0, 1.0]);

        let status = registry.histogram("hStatusCheck").unwrap();
        assert_eq!(
            status.counts,
            vec![2.0, 2.0, 2.0, 2.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
        let pid = registry.histogram("hSelPID").unwrap();
        assert_eq!(
            pid.counts,
            vec![0.0, 2.0, 0.0, 2.0, 0.0, 2.0, 0.0, 2.0, 1.0, 1.0, 0.0, 2.0]
        );
        assert_eq!(registry.entries("hInvMassCharmBaryon"), 1);
        assert!(registry.counter("hSelEtaPosV0Dau").is_none());
    }
}
