//! # hfvtx-selection
//!
//! Track-level particle identification and quality requirements, and the selection of
//! $`\Xi_c^0 \to \Xi^-\pi^+`$ (and $`\Omega_c^0 \to \Xi^-\pi^+`$) charm-baryon candidates.
#![warn(clippy::perf, clippy::style)]

/// n-sigma particle identification with the TPC and TOF detectors.
pub mod pid;
/// TPC and ITS track-quality requirements.
pub mod quality;
/// The charm-baryon to $`\Xi\pi`$ candidate selector.
pub mod xipi;

pub use pid::{PidMode, PidSpecies, PidStatus, PidTrack, TrackSelectorPid};
pub use quality::{is_selected_its_quality, is_selected_tpc_quality, ItsQuality, TpcQuality};
pub use xipi::{
    fill_selection_qa, register_selection_histograms, HfSelToXiPiRecord, PidInfo, SelectorConfig,
    XiPiCandidate, XiPiSelection, XiPiSelector,
};
