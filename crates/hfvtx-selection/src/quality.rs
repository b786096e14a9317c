use serde::{Deserialize, Serialize};

use crate::pid::PidTrack;

/// Requirements on the TPC part of a track.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TpcQuality {
    pub n_clusters_min: i32,
    pub n_crossed_rows_min: i32,
    pub crossed_rows_over_findable_min: f64,
    pub chi2_per_cluster_max: f64,
}

impl Default for TpcQuality {
    fn default() -> Self {
        Self {
            n_clusters_min: 70,
            n_crossed_rows_min: 70,
            crossed_rows_over_findable_min: 0.8,
            chi2_per_cluster_max: 4.0,
        }
    }
}

/// Requirements on the ITS part of a track.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItsQuality {
    pub n_clusters_min: u8,
    /// Hits required in the three innermost layers.
    pub n_clusters_inner_barrel_min: u8,
    pub chi2_per_cluster_max: f64,
}

impl Default for ItsQuality {
    fn default() -> Self {
        Self {
            n_clusters_min: 3,
            n_clusters_inner_barrel_min: 1,
            chi2_per_cluster_max: 36.0,
        }
    }
}

pub fn is_selected_tpc_quality(track: &PidTrack, cuts: &TpcQuality) -> bool {
    track.tpc_n_clusters_found >= cuts.n_clusters_min
        && track.tpc_n_crossed_rows >= cuts.n_crossed_rows_min
        && track.tpc_crossed_rows_over_findable >= cuts.crossed_rows_over_findable_min
        && track.tpc_chi2_per_cluster <= cuts.chi2_per_cluster_max
}

pub fn is_selected_its_quality(track: &PidTrack, cuts: &ItsQuality) -> bool {
    track.its_n_clusters >= cuts.n_clusters_min
        && track.its_n_clusters_inner_barrel >= cuts.n_clusters_inner_barrel_min
        && track.its_chi2_per_cluster <= cuts.chi2_per_cluster_max
}
