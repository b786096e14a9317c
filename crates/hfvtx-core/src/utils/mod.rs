/// Enums shared across the crate
pub mod enums;
/// Histograms and the sink through which tasks report quality-assurance values.
pub mod qa;
/// Useful vector structs for momenta and positions
pub mod vectors;

/// Physical and numerical constants.
pub mod constants {
    /// Conversion from $`q/p_T`$ (in $`c/\text{GeV}`$) times $`B_z`$ (in kG) to curvature in
    /// $`\text{cm}^{-1}`$.
    pub const B2C: f64 = -0.299792458e-3;
    /// Largest $`|\sin\phi|`$ a track may have in any frame it is expressed in.
    pub const ALMOST_ONE: f64 = 0.999;
    pub const ALMOST_ZERO: f64 = 1e-12;
    /// Below this curvature magnitude (in $`\text{cm}^{-1}`$) a trajectory is treated as a
    /// straight line when computing seeds.
    pub const STRAIGHT_LINE_CURVATURE: f64 = 1e-4;

    /// PDG mass of the charged pion in GeV.
    pub const MASS_PION: f64 = 0.13957039;
    /// PDG mass of the charged kaon in GeV.
    pub const MASS_KAON: f64 = 0.493677;
    /// PDG mass of the proton in GeV.
    pub const MASS_PROTON: f64 = 0.93827208816;
    /// PDG mass of the $`\Lambda^0`$ in GeV.
    pub const MASS_LAMBDA: f64 = 1.115683;
    /// PDG mass of the $`\Xi^-`$ in GeV.
    pub const MASS_XI_MINUS: f64 = 1.32171;
}

/// Bring an angle into $`[-\pi, \pi)`$.
pub fn bring_to_pm_pi(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid can round up to exactly TAU
    if wrapped >= PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Bring an angle into $`[0, 2\pi)`$.
pub fn bring_to_2pi(angle: f64) -> f64 {
    use std::f64::consts::TAU;
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// $`x / \sin(x)`$, continuous through zero.
pub(crate) fn x_over_sin(x: f64) -> f64 {
    if x.abs() < 1e-4 {
        1.0 + x * x / 6.0
    } else {
        x / x.sin()
    }
}

pub fn get_bin_edges(bins: usize, range: (f64, f64)) -> Vec<f64> {
    let bin_width = (range.1 - range.0) / (bins as f64);
    (0..=bins)
        .map(|i| range.0 + (i as f64 * bin_width))
        .collect()
}

pub fn get_bin_index(value: f64, bins: usize, limits: (f64, f64)) -> Option<usize> {
    if value >= limits.0 && value < limits.1 {
        let bin_width = (limits.1 - limits.0) / bins as f64;
        let bin_index = ((value - limits.0) / bin_width).floor() as usize;
        Some(bin_index.min(bins - 1))
    } else {
        None
    }
}

/// A simple struct which represents a histogram
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// The number of counts in each bin (can be `f64`s since these might be weighted counts)
    pub counts: Vec<f64>,
    /// The edges of each bin (length is one greater than `counts`)
    pub bin_edges: Vec<f64>,
}

impl Histogram {
    /// Sum of the counts which landed inside the range.
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum()
    }
}

/// A method which creates a histogram from some data by binning it with evenly spaced `bins` within
/// the given `range`
pub fn histogram<T: AsRef<[f64]>>(
    values: T,
    bins: usize,
    range: (f64, f64),
    weights: Option<T>,
) -> Histogram {
    assert!(bins > 0, "Number of bins must be greater than zero!");
    assert!(
        range.1 > range.0,
        "The lower edge of the range must be smaller than the upper edge!"
    );
    if let Some(w) = &weights {
        assert_eq!(
            values.as_ref().len(),
            w.as_ref().len(),
            "`values` and `weights` must have the same length!"
        );
    }
    let mut counts = vec![0.0; bins];
    for (i, &value) in values.as_ref().iter().enumerate() {
        if let Some(bin_index) = get_bin_index(value, bins, range) {
            let weight = weights.as_ref().map_or(1.0, |w| w.as_ref()[i]);
            counts[bin_index] += weight;
        }
    }
    Histogram {
        counts,
        bin_edges: get_bin_edges(bins, range),
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_binning() {
        assert_eq!(get_bin_index(0.5, 3, (0.0, 1.0)), Some(1));
        assert_eq!(get_bin_index(0.0, 3, (0.0, 1.0)), Some(0));
        assert_eq!(get_bin_index(0.1, 3, (0.0, 1.0)), Some(0));
        assert_eq!(get_bin_index(0.9, 3, (0.0, 1.0)), Some(2));
        assert_eq!(get_bin_index(1.0, 3, (0.0, 1.0)), None);
        assert_eq!(get_bin_index(2.0, 3, (0.0, 1.0)), None);
        let histogram = histogram([0.5, 0.1, 0.2, 1.5], 3, (0.0, 1.0), Some([1.0, 0.25, 0.25, 4.0]));
        assert_eq!(histogram.counts, vec![0.5, 1.0, 0.0]);
        assert_eq!(histogram.bin_edges, vec![0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0]);
        assert_relative_eq!(histogram.integral(), 1.5);
    }

    #[test]
    fn test_angle_wrapping() {
        assert_relative_eq!(bring_to_pm_pi(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(bring_to_pm_pi(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(bring_to_pm_pi(PI), -PI, epsilon = 1e-12);
        assert_relative_eq!(bring_to_pm_pi(0.3), 0.3);
        assert_relative_eq!(bring_to_2pi(-PI / 2.0), 3.0 * PI / 2.0, epsilon = 1e-12);
        assert!(bring_to_2pi(-1e-18) < 2.0 * PI);
    }

    #[test]
    fn test_x_over_sin_is_smooth() {
        assert_relative_eq!(x_over_sin(0.0), 1.0);
        assert_relative_eq!(x_over_sin(0.99e-4), 0.99e-4 / 0.99e-4_f64.sin(), epsilon = 1e-14);
        assert_relative_eq!(x_over_sin(0.5), 0.5 / 0.5_f64.sin());
    }
}
