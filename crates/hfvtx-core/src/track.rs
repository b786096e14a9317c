use std::fmt::Display;

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::{
    utils::{
        bring_to_2pi, bring_to_pm_pi,
        constants::{ALMOST_ONE, B2C},
        enums::Sign,
        vectors::{Vec3, Vec4},
    },
    HfvtxError, HfvtxResult,
};

/// Index of the local transverse coordinate in [`TrackState::params`].
pub const Y: usize = 0;
/// Index of the longitudinal coordinate.
pub const Z: usize = 1;
/// Index of $`\sin\phi`$ in the local frame.
pub const SNP: usize = 2;
/// Index of $`\tan\lambda`$.
pub const TGL: usize = 3;
/// Index of $`q/p_T`$.
pub const Q2PT: usize = 4;

/// Number of independent entries of a symmetric 5x5 matrix.
pub const COV_LEN: usize = 15;

pub type TrackParams = SVector<f64, 5>;
pub type TrackCovariance = SMatrix<f64, 5, 5>;

/// Position of element `(i, j)` of a symmetric 5x5 matrix in its packed lower triangle,
/// `YY, ZY, ZZ, SnpY, SnpZ, SnpSnp, TglY, ...`.
pub const fn cov_index(i: usize, j: usize) -> usize {
    if i >= j {
        i * (i + 1) / 2 + j
    } else {
        j * (j + 1) / 2 + i
    }
}

/// The rotation taking coordinates in the frame at angle `alpha` to global coordinates.
pub fn frame_rotation(alpha: f64) -> Matrix3<f64> {
    let (sa, ca) = alpha.sin_cos();
    Matrix3::new(ca, -sa, 0.0, sa, ca, 0.0, 0.0, 0.0, 1.0)
}

/// A charged-particle trajectory at a reference plane.
///
/// The track is expressed in a local frame rotated by `alpha` about the beam axis. At local
/// coordinate `x` it carries the parameters `[y, z, snp, tgl, q2pt]`: the local transverse
/// position, the longitudinal position, the sine of the transverse direction angle measured in
/// the local frame, the tangent of the dip angle, and the signed inverse transverse momentum.
/// Positions are in cm and momenta in GeV.
///
/// The parameter covariance is stored packed (see [`cov_index`]).
///
/// A valid state has a finite parameter vector, `|snp| < 1`, `alpha` in $`[-\pi, \pi)`$, and a
/// positive semi-definite covariance. The state itself is field-agnostic; the field only enters
/// where a curvature is requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackState {
    x: f64,
    alpha: f64,
    params: [f64; 5],
    cov: [f64; COV_LEN],
}

impl Display for TrackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Track:")?;
        writeln!(f, "  x:     {:.5}", self.x)?;
        writeln!(f, "  alpha: {:.5}", self.alpha)?;
        writeln!(
            f,
            "  params: [{:.5}, {:.5}, {:.5}, {:.5}, {:.5}]",
            self.params[Y], self.params[Z], self.params[SNP], self.params[TGL], self.params[Q2PT]
        )?;
        write!(f, "  global: {}", Vec3::from(self.global_position()))
    }
}

impl TrackState {
    /// Build a state from its raw representation. `alpha` is brought into $`[-\pi, \pi)`$.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::DegenerateTrajectory`] if any parameter is not finite or
    /// `|snp| >= 0.999`.
    pub fn new(x: f64, alpha: f64, params: [f64; 5], cov: [f64; COV_LEN]) -> HfvtxResult<Self> {
        if !x.is_finite() || !alpha.is_finite() || params.iter().any(|p| !p.is_finite()) {
            return Err(HfvtxError::degenerate("track parameters are not finite"));
        }
        if params[SNP].abs() >= ALMOST_ONE {
            return Err(HfvtxError::degenerate(format!(
                "|snp| = {} is too close to one",
                params[SNP].abs()
            )));
        }
        Ok(Self {
            x,
            alpha: bring_to_pm_pi(alpha),
            params,
            cov,
        })
    }

    /// Build a state passing through a global `position` with transverse direction `phi`.
    ///
    /// The frame is aligned with the direction of motion, so the returned state always has
    /// `snp == 0`.
    pub fn at_point(
        position: &Vector3<f64>,
        phi: f64,
        tgl: f64,
        q2pt: f64,
        cov: [f64; COV_LEN],
    ) -> HfvtxResult<Self> {
        let local = frame_rotation(phi).transpose() * position;
        Self::new(local.x, phi, [local.y, local.z, 0.0, tgl, q2pt], cov)
    }

    pub(crate) fn from_parts(x: f64, alpha: f64, params: TrackParams, cov: TrackCovariance) -> Self {
        let mut state = Self {
            x,
            alpha: bring_to_pm_pi(alpha),
            params: [params[0], params[1], params[2], params[3], params[4]],
            cov: [0.0; COV_LEN],
        };
        state.set_covariance_matrix(&cov);
        state
    }

    pub fn x(&self) -> f64 {
        self.x
    }
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
    pub fn params(&self) -> &[f64; 5] {
        &self.params
    }
    /// The packed covariance.
    pub fn cov(&self) -> &[f64; COV_LEN] {
        &self.cov
    }
    pub fn y(&self) -> f64 {
        self.params[Y]
    }
    pub fn z(&self) -> f64 {
        self.params[Z]
    }
    pub fn snp(&self) -> f64 {
        self.params[SNP]
    }
    pub fn tgl(&self) -> f64 {
        self.params[TGL]
    }
    pub fn q2pt(&self) -> f64 {
        self.params[Q2PT]
    }

    /// $`\cos\phi`$ in the local frame, which is positive by construction.
    pub fn csp(&self) -> f64 {
        let snp = self.snp();
        ((1.0 - snp) * (1.0 + snp)).sqrt()
    }

    /// Signed curvature in $`\text{cm}^{-1}`$ for a longitudinal field `bz` in kG.
    pub fn curvature(&self, bz: f64) -> f64 {
        self.q2pt() * bz * B2C
    }

    pub fn sign(&self) -> Sign {
        Sign::of(self.q2pt())
    }

    /// Transverse momentum; infinite for a track without measured curvature.
    pub fn pt(&self) -> f64 {
        let q2pt = self.q2pt().abs();
        if q2pt > 0.0 {
            1.0 / q2pt
        } else {
            f64::INFINITY
        }
    }

    pub fn p(&self) -> f64 {
        self.pt() * (1.0 + self.tgl() * self.tgl()).sqrt()
    }

    pub fn eta(&self) -> f64 {
        self.tgl().asinh()
    }

    /// Global azimuth of the direction of motion in $`[0, 2\pi)`$.
    pub fn phi(&self) -> f64 {
        bring_to_2pi(self.snp().asin() + self.alpha)
    }

    pub fn local_position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y(), self.z())
    }

    pub fn global_position(&self) -> Vector3<f64> {
        frame_rotation(self.alpha) * self.local_position()
    }

    /// Derivative of the local position with respect to the local `x`.
    pub fn local_tangent(&self) -> Vector3<f64> {
        let csp = self.csp();
        Vector3::new(1.0, self.snp() / csp, self.tgl() / csp)
    }

    /// [`local_tangent`](Self::local_tangent) expressed in global coordinates.
    pub fn global_tangent(&self) -> Vector3<f64> {
        frame_rotation(self.alpha) * self.local_tangent()
    }

    /// Global three-momentum.
    pub fn momentum(&self) -> Vec3 {
        let (sp, cp) = self.phi().sin_cos();
        let pt = self.pt();
        Vec3::new(pt * cp, pt * sp, pt * self.tgl())
    }

    /// Four-momentum under a mass hypothesis.
    pub fn p4(&self, mass: f64) -> Vec4 {
        self.momentum().with_mass(mass)
    }

    /// Element `(i, j)` of the covariance.
    pub fn cov_element(&self, i: usize, j: usize) -> f64 {
        self.cov[cov_index(i, j)]
    }

    pub fn params_vector(&self) -> TrackParams {
        TrackParams::from_column_slice(&self.params)
    }

    pub fn covariance_matrix(&self) -> TrackCovariance {
        TrackCovariance::from_fn(|i, j| self.cov[cov_index(i, j)])
    }

    /// Pack a covariance, averaging the two triangles.
    pub(crate) fn set_covariance_matrix(&mut self, cov: &TrackCovariance) {
        for i in 0..5 {
            for j in 0..=i {
                self.cov[cov_index(i, j)] = 0.5 * (cov[(i, j)] + cov[(j, i)]);
            }
        }
    }

    /// Covariance of the local `(y, z)` position.
    pub fn position_covariance_yz(&self) -> nalgebra::Matrix2<f64> {
        nalgebra::Matrix2::new(self.cov[0], self.cov[1], self.cov[1], self.cov[2])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;

    use super::*;

    /// A diagonal covariance with the given uncertainties, plus a little `y`-`snp` correlation.
    pub fn diagonal_cov(sigmas: [f64; 5]) -> [f64; COV_LEN] {
        let mut cov = [0.0; COV_LEN];
        for (i, s) in sigmas.iter().enumerate() {
            cov[cov_index(i, i)] = s * s;
        }
        cov[cov_index(SNP, Y)] = 0.3 * sigmas[Y] * sigmas[SNP];
        cov
    }

    #[test]
    fn test_packed_index_order() {
        assert_eq!(cov_index(Y, Y), 0);
        assert_eq!(cov_index(Z, Y), 1);
        assert_eq!(cov_index(Z, Z), 2);
        assert_eq!(cov_index(SNP, Y), 3);
        assert_eq!(cov_index(SNP, SNP), 5);
        assert_eq!(cov_index(TGL, TGL), 9);
        assert_eq!(cov_index(Q2PT, Y), 10);
        assert_eq!(cov_index(Q2PT, Q2PT), 14);
        assert_eq!(cov_index(Y, Q2PT), cov_index(Q2PT, Y));
    }

    #[test]
    fn test_covariance_matrix_is_symmetric_unpacking() {
        let cov: [f64; COV_LEN] = std::array::from_fn(|i| i as f64 + 1.0);
        let track = TrackState::new(1.0, 0.0, [0.0; 5], cov).unwrap();
        let m = track.covariance_matrix();
        assert_eq!(m, m.transpose());
        assert_eq!(m[(4, 2)], 13.0);
        let mut other = track;
        other.set_covariance_matrix(&m);
        assert_eq!(other.cov(), track.cov());
    }

    #[test]
    fn test_rejects_invalid_states() {
        assert!(TrackState::new(0.0, 0.0, [0.0, 0.0, 0.9995, 0.0, 1.0], [0.0; 15]).is_err());
        assert!(TrackState::new(f64::NAN, 0.0, [0.0; 5], [0.0; 15]).is_err());
        let wrapped = TrackState::new(0.0, 3.0 * PI / 2.0, [0.0; 5], [0.0; 15]).unwrap();
        assert_relative_eq!(wrapped.alpha(), -PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_global_position_and_direction() {
        let track = TrackState::new(2.0, PI / 2.0, [1.0, 3.0, 0.0, 0.5, -2.0], [0.0; 15]).unwrap();
        let pos = track.global_position();
        assert_relative_eq!(pos.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(pos.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(pos.z, 3.0);
        assert_relative_eq!(track.phi(), PI / 2.0, epsilon = 1e-12);
        assert_eq!(track.sign(), Sign::Negative);
        assert_relative_eq!(track.pt(), 0.5);
        let p = track.momentum();
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-12);
        assert_relative_eq!(p.z, 0.25);
        assert_relative_eq!(track.eta(), p.eta(), epsilon = 1e-12);
        assert_relative_eq!(track.p(), p.mag(), epsilon = 1e-12);
    }

    #[test]
    fn test_at_point() {
        let vertex = Vector3::new(1.0, -2.0, 0.5);
        let track = TrackState::at_point(&vertex, 0.7, 0.1, 1.5, [0.0; 15]).unwrap();
        assert_eq!(track.snp(), 0.0);
        assert_relative_eq!(track.alpha(), 0.7);
        let pos = track.global_position();
        assert_relative_eq!(pos.x, vertex.x, epsilon = 1e-12);
        assert_relative_eq!(pos.y, vertex.y, epsilon = 1e-12);
        assert_relative_eq!(pos.z, vertex.z, epsilon = 1e-12);
        let t = track.global_tangent();
        assert_relative_eq!(t.y.atan2(t.x), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_curvature_track() {
        let track = TrackState::new(0.0, 0.0, [0.0; 5], [0.0; 15]).unwrap();
        assert!(track.pt().is_infinite());
        assert_eq!(track.curvature(5.0), 0.0);
    }
}
