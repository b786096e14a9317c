use std::{fmt::Debug, sync::Arc};

use nalgebra::{Vector3, Vector5};
use serde::{Deserialize, Serialize};

use crate::{
    track::{frame_rotation, TrackCovariance, TrackState, Q2PT, SNP, TGL, Y, Z},
    utils::{
        bring_to_pm_pi,
        constants::{ALMOST_ONE, ALMOST_ZERO, B2C},
        x_over_sin,
    },
    HfvtxError, HfvtxResult,
};

/// A source of the longitudinal magnetic field.
pub trait MagneticField: Send + Sync + Debug {
    /// $`B_z`$ in kG at a global position in cm.
    fn bz(&self, position: &Vector3<f64>) -> f64;
}

/// A field which is the same everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformField(pub f64);

impl MagneticField for UniformField {
    fn bz(&self, _position: &Vector3<f64>) -> f64 {
        self.0
    }
}

/// Transport a track to the plane at local `x = xk` in a uniform field `bz`.
///
/// The trajectory is an exact helix. The covariance is carried with the analytic Jacobian of the
/// step, so transporting back to the starting plane restores the original state.
pub fn transport(track: &TrackState, xk: f64, bz: f64) -> HfvtxResult<TrackState> {
    let dx = xk - track.x();
    if dx.abs() < ALMOST_ZERO {
        return Ok(TrackState::from_parts(
            xk,
            track.alpha(),
            track.params_vector(),
            track.covariance_matrix(),
        ));
    }
    let k = bz * B2C;
    let [y, z, f1, tgl, q2pt] = *track.params();
    let crv = k * q2pt;
    let x2r = crv * dx;
    let f2 = f1 + x2r;
    if f1.abs() >= ALMOST_ONE || f2.abs() >= ALMOST_ONE {
        return Err(HfvtxError::degenerate(format!(
            "|snp| would reach {:.4} between x = {:.4} and x = {:.4}",
            f1.abs().max(f2.abs()),
            track.x(),
            xk
        )));
    }
    let r1 = ((1.0 - f1) * (1.0 + f1)).sqrt();
    let r2 = ((1.0 - f2) * (1.0 + f2)).sqrt();
    let (phi1, phi2) = (f1.asin(), f2.asin());
    let cos_mid = (0.5 * (phi1 + phi2)).cos();
    let cos_mid2 = cos_mid * cos_mid;
    // tan of the mean direction
    let dy2dx = (f1 + f2) / (r1 + r2);
    let step_xy = dx * x_over_sin(0.5 * (phi2 - phi1)) / cos_mid;
    // derivative of the transverse path length with respect to the curvature
    let dstep_dcrv = if x2r.abs() > 1e-5 {
        (dx / r2 - step_xy) / crv
    } else {
        let r1_3 = r1 * r1 * r1;
        dx * dx * f1 / (2.0 * r1_3) + crv * dx * dx * dx * (1.0 + 2.0 * f1 * f1) / (3.0 * r1_3 * r1 * r1)
    };

    let params = Vector5::new(y + dx * dy2dx, z + tgl * step_xy, f2, tgl, q2pt);
    let mut jac = TrackCovariance::identity();
    jac[(Y, SNP)] = dx * (r1 + r2) / (2.0 * r1 * r2 * cos_mid2);
    jac[(Y, Q2PT)] = k * dx * dx / (2.0 * r2 * cos_mid2);
    jac[(Z, SNP)] = tgl * dx * dy2dx / (r1 * r2);
    jac[(Z, TGL)] = step_xy;
    jac[(Z, Q2PT)] = tgl * k * dstep_dcrv;
    jac[(SNP, Q2PT)] = k * dx;
    let cov = jac * track.covariance_matrix() * jac.transpose();

    if params.iter().any(|p| !p.is_finite()) || cov.iter().any(|c| !c.is_finite()) {
        return Err(HfvtxError::degenerate(
            "transport produced non-finite parameters",
        ));
    }
    Ok(TrackState::from_parts(xk, track.alpha(), params, cov))
}

/// Express a track in the frame at angle `alpha` (about the beam axis) without moving it along
/// its trajectory. `bz` is the field at the track position, which enters the covariance through
/// the curvature.
pub fn rotate(track: &TrackState, alpha: f64, bz: f64) -> HfvtxResult<TrackState> {
    let alpha = bring_to_pm_pi(alpha);
    let (sa, ca) = (alpha - track.alpha()).sin_cos();
    let [y, z, snp, tgl, q2pt] = *track.params();
    let csp = track.csp();
    let csp_new = csp * ca + snp * sa;
    if csp_new <= ALMOST_ZERO {
        return Err(HfvtxError::degenerate(format!(
            "track direction points away from the frame at alpha = {alpha:.4}"
        )));
    }
    let snp_new = snp * ca - csp * sa;
    if snp_new.abs() >= ALMOST_ONE {
        return Err(HfvtxError::degenerate(format!(
            "|snp| = {:.4} in the frame at alpha = {alpha:.4}",
            snp_new.abs()
        )));
    }
    let x = track.x();
    let params = Vector5::new(-x * sa + y * ca, z, snp_new, tgl, q2pt);
    let mut jac = TrackCovariance::identity();
    jac[(Y, Y)] = csp / csp_new;
    jac[(Z, Y)] = -sa * tgl / csp_new;
    jac[(SNP, Y)] = -track.curvature(bz) * sa;
    jac[(SNP, SNP)] = csp_new / csp;
    let cov = jac * track.covariance_matrix() * jac.transpose();
    Ok(TrackState::from_parts(x * ca + y * sa, alpha, params, cov))
}

/// Transports [`TrackState`]s through a [`MagneticField`].
///
/// Each step uses the field at the starting position of the track, treating it as uniform over
/// the step.
#[derive(Debug, Clone)]
pub struct Propagator {
    field: Arc<dyn MagneticField>,
}

impl Default for Propagator {
    fn default() -> Self {
        Self::uniform(0.0)
    }
}

impl Propagator {
    pub fn new<F: MagneticField + 'static>(field: F) -> Self {
        Self {
            field: Arc::new(field),
        }
    }

    /// A propagator in a uniform longitudinal field `bz` (kG).
    pub fn uniform(bz: f64) -> Self {
        Self::new(UniformField(bz))
    }

    pub fn field(&self) -> &dyn MagneticField {
        self.field.as_ref()
    }

    /// The field at the current position of a track.
    pub fn bz_at(&self, track: &TrackState) -> f64 {
        self.field.bz(&track.global_position())
    }

    /// Move a track along its trajectory to the plane `x = xk` of its current frame.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::DegenerateTrajectory`] if the track would have to turn over to get
    /// there or the result is not finite; the input is untouched.
    pub fn propagate_to_x(&self, track: &TrackState, xk: f64) -> HfvtxResult<TrackState> {
        transport(track, xk, self.bz_at(track))
    }

    /// Re-express a track in the frame at angle `alpha`.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::DegenerateTrajectory`] if the track does not move forward in the new
    /// frame.
    pub fn rotate_to_frame(&self, track: &TrackState, alpha: f64) -> HfvtxResult<TrackState> {
        rotate(track, alpha, self.bz_at(track))
    }

    /// Rotate a track to `alpha` and then move it to `x = xk` in that frame.
    pub fn rotate_and_propagate(
        &self,
        track: &TrackState,
        alpha: f64,
        xk: f64,
    ) -> HfvtxResult<TrackState> {
        let rotated = self.rotate_to_frame(track, alpha)?;
        self.propagate_to_x(&rotated, xk)
    }

    /// Move a track to its point of closest approach to a global `point`.
    ///
    /// The track is first expressed in the frame pointing at `point` (keeping its own frame if
    /// that is impossible) and then stepped along `x` until the displacement to `point` is
    /// orthogonal to the trajectory.
    ///
    /// # Errors
    ///
    /// Fails with [`HfvtxError::DegenerateTrajectory`] if a step cannot be taken and with
    /// [`HfvtxError::NonConvergence`] if the closest approach is not found within 20 steps.
    pub fn propagate_to_dca(&self, track: &TrackState, point: &Vector3<f64>) -> HfvtxResult<TrackState> {
        const MAX_STEPS: usize = 20;
        const STEP_TOLERANCE: f64 = 1e-7;
        let mut current = if point.x.hypot(point.y) > ALMOST_ZERO {
            self.rotate_to_frame(track, point.y.atan2(point.x))
                .unwrap_or(*track)
        } else {
            *track
        };
        let target = frame_rotation(current.alpha()).transpose() * point;
        for _ in 0..MAX_STEPS {
            let tangent = current.local_tangent();
            let step = (target - current.local_position()).dot(&tangent) / tangent.norm_squared();
            current = self.propagate_to_x(&current, current.x() + step)?;
            if step.abs() < STEP_TOLERANCE {
                return Ok(current);
            }
        }
        Err(HfvtxError::NonConvergence {
            iterations: MAX_STEPS,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::SymmetricEigen;

    use super::*;
    use crate::track::{tests::diagonal_cov, COV_LEN};

    fn sample_track() -> TrackState {
        TrackState::new(
            3.0,
            0.4,
            [0.2, -1.0, 0.15, 0.6, 1.7],
            diagonal_cov([0.01, 0.02, 0.003, 0.002, 0.05]),
        )
        .unwrap()
    }

    fn min_eigenvalue(track: &TrackState) -> f64 {
        SymmetricEigen::new(track.covariance_matrix())
            .eigenvalues
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    fn assert_same_state(a: &TrackState, b: &TrackState) {
        assert_relative_eq!(a.x(), b.x(), epsilon = 1e-9);
        assert_relative_eq!(a.alpha(), b.alpha(), epsilon = 1e-12);
        for i in 0..5 {
            assert_relative_eq!(a.params()[i], b.params()[i], epsilon = 1e-9);
        }
        for i in 0..COV_LEN {
            assert_relative_eq!(a.cov()[i], b.cov()[i], epsilon = 1e-12, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_propagate_round_trip() {
        let propagator = Propagator::uniform(5.0);
        let track = sample_track();
        let there = propagator.propagate_to_x(&track, 25.0).unwrap();
        assert_relative_eq!(there.x(), 25.0);
        let back = propagator.propagate_to_x(&there, track.x()).unwrap();
        assert_same_state(&track, &back);
    }

    #[test]
    fn test_rotate_round_trip() {
        let propagator = Propagator::uniform(5.0);
        let track = sample_track();
        let rotated = propagator.rotate_to_frame(&track, 0.9).unwrap();
        assert_relative_eq!(rotated.alpha(), 0.9);
        let back = propagator.rotate_to_frame(&rotated, track.alpha()).unwrap();
        assert_same_state(&track, &back);
    }

    #[test]
    fn test_rotation_keeps_global_position_and_direction() {
        let propagator = Propagator::uniform(5.0);
        let track = sample_track();
        let rotated = propagator.rotate_to_frame(&track, -0.5).unwrap();
        let (a, b) = (track.global_position(), rotated.global_position());
        assert_relative_eq!(a.x, b.x, epsilon = 1e-12);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-12);
        assert_relative_eq!(a.z, b.z, epsilon = 1e-12);
        assert_relative_eq!(track.phi(), rotated.phi(), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_step_is_identity() {
        let propagator = Propagator::uniform(5.0);
        let track = sample_track();
        let same = propagator.propagate_to_x(&track, track.x()).unwrap();
        assert_eq!(same.params(), track.params());
        assert_relative_eq!(same.cov()[..], track.cov()[..]);
        let same = propagator.rotate_to_frame(&track, track.alpha()).unwrap();
        assert_same_state(&track, &same);
    }

    #[test]
    fn test_straight_line_in_zero_field() {
        let propagator = Propagator::uniform(0.0);
        let track = sample_track();
        let there = propagator.propagate_to_x(&track, 13.0).unwrap();
        let dx = 10.0;
        assert_relative_eq!(there.y(), track.y() + dx * track.snp() / track.csp(), epsilon = 1e-12);
        assert_relative_eq!(there.z(), track.z() + dx * track.tgl() / track.csp(), epsilon = 1e-12);
        assert_eq!(there.snp(), track.snp());
    }

    #[test]
    fn test_helix_stays_on_circle() {
        let bz = 5.0;
        let propagator = Propagator::uniform(bz);
        let track = sample_track();
        let crv = track.curvature(bz);
        let center = |t: &TrackState| {
            let phi = t.phi();
            t.global_position() + Vector3::new(-phi.sin(), phi.cos(), 0.0) / crv
        };
        let c0 = center(&track);
        for xk in [5.0, 12.0, 40.0, -2.0] {
            let moved = propagator.propagate_to_x(&track, xk).unwrap();
            let c = center(&moved);
            assert_relative_eq!(c.x, c0.x, epsilon = 1e-7, max_relative = 1e-10);
            assert_relative_eq!(c.y, c0.y, epsilon = 1e-7, max_relative = 1e-10);
            let r = (moved.global_position() - c0).xy().norm();
            assert_relative_eq!(r, 1.0 / crv.abs(), max_relative = 1e-10);
            // dz per unit transverse arc is tgl
            let arc = (moved.phi() - track.phi()).sin().asin() / crv;
            assert_relative_eq!(moved.z() - track.z(), track.tgl() * arc, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_turning_track_is_rejected() {
        let propagator = Propagator::uniform(5.0);
        let track =
            TrackState::new(0.0, 0.0, [0.0, 0.0, 0.9, 0.0, 10.0], [0.0; COV_LEN]).unwrap();
        // curvature -0.015 /cm with snp 0.9 turns over within a few cm backwards
        let err = propagator.propagate_to_x(&track, -20.0).unwrap_err();
        assert!(matches!(err, HfvtxError::DegenerateTrajectory { .. }));
        assert!(err.is_recoverable());
        let backwards = propagator.rotate_to_frame(&track, std::f64::consts::PI);
        assert!(backwards.is_err());
    }

    #[test]
    fn test_covariance_stays_positive_semidefinite() {
        let propagator = Propagator::uniform(5.0);
        let mut track = sample_track();
        for (alpha, xk) in [(0.6, 10.0), (0.2, 30.0), (-0.1, 4.0), (0.5, 60.0), (0.4, 3.0)] {
            track = propagator.rotate_and_propagate(&track, alpha, xk).unwrap();
            assert!(min_eigenvalue(&track) >= -1e-12);
            let m = track.covariance_matrix();
            assert_eq!(m, m.transpose());
        }
    }

    #[test]
    fn test_propagate_to_dca_of_point_on_track() {
        let propagator = Propagator::uniform(5.0);
        let track = sample_track();
        let on_track = propagator.propagate_to_x(&track, 20.0).unwrap().global_position();
        let at = propagator.propagate_to_dca(&track, &on_track).unwrap();
        assert_relative_eq!((at.global_position() - on_track).norm(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_propagate_to_dca_is_orthogonal() {
        let propagator = Propagator::uniform(5.0);
        let track = sample_track();
        let point = Vector3::new(10.0, 6.0, 2.0);
        let at = propagator.propagate_to_dca(&track, &point).unwrap();
        let residual = point - at.global_position();
        let tangent = at.global_tangent().normalize();
        assert!(residual.dot(&tangent).abs() < 1e-6);
    }

    #[test]
    fn test_position_dependent_field() {
        #[derive(Debug)]
        struct Solenoid;
        impl MagneticField for Solenoid {
            fn bz(&self, position: &Vector3<f64>) -> f64 {
                if position.xy().norm() < 100.0 {
                    5.0
                } else {
                    0.0
                }
            }
        }
        let propagator = Propagator::new(Solenoid);
        let inner = sample_track();
        assert_eq!(propagator.bz_at(&inner), 5.0);
        let outer = Propagator::uniform(5.0).propagate_to_x(&inner, 150.0).unwrap();
        assert_eq!(propagator.bz_at(&outer), 0.0);
        let straight = propagator.propagate_to_x(&outer, 160.0).unwrap();
        assert_eq!(straight.snp(), outer.snp());
    }
}
