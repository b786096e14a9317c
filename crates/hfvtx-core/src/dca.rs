use std::f64::consts::PI;

use nalgebra::{Matrix3, Matrix3x2, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    propagator::Propagator,
    track::{frame_rotation, TrackState},
    utils::{bring_to_pm_pi, constants::STRAIGHT_LINE_CURVATURE, enums::DcaMetric},
    Configuration, HfvtxError, HfvtxResult,
};

/// Candidates closer than this many tolerances are the same solution reached from two seeds.
const DUPLICATE_SCALE: f64 = 100.0;
/// Relative slack before a growing objective counts as divergence.
const DIVERGENCE_SLACK: f64 = 1e-6;
const GEOMETRY_EPSILON: f64 = 1e-9;

/// Settings of the [`DcaFitter`]. Distances are in cm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterConfig {
    /// Transverse radius preferred when ordering seeds, and where the fallback seed is put when
    /// the trajectories have no defined crossing.
    pub seed_radius: f64,
    /// Largest accepted distance between the two tracks at the candidate.
    pub max_dca: f64,
    /// Largest accepted transverse radius of a candidate.
    pub max_r: f64,
    /// Largest accepted covariance-weighted distance.
    pub max_chi2: f64,
    /// Minimize the plain distance instead of the covariance-weighted one.
    pub use_abs_dca: bool,
    pub max_iterations: usize,
    /// Convergence threshold on the largest step along either track.
    pub tolerance: f64,
    pub max_candidates: usize,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            seed_radius: 5.0,
            max_dca: 10.0,
            max_r: 200.0,
            max_chi2: 1e9,
            use_abs_dca: false,
            max_iterations: 20,
            tolerance: 1e-5,
            max_candidates: 2,
        }
    }
}

impl FitterConfig {
    /// Defaults with the given seed radius and maximum DCA.
    pub fn new(seed_radius: f64, max_dca: f64) -> Self {
        Self {
            seed_radius,
            max_dca,
            ..Default::default()
        }
    }

    pub fn with_abs_dca(mut self, use_abs_dca: bool) -> Self {
        self.use_abs_dca = use_abs_dca;
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_max_r(mut self, max_r: f64) -> Self {
        self.max_r = max_r;
        self
    }

    pub fn metric(&self) -> DcaMetric {
        if self.use_abs_dca {
            DcaMetric::Absolute
        } else {
            DcaMetric::Weighted
        }
    }
}

impl Configuration for FitterConfig {
    fn validate(&self) -> HfvtxResult<()> {
        let positive = [
            ("max_dca", self.max_dca),
            ("max_r", self.max_r),
            ("max_chi2", self.max_chi2),
            ("tolerance", self.tolerance),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(HfvtxError::invalid_config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(self.seed_radius >= 0.0 && self.seed_radius.is_finite()) {
            return Err(HfvtxError::invalid_config(format!(
                "seed_radius must be finite and non-negative, got {}",
                self.seed_radius
            )));
        }
        if self.max_iterations == 0 || self.max_candidates == 0 {
            return Err(HfvtxError::invalid_config(
                "max_iterations and max_candidates must be at least one",
            ));
        }
        Ok(())
    }
}

/// A secondary vertex found by the [`DcaFitter`].
#[derive(Debug, Clone, PartialEq)]
pub struct VertexCandidate {
    /// Global vertex position.
    pub position: Vector3<f64>,
    /// The two tracks at their points of closest approach, in the same order as given to the
    /// fitter.
    pub tracks: [TrackState; 2],
    /// Distance between the two tracks.
    pub dca: f64,
    /// Distance weighted by the inverse of the summed position covariances.
    pub chi2: f64,
    /// Iterations used by the minimization.
    pub iterations: usize,
}

impl VertexCandidate {
    /// Transverse radius of the vertex.
    pub fn radius(&self) -> f64 {
        self.position.xy().norm()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trajectory {
    Line {
        point: Vector2<f64>,
        direction: Vector2<f64>,
    },
    Circle {
        center: Vector2<f64>,
        radius: f64,
    },
}

impl Trajectory {
    fn of(track: &TrackState, bz: f64) -> Self {
        let point = track.global_position().xy();
        let phi = track.phi();
        let direction = Vector2::new(phi.cos(), phi.sin());
        let crv = track.curvature(bz);
        if crv.abs() < STRAIGHT_LINE_CURVATURE {
            Trajectory::Line { point, direction }
        } else {
            Trajectory::Circle {
                center: point + Vector2::new(-direction.y, direction.x) / crv,
                radius: 1.0 / crv.abs(),
            }
        }
    }
}

/// A transverse starting point, with the transverse gap between the trajectories there.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Seed {
    point: Vector2<f64>,
    gap: f64,
}

impl Seed {
    fn crossing(point: Vector2<f64>) -> Self {
        Self { point, gap: 0.0 }
    }

    fn between(a: Vector2<f64>, b: Vector2<f64>) -> Self {
        Self {
            point: 0.5 * (a + b),
            gap: (a - b).norm(),
        }
    }
}

/// Transverse crossings of two circles, or their closest approach if they do not cross. `None`
/// for concentric circles.
fn circle_circle(
    c1: Vector2<f64>,
    r1: f64,
    c2: Vector2<f64>,
    r2: f64,
    max_gap: f64,
) -> Option<Vec<Seed>> {
    let delta = c2 - c1;
    let d = delta.norm();
    if d < GEOMETRY_EPSILON {
        return None;
    }
    let u = delta / d;
    if d > r1 + r2 {
        if d - r1 - r2 > max_gap {
            return Some(Vec::new());
        }
        return Some(vec![Seed::between(c1 + u * r1, c2 - u * r2)]);
    }
    if d < (r1 - r2).abs() {
        if (r1 - r2).abs() - d > max_gap {
            return Some(Vec::new());
        }
        // nested: closest on the side the inner circle is shifted towards
        let side = if r1 >= r2 { 1.0 } else { -1.0 };
        return Some(vec![Seed::between(c1 + u * (side * r1), c2 + u * (side * r2))]);
    }
    let a = (d * d + r1 * r1 - r2 * r2) / (2.0 * d);
    let h = (r1 * r1 - a * a).max(0.0).sqrt();
    let base = c1 + u * a;
    if h < GEOMETRY_EPSILON {
        return Some(vec![Seed::crossing(base)]);
    }
    let perp = Vector2::new(-u.y, u.x);
    Some(vec![
        Seed::crossing(base + perp * h),
        Seed::crossing(base - perp * h),
    ])
}

fn line_circle(
    point: Vector2<f64>,
    direction: Vector2<f64>,
    center: Vector2<f64>,
    radius: f64,
    max_gap: f64,
) -> Vec<Seed> {
    let foot = point + direction * (center - point).dot(&direction);
    let offset = foot - center;
    let h = offset.norm();
    if h > radius {
        if h - radius > max_gap {
            return Vec::new();
        }
        return vec![Seed::between(foot, center + offset * (radius / h))];
    }
    let s = ((radius - h) * (radius + h)).sqrt();
    if s < GEOMETRY_EPSILON {
        return vec![Seed::crossing(foot)];
    }
    vec![
        Seed::crossing(foot + direction * s),
        Seed::crossing(foot - direction * s),
    ]
}

/// `None` for parallel lines.
fn line_line(
    p1: Vector2<f64>,
    d1: Vector2<f64>,
    p2: Vector2<f64>,
    d2: Vector2<f64>,
) -> Option<Vec<Seed>> {
    let cross = d1.perp(&d2);
    if cross.abs() < GEOMETRY_EPSILON {
        return None;
    }
    let t = (p2 - p1).perp(&d2) / cross;
    Some(vec![Seed::crossing(p1 + d1 * t)])
}

/// Transverse position covariance in global coordinates. The local frame only measures `y` and
/// `z`; along its `x` the mean of the two is used so that the matrix can be inverted.
fn position_covariance(track: &TrackState) -> Matrix3<f64> {
    let yz = track.position_covariance_yz();
    let along = 0.5 * (yz[(0, 0)] + yz[(1, 1)]);
    let local = Matrix3::new(
        along,
        0.0,
        0.0,
        0.0,
        yz[(0, 0)],
        yz[(0, 1)],
        0.0,
        yz[(1, 0)],
        yz[(1, 1)],
    );
    let rotation = frame_rotation(track.alpha());
    rotation * local * rotation.transpose()
}

/// Finds the points where two tracks come closest to one another.
///
/// For a pair of tracks the fitter
/// 1. computes transverse seeds from the crossings of the two circles (or lines, for tracks
///    without curvature) and orders them by how close their radius is to
///    [`FitterConfig::seed_radius`],
/// 2. moves both tracks to each seed, in the frame pointing at it, and minimizes the distance
///    between them by Gauss-Newton steps along each track's local `x`,
/// 3. keeps converged solutions which pass the distance, radius and $`\chi^2`$ limits.
///
/// ```rust
/// use hfvtx_core::{DcaFitter, FitterConfig, Propagator, TrackState, Vector3};
///
/// let vertex = Vector3::new(2.0, 1.0, 0.3);
/// let a = TrackState::at_point(&vertex, 0.2, 0.1, 1.0, [0.0; 15]).unwrap();
/// let b = TrackState::at_point(&vertex, 0.9, -0.2, -1.0, [0.0; 15]).unwrap();
/// let fitter = DcaFitter::new(FitterConfig::new(5.0, 10.0), Propagator::uniform(5.0)).unwrap();
/// let candidates = fitter.find_closest_approach(&a, &b);
/// assert_eq!(candidates.len(), 1);
/// assert!((candidates[0].position - vertex).norm() < 1e-4);
/// ```
#[derive(Debug, Clone)]
pub struct DcaFitter {
    config: FitterConfig,
    propagator: Propagator,
}

impl DcaFitter {
    /// # Errors
    ///
    /// Returns [`HfvtxError::InvalidConfiguration`] for a configuration which fails
    /// [`Configuration::validate`].
    pub fn new(config: FitterConfig, propagator: Propagator) -> HfvtxResult<Self> {
        config.validate()?;
        Ok(Self { config, propagator })
    }

    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    /// Vertex candidates for a pair of tracks, in seed order. At most
    /// [`FitterConfig::max_candidates`] are returned, and an empty result means the pair does not
    /// form a vertex.
    pub fn find_closest_approach(
        &self,
        track_a: &TrackState,
        track_b: &TrackState,
    ) -> Vec<VertexCandidate> {
        let seeds = self.seeds(track_a, track_b);
        let duplicate_distance = DUPLICATE_SCALE * self.config.tolerance;
        let mut candidates: Vec<VertexCandidate> = Vec::new();
        for seed in &seeds {
            if candidates.len() >= self.config.max_candidates {
                break;
            }
            let candidate = match self.fit_seed(track_a, track_b, seed) {
                Ok(candidate) => candidate,
                Err(err) => {
                    trace!(
                        "abandoned seed at {:?} with gap {:.3e}: {err}",
                        seed.point,
                        seed.gap
                    );
                    continue;
                }
            };
            if !self.accepts(&candidate) {
                trace!(
                    "rejected candidate at r = {:.4} with dca = {:.3e}, chi2 = {:.3e}",
                    candidate.radius(),
                    candidate.dca,
                    candidate.chi2
                );
                continue;
            }
            if candidates
                .iter()
                .any(|c| (c.position - candidate.position).norm() < duplicate_distance)
            {
                continue;
            }
            candidates.push(candidate);
        }
        debug!(
            "{} seed(s) gave {} candidate(s)",
            seeds.len(),
            candidates.len()
        );
        candidates
    }

    fn seeds(&self, track_a: &TrackState, track_b: &TrackState) -> Vec<Seed> {
        let max_gap = self.config.max_dca;
        let ta = Trajectory::of(track_a, self.propagator.bz_at(track_a));
        let tb = Trajectory::of(track_b, self.propagator.bz_at(track_b));
        let found = match (ta, tb) {
            (
                Trajectory::Circle {
                    center: c1,
                    radius: r1,
                },
                Trajectory::Circle {
                    center: c2,
                    radius: r2,
                },
            ) => circle_circle(c1, r1, c2, r2, max_gap),
            (Trajectory::Line { point, direction }, Trajectory::Circle { center, radius })
            | (Trajectory::Circle { center, radius }, Trajectory::Line { point, direction }) => {
                Some(line_circle(point, direction, center, radius, max_gap))
            }
            (
                Trajectory::Line {
                    point: p1,
                    direction: d1,
                },
                Trajectory::Line {
                    point: p2,
                    direction: d2,
                },
            ) => line_line(p1, d1, p2, d2),
        };
        let mut seeds = found.unwrap_or_else(|| vec![self.fallback_seed(track_a, track_b)]);
        seeds.retain(|seed| seed.point.norm() <= self.config.max_r);
        let preferred = self.config.seed_radius;
        seeds.sort_by(|s1, s2| {
            (s1.point.norm() - preferred)
                .abs()
                .total_cmp(&(s2.point.norm() - preferred).abs())
        });
        trace!("seeds: {seeds:?}");
        seeds
    }

    /// A seed at the preferred radius, in the mean direction of the two tracks.
    fn fallback_seed(&self, track_a: &TrackState, track_b: &TrackState) -> Seed {
        let mean = 0.5 * (track_a.global_position().xy() + track_b.global_position().xy());
        let direction = if mean.norm() > GEOMETRY_EPSILON {
            mean.normalize()
        } else {
            let t = track_a.global_tangent().xy() + track_b.global_tangent().xy();
            if t.norm() > GEOMETRY_EPSILON {
                t.normalize()
            } else {
                Vector2::x()
            }
        };
        Seed::crossing(direction * self.config.seed_radius)
    }

    fn metric(&self, track_a: &TrackState, track_b: &TrackState) -> Matrix3<f64> {
        match self.config.metric() {
            DcaMetric::Absolute => Matrix3::identity(),
            DcaMetric::Weighted => (position_covariance(track_a) + position_covariance(track_b))
                .try_inverse()
                .unwrap_or_else(Matrix3::identity),
        }
    }

    /// Express a track in the frame pointing at the seed, flipped by $`\pi`$ when the track runs
    /// towards the beam there, and move it to the seed. A track crossing the radial direction
    /// too steeply for that frame is instead carried in the frame of its own heading.
    fn working_copy(&self, track: &TrackState, seed: &Vector2<f64>) -> HfvtxResult<TrackState> {
        let heading = heading_towards(track, seed, self.propagator.bz_at(track));
        let r = seed.norm();
        if r > GEOMETRY_EPSILON {
            let radial = seed.y.atan2(seed.x);
            let (alpha, x0) = if (heading - radial).cos() >= 0.0 {
                (radial, r)
            } else {
                (radial + PI, -r)
            };
            match self.propagator.rotate_and_propagate(track, alpha, x0) {
                Ok(working) => return Ok(working),
                Err(err) => trace!("falling back to the frame at alpha = {heading:.4}: {err}"),
            }
        }
        let x0 = seed.dot(&Vector2::new(heading.cos(), heading.sin()));
        self.propagator.rotate_and_propagate(track, heading, x0)
    }

    fn fit_seed(
        &self,
        track_a: &TrackState,
        track_b: &TrackState,
        seed: &Seed,
    ) -> HfvtxResult<VertexCandidate> {
        let mut wa = self.working_copy(track_a, &seed.point)?;
        let mut wb = self.working_copy(track_b, &seed.point)?;
        let mut previous = f64::INFINITY;
        for iteration in 1..=self.config.max_iterations {
            let metric = self.metric(&wa, &wb);
            let residual = wa.global_position() - wb.global_position();
            let jac = Matrix3x2::from_columns(&[wa.global_tangent(), -wb.global_tangent()]);
            let jt_w = jac.transpose() * metric;
            let step = (jt_w * jac)
                .try_inverse()
                .ok_or_else(|| HfvtxError::degenerate("tracks are parallel at the seed"))?
                * -(jt_w * residual);
            wa = self.propagator.propagate_to_x(&wa, wa.x() + step[0])?;
            wb = self.propagator.propagate_to_x(&wb, wb.x() + step[1])?;
            if step.amax() < self.config.tolerance {
                return Ok(self.candidate(wa, wb, iteration));
            }
            let residual = wa.global_position() - wb.global_position();
            let objective = residual.dot(&(metric * residual));
            if objective > previous * (1.0 + DIVERGENCE_SLACK) + f64::EPSILON {
                return Err(HfvtxError::NonConvergence {
                    iterations: iteration,
                });
            }
            previous = objective;
        }
        Err(HfvtxError::NonConvergence {
            iterations: self.config.max_iterations,
        })
    }

    fn candidate(&self, track_a: TrackState, track_b: TrackState, iterations: usize) -> VertexCandidate {
        let (pa, pb) = (track_a.global_position(), track_b.global_position());
        let residual = pa - pb;
        let dca = residual.norm();
        let (cov_a, cov_b) = (position_covariance(&track_a), position_covariance(&track_b));
        let chi2 = (cov_a + cov_b)
            .try_inverse()
            .map_or(dca * dca, |w| residual.dot(&(w * residual)));
        let midpoint = 0.5 * (pa + pb);
        let position = match self.config.metric() {
            DcaMetric::Absolute => midpoint,
            DcaMetric::Weighted => weighted_mean(&pa, &cov_a, &pb, &cov_b).unwrap_or(midpoint),
        };
        VertexCandidate {
            position,
            tracks: [track_a, track_b],
            dca,
            chi2,
            iterations,
        }
    }

    fn accepts(&self, candidate: &VertexCandidate) -> bool {
        candidate.dca <= self.config.max_dca
            && candidate.chi2 <= self.config.max_chi2
            && candidate.radius() <= self.config.max_r
    }
}

/// Transverse direction halfway along the arc from the track's current position to `seed`.
fn heading_towards(track: &TrackState, seed: &Vector2<f64>, bz: f64) -> f64 {
    let phi = track.phi();
    let crv = track.curvature(bz);
    if crv.abs() < STRAIGHT_LINE_CURVATURE {
        return phi;
    }
    let normal = Vector2::new(-phi.sin(), phi.cos());
    let center = track.global_position().xy() + normal / crv;
    let normal_at_seed = -crv * (seed - center);
    let at_seed = (-normal_at_seed.x).atan2(normal_at_seed.y);
    phi + 0.5 * bring_to_pm_pi(at_seed - phi)
}

fn weighted_mean(
    pa: &Vector3<f64>,
    cov_a: &Matrix3<f64>,
    pb: &Vector3<f64>,
    cov_b: &Matrix3<f64>,
) -> Option<Vector3<f64>> {
    let wa = cov_a.try_inverse()?;
    let wb = cov_b.try_inverse()?;
    Some((wa + wb).try_inverse()? * (wa * pa + wb * pb))
}
