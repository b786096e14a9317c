use hfvtx_core::{
    track::{cov_index, COV_LEN},
    Configuration, Event, HfvtxError, HfvtxResult, Propagator, TrackRecord, TrackState, Vector3,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use tracing::debug;

/// Settings of the synthetic event generator. Distances are in cm, momenta in GeV, and the field
/// in kG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Seed of the random number generator.
    pub seed: u64,
    /// Number of events produced by [`SyntheticEvents::generate`].
    pub n_events: usize,
    /// Displaced two-prong decays per event.
    pub decays_per_event: usize,
    /// Prompt tracks per event, all coming from the primary vertex.
    pub prompt_tracks: usize,
    /// Largest transverse displacement of a decay vertex from the beam line.
    pub max_decay_radius: f64,
    /// Transverse momentum range of the daughters.
    pub pt_range: (f64, f64),
    /// Range of the transverse opening angle between the two daughters of a decay, within
    /// $`[0, \pi]`$.
    pub opening_range: (f64, f64),
    /// Uniform field along the beam.
    pub bz: f64,
    /// Per-parameter uncertainties `[y, z, snp, tgl, q2pt]` of every track.
    pub sigmas: [f64; 5],
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            n_events: 100,
            decays_per_event: 2,
            prompt_tracks: 6,
            max_decay_radius: 0.08,
            pt_range: (0.5, 5.0),
            opening_range: (0.2, PI),
            bz: 5.0,
            sigmas: [2e-3, 2e-3, 1e-4, 1e-4, 1e-3],
        }
    }
}

impl Configuration for SyntheticConfig {
    fn validate(&self) -> HfvtxResult<()> {
        if !(self.pt_range.0 > 0.0 && self.pt_range.0 <= self.pt_range.1) {
            return Err(HfvtxError::InvalidConfiguration {
                reason: format!(
                    "pt_range must be positive and increasing, got {:?}",
                    self.pt_range
                ),
            });
        }
        let (min_opening, max_opening) = self.opening_range;
        if !(0.0 <= min_opening && min_opening <= max_opening && max_opening <= PI) {
            return Err(HfvtxError::InvalidConfiguration {
                reason: format!(
                    "opening_range must be increasing within [0, pi], got {:?}",
                    self.opening_range
                ),
            });
        }
        if !(self.max_decay_radius >= 0.0) || self.sigmas.iter().any(|s| !(*s >= 0.0)) {
            return Err(HfvtxError::InvalidConfiguration {
                reason: "max_decay_radius and sigmas must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Generates events from a fixed seed. The same configuration always gives the same events.
#[derive(Debug)]
pub struct SyntheticEvents {
    config: SyntheticConfig,
    rng: fastrand::Rng,
    propagator: Propagator,
    cov: [f64; COV_LEN],
}

impl SyntheticEvents {
    /// A generator seeded with [`SyntheticConfig::seed`].
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::InvalidConfiguration`] if the configuration fails validation.
    pub fn new(config: SyntheticConfig) -> HfvtxResult<Self> {
        config.validate()?;
        let mut cov = [0.0; COV_LEN];
        for (i, sigma) in config.sigmas.iter().enumerate() {
            cov[cov_index(i, i)] = sigma * sigma;
        }
        Ok(Self {
            rng: fastrand::Rng::with_seed(config.seed),
            propagator: Propagator::uniform(config.bz),
            cov,
            config,
        })
    }

    fn uniform(&mut self, (min, max): (f64, f64)) -> f64 {
        min + (max - min) * self.rng.f64()
    }

    /// A signed $`q/p_T`$ with the given charge sign.
    fn q2pt(&mut self, positive: bool) -> f64 {
        let pt = self.uniform(self.config.pt_range);
        if positive {
            1.0 / pt
        } else {
            -1.0 / pt
        }
    }

    /// A track leaving `origin`, reported a few cm downstream as a tracker would.
    fn track_from(&mut self, origin: &Vector3<f64>, phi: f64, q2pt: f64) -> HfvtxResult<TrackState> {
        let tgl = self.uniform((-0.8, 0.8));
        let step = self.uniform((2.0, 20.0));
        let state = TrackState::at_point(origin, phi, tgl, q2pt, self.cov)?;
        self.propagator.propagate_to_x(&state, state.x() + step)
    }

    /// Generate the next event.
    pub fn next_event(&mut self, id: u64) -> Event {
        let primary = Vector3::new(0.0, 0.0, self.uniform((-5.0, 5.0)));
        let mut states = Vec::new();
        for _ in 0..self.config.decays_per_event {
            let radius = self.uniform((0.0, self.config.max_decay_radius));
            let azimuth = self.uniform((0.0, TAU));
            let vertex = primary
                + Vector3::new(
                    radius * azimuth.cos(),
                    radius * azimuth.sin(),
                    self.uniform((-0.05, 0.05)),
                );
            let direction = self.uniform((0.0, TAU));
            let opening = self.uniform(self.config.opening_range);
            let positive = self.rng.bool();
            let q2pt_a = self.q2pt(positive);
            let q2pt_b = self.q2pt(!positive);
            states.push(self.track_from(&vertex, direction + opening / 2.0, q2pt_a));
            states.push(self.track_from(&vertex, direction - opening / 2.0, q2pt_b));
        }
        for _ in 0..self.config.prompt_tracks {
            let phi = self.uniform((0.0, TAU));
            let positive = self.rng.bool();
            let q2pt = self.q2pt(positive);
            states.push(self.track_from(&primary, phi, q2pt));
        }
        let records: Vec<TrackRecord> = states
            .into_iter()
            .filter_map(Result::ok)
            .enumerate()
            .map(|(index, state)| TrackRecord::from_state(index, &state))
            .collect();
        debug!("generated event {id} with {} tracks", records.len());
        Event::new(id, records)
    }

    /// Generate [`SyntheticConfig::n_events`] events with ids `0..n_events`.
    pub fn generate(&mut self) -> Vec<Event> {
        (0..self.config.n_events as u64)
            .map(|id| self.next_event(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use hfvtx_candidates::{Vertexer, VertexerConfig};
    use hfvtx_core::NoopSink;

    use super::*;

    #[test]
    fn test_generation_is_reproducible() {
        let config = SyntheticConfig {
            n_events: 5,
            ..Default::default()
        };
        let first = SyntheticEvents::new(config.clone()).unwrap().generate();
        let second = SyntheticEvents::new(config).unwrap().generate();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
        for (id, event) in first.iter().enumerate() {
            assert_eq!(event.id, id as u64);
            for (index, record) in event.tracks.iter().enumerate() {
                assert_eq!(record.index, index);
                assert!(record.state().is_ok());
            }
        }
    }

    #[test]
    fn test_decays_are_found() {
        let config = SyntheticConfig {
            n_events: 4,
            decays_per_event: 1,
            prompt_tracks: 0,
            ..Default::default()
        };
        let events = SyntheticEvents::new(config).unwrap().generate();
        let vertexer = Vertexer::new(VertexerConfig::default()).unwrap();
        let output = vertexer.process_events(&events, &NoopSink);
        assert_eq!(output.vertices.n_events(), 4);
        for event in &events {
            let rows = output.vertices.rows_for(event.id);
            assert!(rows.iter().any(|row| row.position().xy().norm() < 0.1));
        }
    }

    #[test]
    fn test_wide_openings_are_found() {
        let config = SyntheticConfig {
            seed: 7,
            n_events: 6,
            decays_per_event: 1,
            prompt_tracks: 0,
            opening_range: (2.0, 3.0),
            ..Default::default()
        };
        let events = SyntheticEvents::new(config).unwrap().generate();
        let vertexer = Vertexer::new(VertexerConfig::default()).unwrap();
        let output = vertexer.process_events(&events, &NoopSink);
        for event in &events {
            let rows = output.vertices.rows_for(event.id);
            assert!(
                rows.iter().any(|row| row.position().xy().norm() < 0.1),
                "no decay vertex in event {}",
                event.id
            );
        }
    }

    #[test]
    fn test_invalid_config() {
        let config = SyntheticConfig {
            pt_range: (2.0, 1.0),
            ..Default::default()
        };
        assert!(SyntheticEvents::new(config).is_err());
        for opening_range in [(1.0, 0.5), (-0.1, 1.0), (0.2, 4.0)] {
            let config = SyntheticConfig {
                opening_range,
                ..Default::default()
            };
            assert!(SyntheticEvents::new(config).is_err());
        }
    }
}
