//! Pairwise secondary-vertex finding over events.
//!
//! For every event, all unordered track pairs `(i, j)` with `i < j` are handed to the
//! [`DcaFitter`]; each accepted candidate becomes one [`SecondaryVertexRecord`] (and, with a mass
//! hypothesis configured, one [`Cand2ProngRecord`]). Rows keep the pair order and, within a pair,
//! the order of the fitter's candidates, whatever the thread policy.

use hfvtx_core::{
    Cand2ProngRecord, Configuration, DcaFitter, Event, ExecutionContext, FitterConfig,
    HfvtxError, HfvtxResult, HistogramRegistry, MagneticField, Propagator, QaSink,
    RecordCollector, SecondaryVertexRecord, ThreadPolicy, TrackState, UniformField,
    VertexCandidate,
};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::assembler::{CandidateAssembler, TwoBodyHypothesis};

/// Bins and range of the vertex position histograms, in cm.
const VERTEX_BINNING: (usize, (f64, f64)) = (100, (-0.1, 0.1));
/// Bins and range of the track index histogram.
const INDEX_BINNING: (usize, (f64, f64)) = (1000, (-0.5, 999.5));

/// Settings of the [`Vertexer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexerConfig {
    /// Uniform field along the beam, in kG. Ignored by [`Vertexer::with_field`].
    pub bz: f64,
    /// Fields left out of a JSON `fitter` object keep the values of [`VertexerConfig::default`].
    #[serde(deserialize_with = "fitter_over_default")]
    pub fitter: FitterConfig,
    /// Mass hypothesis for the two-prong candidates; no candidates are built without one.
    pub hypothesis: Option<TwoBodyHypothesis>,
    pub thread_policy: ThreadPolicy,
}

impl Default for VertexerConfig {
    fn default() -> Self {
        Self {
            bz: 5.0,
            fitter: FitterConfig::new(5.0, 10.0).with_abs_dca(true),
            hypothesis: Some(TwoBodyHypothesis::default()),
            thread_policy: ThreadPolicy::default(),
        }
    }
}

fn fitter_over_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FitterConfig, D::Error> {
    let overrides = Map::<String, Value>::deserialize(deserializer)?;
    let mut merged =
        serde_json::to_value(VertexerConfig::default().fitter).map_err(D::Error::custom)?;
    if let Value::Object(fields) = &mut merged {
        fields.extend(overrides);
    }
    serde_json::from_value(merged).map_err(D::Error::custom)
}

impl Configuration for VertexerConfig {
    fn validate(&self) -> HfvtxResult<()> {
        if !self.bz.is_finite() {
            return Err(HfvtxError::InvalidConfiguration {
                reason: format!("bz must be finite, got {}", self.bz),
            });
        }
        if self.thread_policy == ThreadPolicy::Dedicated(0) {
            return Err(HfvtxError::InvalidConfiguration {
                reason: "thread_policy dedicated:0 has no threads to run on".to_string(),
            });
        }
        if let Some(hypothesis) = &self.hypothesis {
            if !(hypothesis.mass0 >= 0.0 && hypothesis.mass1 >= 0.0) {
                return Err(HfvtxError::InvalidConfiguration {
                    reason: format!("hypothesis masses must be non-negative, got {hypothesis}"),
                });
            }
        }
        self.fitter.validate()
    }
}

/// The rows found in one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventVertices {
    pub vertices: Vec<SecondaryVertexRecord>,
    pub candidates: Vec<Cand2ProngRecord>,
}

/// The rows found in a sequence of events.
#[derive(Debug, Default)]
pub struct VertexerOutput {
    pub vertices: RecordCollector<SecondaryVertexRecord>,
    pub candidates: RecordCollector<Cand2ProngRecord>,
}

/// Finds two-prong secondary vertices in events.
#[derive(Debug)]
pub struct Vertexer {
    fitter: DcaFitter,
    assembler: CandidateAssembler,
    context: ExecutionContext,
}

impl Vertexer {
    /// A vertexer in the uniform field given by [`VertexerConfig::bz`].
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::InvalidConfiguration`] if the configuration fails validation, and
    /// [`HfvtxError::ThreadPoolError`] if a dedicated pool cannot be built.
    pub fn new(config: VertexerConfig) -> HfvtxResult<Self> {
        let bz = config.bz;
        Self::with_field(config, UniformField(bz))
    }

    /// A vertexer in an arbitrary field.
    pub fn with_field<F: MagneticField + 'static>(
        config: VertexerConfig,
        field: F,
    ) -> HfvtxResult<Self> {
        config.validate()?;
        let fitter = DcaFitter::new(config.fitter, Propagator::new(field))?;
        let context = ExecutionContext::new(config.thread_policy)?;
        Ok(Self {
            fitter,
            assembler: CandidateAssembler::new(config.hypothesis),
            context,
        })
    }

    pub fn fitter(&self) -> &DcaFitter {
        &self.fitter
    }

    pub fn propagator(&self) -> &Propagator {
        self.fitter.propagator()
    }

    pub fn thread_policy(&self) -> ThreadPolicy {
        self.context.thread_policy()
    }

    /// Register the histograms this task fills.
    pub fn register_histograms(&self, registry: &HistogramRegistry) -> HfvtxResult<()> {
        for name in ["hvtx_x", "hvtx_y", "hvtx_z"] {
            registry.add(name, VERTEX_BINNING.0, VERTEX_BINNING.1)?;
        }
        registry.add("hindex_0_coll", INDEX_BINNING.0, INDEX_BINNING.1)
    }

    /// Find the vertices of a single event.
    ///
    /// Tracks whose records are not valid states are skipped. The fits of the track pairs are
    /// spread over threads when the thread policy allows it.
    pub fn process_event(&self, event: &Event, sink: &dyn QaSink) -> EventVertices {
        let states: Vec<Option<TrackState>> = event
            .tracks
            .iter()
            .map(|record| {
                sink.fill("hindex_0_coll", record.index as f64);
                record
                    .state()
                    .map_err(|err| {
                        trace!("skipping track {} of event {}: {err}", record.index, event.id)
                    })
                    .ok()
            })
            .collect();
        let pairs: Vec<(usize, usize)> = event
            .tracks
            .pairs()
            .filter(|&(i, j)| states[i].is_some() && states[j].is_some())
            .collect();
        let fit = |&(i, j): &(usize, usize)| -> (usize, usize, Vec<VertexCandidate>) {
            match (&states[i], &states[j]) {
                (Some(a), Some(b)) => (i, j, self.fitter.find_closest_approach(a, b)),
                _ => (i, j, Vec::new()),
            }
        };
        #[cfg(feature = "rayon")]
        let fitted: Vec<_> = if self.context.is_parallel() {
            self.context.install(|| pairs.par_iter().map(fit).collect())
        } else {
            pairs.iter().map(fit).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let fitted: Vec<_> = pairs.iter().map(fit).collect();

        let mut output = EventVertices::default();
        for (i, j, candidates) in fitted {
            let (Ok(record_a), Ok(record_b)) = (event.tracks.get(i), event.tracks.get(j)) else {
                continue;
            };
            for candidate in &candidates {
                sink.fill("hvtx_x", candidate.position.x);
                sink.fill("hvtx_y", candidate.position.y);
                sink.fill("hvtx_z", candidate.position.z);
                let assembled = self.assembler.assemble(
                    event.id,
                    output.vertices.len(),
                    candidate,
                    record_a.index,
                    record_b.index,
                );
                output.vertices.push(assembled.vertex);
                output.candidates.extend(assembled.two_prong);
            }
        }
        debug!(
            "event {}: {} tracks, {} pairs, {} vertices",
            event.id,
            states.len(),
            pairs.len(),
            output.vertices.len()
        );
        output
    }

    /// Find the vertices of many events. Events are processed in parallel when the thread policy
    /// allows it, and every event is registered in the output even when it has no vertex.
    pub fn process_events(&self, events: &[Event], sink: &dyn QaSink) -> VertexerOutput {
        let output = VertexerOutput::default();
        let run = |event: &Event| {
            let found = self.process_event(event, sink);
            output.vertices.append(event.id, found.vertices);
            output.candidates.append(event.id, found.candidates);
        };
        #[cfg(feature = "rayon")]
        {
            if self.context.is_parallel() {
                self.context.install(|| events.par_iter().for_each(run));
            } else {
                events.iter().for_each(run);
            }
        }
        #[cfg(not(feature = "rayon"))]
        events.iter().for_each(run);
        debug!(
            "{} events gave {} vertices and {} candidates",
            events.len(),
            output.vertices.len(),
            output.candidates.len()
        );
        output
    }
}
