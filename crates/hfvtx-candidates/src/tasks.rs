use hfvtx_core::{
    Cand2ProngRecord, Event, HfvtxResult, HistogramRegistry, Propagator, QaSink,
    SecondaryVertexRecord,
};
use tracing::{debug, trace};

use crate::assembler::{build_two_prong, TwoBodyHypothesis};

/// Transverse momentum and dip-angle distributions of all tracks, before any selection.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackQa;

impl TrackQa {
    pub fn register_histograms(&self, registry: &HistogramRegistry) -> HfvtxResult<()> {
        registry.add("hpt_nocuts", 100, (0.0, 10.0))?;
        registry.add("htgl_nocuts", 100, (-5.0, 5.0))
    }

    pub fn process(&self, event: &Event, sink: &dyn QaSink) {
        for record in &event.tracks {
            let q2pt = record.params[4];
            let pt = if q2pt != 0.0 {
                1.0 / q2pt.abs()
            } else {
                f64::INFINITY
            };
            sink.fill("hpt_nocuts", pt);
            sink.fill("htgl_nocuts", record.params[3]);
        }
        debug!("event {}: {} tracks", event.id, event.tracks.len());
    }
}

/// Rebuilds two-prong candidates from stored vertices and the track table of their event.
#[derive(Debug, Clone)]
pub struct TwoProngBuilder {
    propagator: Propagator,
    hypothesis: TwoBodyHypothesis,
}

impl TwoProngBuilder {
    pub fn new(propagator: Propagator, hypothesis: TwoBodyHypothesis) -> Self {
        Self {
            propagator,
            hypothesis,
        }
    }

    /// One candidate per vertex of `event`, in vertex order. `vertices` are the rows the vertexer
    /// stored for this event; their position in the slice is the vertex row.
    ///
    /// Vertices whose daughters cannot be transported to the vertex are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::IndexOutOfRange`](hfvtx_core::HfvtxError::IndexOutOfRange) if a
    /// vertex refers to a track which is not in the event.
    pub fn process(
        &self,
        event: &Event,
        vertices: &[SecondaryVertexRecord],
    ) -> HfvtxResult<Vec<Cand2ProngRecord>> {
        let mut candidates = Vec::with_capacity(vertices.len());
        for (row, vertex) in vertices.iter().enumerate() {
            match build_two_prong(vertex, row, &event.tracks, &self.propagator, &self.hypothesis)
            {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => trace!("vertex {row} of event {} has a straight daughter", event.id),
                Err(err) if err.is_recoverable() => {
                    trace!("skipping vertex {row} of event {}: {err}", event.id)
                }
                Err(err) => return Err(err),
            }
        }
        Ok(candidates)
    }
}
