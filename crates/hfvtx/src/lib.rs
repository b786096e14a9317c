//! `hfvtx` is a library for finding secondary vertices of charged-particle tracks and for
//! selecting heavy-flavour decay candidates built from them. Tracks are helices in a magnetic
//! field along the beam, described at a reference plane by five parameters and their covariance;
//! pairs of tracks are fitted for their point of closest approach, and the resulting vertices are
//! turned into decay candidates.
//!
//! <div class="warning">
//!
//! This crate is still in an early development phase, and the API is not stable.
//!
//! </div>
//!
//! # Table of Contents
//! - [Key Features](#key-features)
//! - [Quick Start](#quick-start)
//!   - [Fitting a Pair of Tracks](#fitting-a-pair-of-tracks)
//!   - [Running the Vertexer over Events](#running-the-vertexer-over-events)
//! - [Conventions](#conventions)
//! - [Configuration and Logging](#configuration-and-logging)
//!
//! # Key Features
//! * A [`TrackState`] with exact helix transport and frame rotation, including the propagation
//!   of its covariance.
//! * A two-track [`DcaFitter`] with analytic seeding from the transverse projections and a choice
//!   of plain or covariance-weighted distance.
//! * A [`Vertexer`] running the fitter over every track pair of every event, in parallel with
//!   [`rayon`](https://github.com/rayon-rs/rayon) when the `rayon` feature is enabled (the
//!   default).
//! * A pure [`XiPiSelector`] for charm baryons decaying to $`\Xi\pi`$, with n-sigma particle
//!   identification.
//! * Quality-assurance histograms through an injected [`QaSink`].
//!
//! # Quick Start
//! ### Fitting a Pair of Tracks
//! Two tracks which pass through the same point can be built directly from that point, their
//! direction, dip angle, and signed inverse transverse momentum:
//! ```rust
//! use hfvtx::{DcaFitter, FitterConfig, Propagator, TrackState, Vector3};
//!
//! let vertex = Vector3::new(0.5, 0.3, 0.2);
//! let cov = [0.0; 15];
//! let a = TrackState::at_point(&vertex, 0.3, 0.1, 0.5, cov).unwrap();
//! let b = TrackState::at_point(&vertex, 0.8, -0.2, -0.5, cov).unwrap();
//!
//! let fitter = DcaFitter::new(
//!     FitterConfig::new(5.0, 10.0).with_abs_dca(true),
//!     Propagator::uniform(5.0),
//! )
//! .unwrap();
//! let candidates = fitter.find_closest_approach(&a, &b);
//! assert_eq!(candidates.len(), 1);
//! assert!((candidates[0].position - vertex).norm() < 1e-3);
//! ```
//!
//! ### Running the Vertexer over Events
//! ```rust
//! use hfvtx::{test_event, HistogramRegistry, Vertexer, VertexerConfig};
//!
//! let vertexer = Vertexer::new(VertexerConfig::default()).unwrap();
//! let registry = HistogramRegistry::new();
//! vertexer.register_histograms(&registry).unwrap();
//!
//! let output = vertexer.process_events(&[test_event()], &registry);
//! let vertices = output.vertices.into_rows();
//! assert_eq!(vertices.len(), 1);
//! assert_eq!((vertices[0].index0, vertices[0].index1), (0, 1));
//! assert_eq!(registry.entries("hvtx_x"), 1);
//! ```
//!
//! # Conventions
//! Positions are in cm, momenta and masses in GeV, and the field in kG. A track is expressed in a
//! frame rotated by `alpha` about the beam axis, at local coordinate `x`, with parameters
//! $`(y, z, \sin\phi, \tan\lambda, q/p_T)`$. The covariance of the parameters is stored as the 15
//! entries of its lower triangle (see [`track::cov_index`]).
//!
//! # Configuration and Logging
//! [`FitterConfig`], [`VertexerConfig`], and [`SelectorConfig`] can be read from JSON with
//! [`Configuration::from_path`], which also validates them. The library logs through
//! [`tracing`](https://docs.rs/tracing); install a subscriber to see per-event summaries
//! (`debug`) or abandoned fits (`trace`). The `vertex_scan` binary does this with `RUST_LOG`:
//! ```shell
//! RUST_LOG=hfvtx_candidates=debug cargo run --release --bin vertex_scan -- config.json
//! ```
#![warn(clippy::perf, clippy::style, missing_docs)]

/// Per-event track tables, output records, and the append-only record collector.
pub mod data {
    pub use hfvtx_core::data::*;
}
/// Track states and their parameterization.
pub mod track {
    pub use hfvtx_core::track::*;
}
/// Frame rotations and transport of tracks.
pub mod propagator {
    pub use hfvtx_core::propagator::*;
}
/// Vertex candidates and the records built from them.
pub mod candidates {
    pub use hfvtx_candidates::*;
}
/// Particle identification and candidate selection.
pub mod selection {
    pub use hfvtx_selection::*;
}
/// Utility functions, enums, and traits
pub mod utils {
    pub use hfvtx_core::utils::*;
}
/// Reproducible synthetic events with displaced two-prong decays.
pub mod synthetic;

pub use hfvtx_candidates::{
    build_two_prong, AssembledCandidate, CandidateAssembler, EventVertices, TrackQa,
    TwoBodyHypothesis, TwoProngBuilder, Vertexer, VertexerConfig, VertexerOutput,
};
pub use hfvtx_core::{
    test_event, Cand2ProngRecord, Configuration, DcaFitter, DcaMetric, Event, ExecutionContext,
    FitterConfig, HfvtxError, HfvtxResult, HistogramRegistry, MagneticField, NoopSink,
    Propagator, QaSink, RecordCollector, SecondaryVertexRecord, Sign, Table, ThreadPolicy,
    TrackRecord, TrackState, TrackTable, UniformField, Vec3, Vec4, Vector3, VertexCandidate,
};
pub use hfvtx_selection::{
    fill_selection_qa, PidMode, PidStatus, PidTrack, SelectorConfig, XiPiCandidate,
    XiPiSelection, XiPiSelector,
};
pub use serde::{Deserialize, Serialize};
pub use synthetic::{SyntheticConfig, SyntheticEvents};
