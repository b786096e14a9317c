//! # hfvtx-candidates
//!
//! Turns fitted secondary vertices into output records, and the per-event tasks which drive the
//! fitter over track tables.
#![warn(clippy::perf, clippy::style)]

/// Records from fitted vertices: two-prong, three-prong, and table-driven two-prong candidates.
pub mod assembler;
/// Track quality-assurance and table-driven candidate building tasks.
pub mod tasks;
/// The per-event pairwise vertexer.
pub mod vertexer;

pub use assembler::{
    build_two_prong, pair_kinematics, AssembledCandidate, CandidateAssembler, TwoBodyHypothesis,
};
pub use tasks::{TrackQa, TwoProngBuilder};
pub use vertexer::{EventVertices, Vertexer, VertexerConfig, VertexerOutput};
