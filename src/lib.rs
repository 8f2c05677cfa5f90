//! forcelayout — incremental force-directed graph layout engine.
//!
//! Computes 2D positions for a node-link graph under repulsion, spring, and
//! centering forces while the graph stays live: node counts, link sets, and
//! physical parameters may change mid-run without discarding accumulated
//! layout quality. The engine runs inside an isolated worker task, consumes
//! update/drag/run envelopes, and emits a progress + positions event on
//! every simulation step.

pub mod adjacency;
pub mod engine;
pub mod graph;
pub mod protocol;
pub mod worker;
