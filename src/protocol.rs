//! Host ↔ engine message protocol
//!
//! One `LayoutRequest` envelope per host message, carrying an ordered set of
//! optional updates; the engine applies them nodes → links → parameters →
//! drag and then attempts a run at the envelope's alpha. The engine answers
//! with one `StepEvent` per simulation step.
//!
//! Channel-level framing is the host's concern; this module only defines the
//! message shapes and JSON encode/decode helpers.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::graph::{ForceParameters, LinkSpec, Position};

/// Errors from envelope encoding/decoding
///
/// This is the crate's only error surface: engine operations themselves are
/// defensive no-ops on bad input rather than failures.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The incoming envelope was not valid JSON for the expected shape
    #[error("malformed envelope: {0}")]
    Decode(serde_json::Error),

    /// An outgoing message could not be serialized
    #[error("unencodable message: {0}")]
    Encode(serde_json::Error),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Decode a JSON message into a protocol type
pub fn decode<T: DeserializeOwned>(json: &str) -> ProtocolResult<T> {
    serde_json::from_str(json).map_err(ProtocolError::Decode)
}

/// Encode a protocol type as a JSON message
pub fn encode<T: Serialize>(message: &T) -> ProtocolResult<String> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

/// A drag interaction pinning one node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragSpec {
    /// Index of the node being dragged
    pub idx: usize,
    pub x: f64,
    pub y: f64,
}

/// Host → engine envelope
///
/// Every flag defaults to false and every payload is optional; a flag set
/// without its payload is ignored by the engine. `alpha` is the energy a
/// triggered run starts at and defaults to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutRequest {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub update_nodes: bool,

    /// Radii, one per node, in index order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub update_links: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<LinkSpec>>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub update_props: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<ForceParameters>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub update_drag: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<DragSpec>,

    /// Energy to run at when a run is triggered
    pub alpha: f64,
}

impl Default for LayoutRequest {
    fn default() -> Self {
        Self {
            update_nodes: false,
            nodes: None,
            update_links: false,
            links: None,
            update_props: false,
            props: None,
            update_drag: false,
            node: None,
            alpha: 1.0,
        }
    }
}

impl LayoutRequest {
    /// Envelope replacing the node radii
    pub fn with_nodes(radii: Vec<f64>) -> Self {
        Self {
            update_nodes: true,
            nodes: Some(radii),
            ..Self::default()
        }
    }

    /// Envelope replacing the link list
    pub fn with_links(links: Vec<LinkSpec>) -> Self {
        Self {
            update_links: true,
            links: Some(links),
            ..Self::default()
        }
    }

    /// Envelope replacing the force parameter snapshot
    pub fn with_props(props: ForceParameters) -> Self {
        Self {
            update_props: true,
            props: Some(props),
            ..Self::default()
        }
    }

    /// Envelope pinning one node at a position
    pub fn with_drag(idx: usize, x: f64, y: f64) -> Self {
        Self {
            update_drag: true,
            node: Some(DragSpec { idx, x, y }),
            ..Self::default()
        }
    }

    /// Set the energy a triggered run starts at
    pub fn at_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

/// Engine → host message, one per simulation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Fraction of the advertised iteration budget consumed, in [0, 1];
    /// reported as 0 for the first two steps of a run
    pub progress: f64,

    /// Index-aligned positions for the current node list
    pub positions: Vec<Position>,
}
