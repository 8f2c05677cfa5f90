//! Graph data model for the layout engine
//!
//! These types are owned by the `LayoutEngine`; the host only ever sends
//! copies of new values over the wire. Wire-facing types use camelCase field
//! names to match the host protocol.

use serde::{Deserialize, Serialize};

/// A node in the live graph.
///
/// Identity is the positional index into the engine's node list, assigned by
/// insertion order. It is stable across radius/link/parameter updates and is
/// reassigned only when the node *count* changes.
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable index (0..N-1), assigned by insertion order
    pub index: usize,

    /// Radius used by the host renderer; carried here so radius-only updates
    /// can mutate in place without touching layout state
    pub radius: f64,

    /// Position; `NAN` until the node has been seeded at run start
    pub x: f64,
    pub y: f64,

    /// Velocity accumulated by the force passes
    pub vx: f64,
    pub vy: f64,

    /// Pinned position set by a drag interaction; when present the
    /// integrator must not move this node
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

impl Node {
    /// Create a fresh node with unset position and no pin
    pub fn new(index: usize, radius: f64) -> Self {
        Self {
            index,
            radius,
            x: f64::NAN,
            y: f64::NAN,
            vx: 0.0,
            vy: 0.0,
            fx: None,
            fy: None,
        }
    }

    /// Whether this node has been assigned a concrete position yet
    pub fn is_placed(&self) -> bool {
        !self.x.is_nan() && !self.y.is_nan()
    }

    /// Whether a drag interaction has pinned this node
    pub fn is_pinned(&self) -> bool {
        self.fx.is_some() && self.fy.is_some()
    }
}

/// A link as it arrives from the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Source node index
    pub source: usize,

    /// Target node index
    pub target: usize,

    /// Rest length of the spring
    pub distance: f64,
}

/// A link owned by the engine, with its derived spring strength
#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub source: usize,
    pub target: usize,

    /// Rest length of the spring
    pub distance: f64,

    /// `link_strength_multiplier * distance`, recomputed whenever parameters
    /// change or links are replaced
    pub strength: f64,
}

impl Link {
    /// Build an engine-owned link from a wire spec and the current multiplier
    pub fn from_spec(spec: &LinkSpec, strength_multiplier: f64) -> Self {
        Self {
            source: spec.source,
            target: spec.target,
            distance: spec.distance,
            strength: strength_multiplier * spec.distance,
        }
    }
}

/// A 2D position reported back to the host, index-aligned with the node list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Physical parameters of the force model
///
/// Replaced atomically as a snapshot on every parameter update; never
/// altered piecemeal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForceParameters {
    /// Base repulsion magnitude before node-count normalization
    pub repulsion_strength: f64,

    /// How repulsion scales down with node count: the effective strength is
    /// `-repulsion_strength / node_count.powf(repulsion_normalization_exponent)`
    pub repulsion_normalization_exponent: f64,

    /// Cutoff distance beyond which repulsion is not computed
    pub repulsion_distance_limit: f64,

    /// Scales each link's spring strength by its rest distance
    pub link_strength_multiplier: f64,

    /// Pull toward the origin, preventing unbounded drift
    pub center_strength: f64,
}

impl Default for ForceParameters {
    fn default() -> Self {
        Self {
            repulsion_strength: 30.0,
            repulsion_normalization_exponent: 1.0,
            repulsion_distance_limit: 500.0,
            link_strength_multiplier: 1.0,
            center_strength: 0.1,
        }
    }
}
