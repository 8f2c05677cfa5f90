//! Layout engine: the live graph and its force simulation
//!
//! The engine owns node positions/radii, link topology, force parameters,
//! and the state of the running simulation. It is mutated only through the
//! command operations below, one command at a time, and never shared across
//! threads; see `worker` for the execution context.
//!
//! Change detection for nodes and links is count-based on purpose: a changed
//! count invalidates index-based identity and forces full recreation, while
//! an unchanged count mutates in place (nodes) or is ignored entirely
//! (links). Replacing link *content* without changing the link count
//! therefore takes no visible effect.

use tracing::{debug, warn};

use crate::graph::{ForceParameters, Link, LinkSpec, Node, Position};
use crate::protocol::{LayoutRequest, StepEvent};

/// Alpha threshold below which the simulation is considered converged
pub const ALPHA_MIN: f64 = 0.001;

/// Velocity damping applied on every integration step
const VELOCITY_DECAY: f64 = 0.6;

/// Radius of the circle on which unplaced nodes are seeded at run start
const SEED_RADIUS: f64 = 100.0;

/// Per-step geometric decay factor for alpha: `1 - alpha_min^(1/300)`, the
/// rate at which alpha crosses `ALPHA_MIN` after 300 steps from 1.0
fn default_alpha_decay() -> f64 {
    1.0 - ALPHA_MIN.powf(1.0 / 300.0)
}

/// State of one simulation run, created fresh by each `run` command
#[derive(Debug, Clone, Copy)]
struct RunState {
    /// Current energy; decays geometrically each step
    alpha: f64,

    /// Iteration budget advertised to progress listeners; never shrinks
    /// while a run is superseded mid-flight
    total_iterations: u32,

    /// Steps left before the budget is exhausted; decremented exactly once
    /// per emitted step
    remaining_iterations: u32,

    /// Steps emitted so far; progress is reported as 0 for the first two
    steps_emitted: u32,
}

/// The force-directed layout engine
pub struct LayoutEngine {
    nodes: Vec<Node>,
    links: Vec<Link>,
    params: ForceParameters,

    /// Effective repulsion passed to the force pass:
    /// `-repulsion_strength / node_count^exponent` (negative pushes apart)
    repulsion: f64,

    /// Link update that arrived before any nodes existed; applied on the
    /// next node update
    pending_links: Option<Vec<LinkSpec>>,

    nodes_ready: bool,
    links_ready: bool,

    run: Option<RunState>,
    alpha_min: f64,
    alpha_decay: f64,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            params: ForceParameters::default(),
            repulsion: 0.0,
            pending_links: None,
            nodes_ready: false,
            links_ready: false,
            run: None,
            alpha_min: ALPHA_MIN,
            alpha_decay: default_alpha_decay(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn parameters(&self) -> &ForceParameters {
        &self.params
    }

    /// The normalized repulsion strength currently fed to the force pass
    pub fn effective_repulsion(&self) -> f64 {
        self.repulsion
    }

    /// Whether a run is in flight (it ends on the `step` call that observes
    /// an exhausted budget or converged alpha)
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Iteration budget advertised for the current run
    pub fn total_iterations(&self) -> Option<u32> {
        self.run.map(|r| r.total_iterations)
    }

    pub fn remaining_iterations(&self) -> Option<u32> {
        self.run.map(|r| r.remaining_iterations)
    }

    /// Index-ordered positions for the current node list
    pub fn positions(&self) -> Vec<Position> {
        self.nodes.iter().map(|n| Position { x: n.x, y: n.y }).collect()
    }

    /// Replace or mutate the node list from a list of radii.
    ///
    /// A changed count (or the very first call) discards all nodes and
    /// recreates them with unset positions and no pins; an unchanged count
    /// updates each node's radius in place, leaving layout state untouched.
    /// Either way the repulsion normalization is recomputed, since it
    /// depends on node count.
    pub fn update_nodes(&mut self, radii: &[f64]) {
        if !self.nodes_ready || radii.len() != self.nodes.len() {
            debug!(count = radii.len(), "node count changed, rebuilding node list");
            self.nodes = radii
                .iter()
                .enumerate()
                .map(|(index, &radius)| Node::new(index, radius))
                .collect();
            self.nodes_ready = true;
        } else {
            for (node, &radius) in self.nodes.iter_mut().zip(radii) {
                node.radius = radius;
            }
        }
        self.recompute_repulsion();

        if let Some(pending) = self.pending_links.take() {
            self.update_links(pending);
        }
    }

    /// Replace the link list wholesale, but only when the count differs
    /// from the current one.
    ///
    /// Links arriving before any nodes exist are buffered and applied by the
    /// next node update. An update with an unchanged count is ignored, so a
    /// content-only change (same number of links, different pairs) takes no
    /// effect.
    pub fn update_links(&mut self, links: Vec<LinkSpec>) {
        if !self.nodes_ready {
            debug!(count = links.len(), "buffering links until nodes arrive");
            self.pending_links = Some(links);
            return;
        }
        if self.links_ready && links.len() == self.links.len() {
            debug!(count = links.len(), "link count unchanged, ignoring update");
            return;
        }
        self.links = links
            .iter()
            .map(|spec| Link::from_spec(spec, self.params.link_strength_multiplier))
            .collect();
        self.links_ready = true;
    }

    /// Replace the force parameter snapshot and propagate it: repulsion is
    /// renormalized by the current node count and every link's spring
    /// strength is rederived. Topology is never touched.
    pub fn update_parameters(&mut self, params: ForceParameters) {
        self.params = params;
        self.recompute_repulsion();
        for link in &mut self.links {
            link.strength = params.link_strength_multiplier * link.distance;
        }
    }

    /// Pin node `index` at `(x, y)`.
    ///
    /// Drag events can race a node-count change, so an out-of-range index is
    /// a logged no-op rather than a fault.
    pub fn drag_node(&mut self, index: usize, x: f64, y: f64) {
        let Some(node) = self.nodes.get_mut(index) else {
            warn!(index, "drag for out-of-range node index, ignoring");
            return;
        };
        node.fx = Some(x);
        node.fy = Some(y);
        node.x = x;
        node.y = y;
        node.vx = 0.0;
        node.vy = 0.0;
    }

    /// (Re)start the simulation at the given energy level.
    ///
    /// A no-op until both a node update and a link update have been applied.
    /// The iteration budget is the number of decay steps needed to cross
    /// `alpha_min` from this alpha, but never less than what a run still in
    /// flight had remaining: budgets already advertised to progress
    /// listeners only ever grow.
    pub fn run(&mut self, alpha: f64) {
        if !(self.nodes_ready && self.links_ready) {
            debug!("run requested before both nodes and links exist, ignoring");
            return;
        }
        let needed = self.iterations_needed(alpha);
        let in_flight = self.run.map_or(0, |r| r.remaining_iterations);
        let total = needed.max(in_flight);
        self.run = Some(RunState {
            alpha,
            total_iterations: total,
            remaining_iterations: total,
            steps_emitted: 0,
        });
        self.seed_positions();
        debug!(alpha, total, "run started");
    }

    /// Decay steps required to cross the stop threshold from `alpha`:
    /// `ceil(ln(alpha_min / alpha) / ln(1 - alpha_decay))`
    fn iterations_needed(&self, alpha: f64) -> u32 {
        if alpha <= 0.0 {
            return 0;
        }
        let steps = ((self.alpha_min / alpha).ln() / (1.0 - self.alpha_decay).ln()).ceil();
        if steps.is_finite() && steps > 0.0 { steps as u32 } else { 0 }
    }

    /// Advance the simulation by one step and report it, or end the run.
    ///
    /// Returns `None` when no run is active, or on the call that observes an
    /// exhausted iteration budget or a converged alpha (whichever comes
    /// first). Otherwise applies one integration pass, decays alpha, and
    /// emits progress plus the full position snapshot.
    pub fn step(&mut self) -> Option<StepEvent> {
        let run = self.run?;
        if run.remaining_iterations == 0 || run.alpha < self.alpha_min {
            debug!(total = run.total_iterations, "run finished");
            self.run = None;
            return None;
        }

        self.apply_repulsion(run.alpha);
        self.apply_link_springs(run.alpha);
        self.apply_centering(run.alpha);
        self.integrate();

        let next = RunState {
            alpha: run.alpha * (1.0 - self.alpha_decay),
            total_iterations: run.total_iterations,
            remaining_iterations: run.remaining_iterations - 1,
            steps_emitted: run.steps_emitted + 1,
        };
        self.run = Some(next);

        // The first two steps report 0 so listeners don't see a jump before
        // the layout has meaningfully moved.
        let progress = if next.steps_emitted <= 2 {
            0.0
        } else {
            (1.0 - f64::from(next.remaining_iterations) / f64::from(next.total_iterations))
                .clamp(0.0, 1.0)
        };

        Some(StepEvent {
            progress,
            positions: self.positions(),
        })
    }

    /// Apply one envelope: optional updates in fixed order, then a run
    /// attempt at the envelope's alpha.
    pub fn apply(&mut self, request: LayoutRequest) {
        if request.update_nodes {
            match &request.nodes {
                Some(radii) => self.update_nodes(radii),
                None => debug!("updateNodes flag without a node payload, ignoring"),
            }
        }
        if request.update_links {
            match request.links {
                Some(links) => self.update_links(links),
                None => debug!("updateLinks flag without a link payload, ignoring"),
            }
        }
        if request.update_props {
            match request.props {
                Some(props) => self.update_parameters(props),
                None => debug!("updateProps flag without a parameter payload, ignoring"),
            }
        }
        if request.update_drag {
            match request.node {
                Some(drag) => self.drag_node(drag.idx, drag.x, drag.y),
                None => debug!("updateDrag flag without a drag payload, ignoring"),
            }
        }
        self.run(request.alpha);
    }

    fn recompute_repulsion(&mut self) {
        let count = if self.nodes.is_empty() { 1.0 } else { self.nodes.len() as f64 };
        self.repulsion = -self.params.repulsion_strength
            / count.powf(self.params.repulsion_normalization_exponent);
    }

    /// Place any still-unset node on a deterministic circle so the first
    /// step has concrete coordinates to integrate from
    fn seed_positions(&mut self) {
        let total = self.nodes.len().max(1) as f64;
        for node in &mut self.nodes {
            if node.is_placed() {
                continue;
            }
            let angle = 2.0 * std::f64::consts::PI * (node.index as f64) / total;
            node.x = SEED_RADIUS * angle.cos();
            node.y = SEED_RADIUS * angle.sin();
        }
    }

    /// Pairwise repulsion with a distance cutoff; symmetric, so each
    /// unordered pair is visited once
    fn apply_repulsion(&mut self, alpha: f64) {
        let limit_sq = self.params.repulsion_distance_limit * self.params.repulsion_distance_limit;
        let n = self.nodes.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = self.nodes[j].x - self.nodes[i].x;
                let dy = self.nodes[j].y - self.nodes[i].y;
                let dist_sq = (dx * dx + dy * dy).max(1.0);
                if dist_sq > limit_sq {
                    continue;
                }

                // Negative repulsion pushes the pair apart
                let w = self.repulsion * alpha / dist_sq;
                let fx = dx * w;
                let fy = dy * w;

                self.nodes[i].vx += fx;
                self.nodes[i].vy += fy;
                self.nodes[j].vx -= fx;
                self.nodes[j].vy -= fy;
            }
        }
    }

    /// Hooke's-law spring toward each link's rest distance
    fn apply_link_springs(&mut self, alpha: f64) {
        let n = self.nodes.len();
        for link in &self.links {
            // Stale links can outlive a node-count shrink until the host
            // sends the matching link update
            if link.source >= n || link.target >= n {
                continue;
            }

            let dx = self.nodes[link.target].x - self.nodes[link.source].x;
            let dy = self.nodes[link.target].y - self.nodes[link.source].y;
            let dist = (dx * dx + dy * dy).sqrt().max(1.0);

            let stretch = dist - link.distance;
            let force = link.strength * stretch / dist * alpha;
            let fx = force * dx / dist;
            let fy = force * dy / dist;

            self.nodes[link.source].vx += fx;
            self.nodes[link.source].vy += fy;
            self.nodes[link.target].vx -= fx;
            self.nodes[link.target].vy -= fy;
        }
    }

    /// Pull toward the origin, preventing unbounded drift
    fn apply_centering(&mut self, alpha: f64) {
        let strength = self.params.center_strength;
        for node in &mut self.nodes {
            node.vx -= node.x * strength * alpha;
            node.vy -= node.y * strength * alpha;
        }
    }

    /// Damp velocities and move every unpinned node; pinned nodes are
    /// snapped to their pin with velocity zeroed
    fn integrate(&mut self) {
        for node in &mut self.nodes {
            if let (Some(fx), Some(fy)) = (node.fx, node.fy) {
                node.x = fx;
                node.y = fy;
                node.vx = 0.0;
                node.vy = 0.0;
            } else {
                node.vx *= VELOCITY_DECAY;
                node.vy *= VELOCITY_DECAY;
                node.x += node.vx;
                node.y += node.vy;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_graph(radii: &[f64], links: Vec<LinkSpec>) -> LayoutEngine {
        let mut engine = LayoutEngine::new();
        engine.update_nodes(radii);
        engine.update_links(links);
        engine
    }

    fn line_links(count: usize, distance: f64) -> Vec<LinkSpec> {
        (0..count)
            .map(|i| LinkSpec {
                source: i,
                target: i + 1,
                distance,
            })
            .collect()
    }

    #[test]
    fn same_count_node_update_preserves_layout_state() {
        let mut engine = engine_with_graph(&[5.0, 5.0, 5.0], line_links(2, 30.0));
        engine.run(1.0);
        engine.step();
        engine.drag_node(1, 10.0, -4.0);

        let before: Vec<_> = engine.nodes().iter().map(|n| (n.x, n.y, n.fx, n.fy)).collect();
        engine.update_nodes(&[7.0, 8.0, 9.0]);
        let after: Vec<_> = engine.nodes().iter().map(|n| (n.x, n.y, n.fx, n.fy)).collect();

        assert_eq!(before, after);
        assert_eq!(engine.nodes()[2].radius, 9.0);
    }

    #[test]
    fn changed_count_resets_positions_to_unset_and_clears_pins() {
        let mut engine = engine_with_graph(&[5.0, 5.0, 5.0], line_links(2, 30.0));
        engine.run(1.0);
        engine.step();
        engine.drag_node(0, 1.0, 2.0);

        engine.update_nodes(&[5.0, 5.0]);

        assert_eq!(engine.nodes().len(), 2);
        for node in engine.nodes() {
            assert!(node.x.is_nan(), "position should be unset, not zero");
            assert!(node.y.is_nan());
            assert!(!node.is_pinned());
        }
    }

    #[test]
    fn default_decay_needs_300_iterations_from_alpha_one() {
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 30.0));
        engine.run(1.0);

        let total = engine.total_iterations().unwrap();
        assert!((299..=301).contains(&total), "got {total}");
    }

    #[test]
    fn second_run_never_shrinks_the_advertised_budget() {
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 30.0));
        engine.run(1.0);
        let first_total = engine.total_iterations().unwrap();

        for _ in 0..10 {
            engine.step();
        }
        // Restarting at a lower energy alone would need far fewer steps
        engine.run(0.01);

        let second_total = engine.total_iterations().unwrap();
        assert!(second_total >= first_total - 10);
        assert_eq!(engine.remaining_iterations().unwrap(), second_total);
    }

    #[test]
    fn hotter_second_run_grows_the_budget() {
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 30.0));
        engine.run(0.01);
        let small_total = engine.total_iterations().unwrap();

        engine.run(1.0);
        assert!(engine.total_iterations().unwrap() > small_total);
    }

    #[test]
    fn run_without_nodes_or_links_is_a_no_op() {
        let mut engine = LayoutEngine::new();
        engine.run(1.0);
        assert!(!engine.is_running());

        engine.update_nodes(&[5.0, 5.0]);
        engine.run(1.0);
        assert!(!engine.is_running(), "links have not arrived yet");

        engine.update_links(line_links(1, 30.0));
        engine.run(1.0);
        assert!(engine.is_running());
    }

    #[test]
    fn links_before_nodes_are_buffered_until_nodes_arrive() {
        let mut engine = LayoutEngine::new();
        engine.update_links(line_links(1, 30.0));
        assert!(engine.links().is_empty());

        engine.update_nodes(&[5.0, 5.0]);
        assert_eq!(engine.links().len(), 1);

        engine.run(1.0);
        assert!(engine.is_running());
    }

    #[test]
    fn equal_count_link_update_is_ignored() {
        let mut engine = engine_with_graph(&[5.0, 5.0, 5.0], line_links(2, 30.0));

        let replacement = vec![
            LinkSpec { source: 0, target: 2, distance: 99.0 },
            LinkSpec { source: 1, target: 2, distance: 99.0 },
        ];
        engine.update_links(replacement);

        assert_eq!(engine.links()[0].target, 1);
        assert_eq!(engine.links()[0].distance, 30.0);
    }

    #[test]
    fn changed_count_link_update_replaces_wholesale() {
        let mut engine = engine_with_graph(&[5.0, 5.0, 5.0], line_links(2, 30.0));

        engine.update_links(vec![LinkSpec { source: 0, target: 2, distance: 80.0 }]);

        assert_eq!(engine.links().len(), 1);
        assert_eq!(engine.links()[0].distance, 80.0);
    }

    #[test]
    fn repulsion_is_normalized_by_node_count() {
        let mut engine = engine_with_graph(&[5.0; 4], line_links(3, 30.0));
        engine.update_parameters(ForceParameters {
            repulsion_strength: 100.0,
            repulsion_normalization_exponent: 1.0,
            ..ForceParameters::default()
        });

        assert_eq!(engine.effective_repulsion(), -25.0);
    }

    #[test]
    fn parameter_update_rescales_link_strengths() {
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 40.0));
        engine.update_parameters(ForceParameters {
            link_strength_multiplier: 0.5,
            ..ForceParameters::default()
        });

        assert_eq!(engine.links()[0].strength, 20.0);
    }

    #[test]
    fn drag_out_of_range_is_a_no_op() {
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 30.0));
        engine.drag_node(7, 1.0, 1.0);

        assert!(engine.nodes().iter().all(|n| !n.is_pinned()));
    }

    #[test]
    fn dragged_node_stays_pinned_while_others_move() {
        let mut engine = engine_with_graph(&[5.0; 3], line_links(2, 30.0));
        engine.run(1.0);
        engine.step();
        engine.drag_node(1, 42.0, -17.0);

        for _ in 0..20 {
            engine.step();
        }

        let pinned = &engine.nodes()[1];
        assert_eq!(pinned.x, 42.0);
        assert_eq!(pinned.y, -17.0);

        // Unpinned neighbors keep integrating
        let free = &engine.nodes()[0];
        assert!(free.x.is_finite() && free.y.is_finite());
        assert!(!free.is_pinned());
    }

    #[test]
    fn progress_is_zero_early_then_non_decreasing_to_one() {
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 30.0));
        engine.run(1.0);

        let mut last = 0.0;
        let mut steps = 0;
        while let Some(event) = engine.step() {
            if steps < 2 {
                assert_eq!(event.progress, 0.0);
            }
            assert!(event.progress >= last, "progress regressed at step {steps}");
            last = event.progress;
            steps += 1;
        }

        assert!(steps > 0);
        assert!((last - 1.0).abs() < 1e-9 || last > 0.99, "final progress {last}");
        assert!(!engine.is_running());
    }

    #[test]
    fn remaining_iterations_decrement_once_per_step() {
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 30.0));
        engine.run(1.0);
        let total = engine.total_iterations().unwrap();

        engine.step();
        engine.step();
        engine.step();

        assert_eq!(engine.remaining_iterations().unwrap(), total - 3);
    }

    #[test]
    fn step_without_a_run_returns_none() {
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 30.0));
        assert!(engine.step().is_none());
    }

    #[test]
    fn linked_nodes_pull_toward_rest_distance() {
        // Two nodes seed on opposite sides of the circle, 200 apart, with a
        // spring whose rest length is 30
        let mut engine = engine_with_graph(&[5.0, 5.0], line_links(1, 30.0));
        engine.run(1.0);

        while engine.step().is_some() {}

        let dx = engine.nodes()[1].x - engine.nodes()[0].x;
        let dy = engine.nodes()[1].y - engine.nodes()[0].y;
        let dist = (dx * dx + dy * dy).sqrt();
        assert!(dist < 200.0, "spring should pull the pair together, dist {dist}");
    }

    #[test]
    fn disconnected_nodes_keep_separation() {
        let mut engine = engine_with_graph(&[5.0, 5.0], Vec::new());
        engine.run(1.0);

        while engine.step().is_some() {}

        let dx = engine.nodes()[1].x - engine.nodes()[0].x;
        let dy = engine.nodes()[1].y - engine.nodes()[0].y;
        let dist = (dx * dx + dy * dy).sqrt();
        assert!(dist > 1.0, "repulsion should hold nodes apart, dist {dist}");
    }

    #[test]
    fn empty_graph_never_panics() {
        let mut engine = LayoutEngine::new();
        engine.update_nodes(&[]);
        engine.update_links(Vec::new());
        engine.update_parameters(ForceParameters::default());
        engine.drag_node(0, 0.0, 0.0);
        engine.run(1.0);
        while engine.step().is_some() {}
    }

    #[test]
    fn stale_links_after_node_shrink_are_skipped() {
        let mut engine = engine_with_graph(&[5.0; 4], line_links(3, 30.0));
        engine.run(1.0);
        engine.step();

        // Node count shrinks but the host has not resent links yet
        engine.update_nodes(&[5.0, 5.0]);
        engine.run(1.0);
        for _ in 0..5 {
            engine.step();
        }

        assert!(engine.nodes().iter().all(|n| n.x.is_finite()));
    }
}
