#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use evorun_attrs::range::{scope_from_specs, AttrsScope};
use evorun_core::attributes::{Attributes, SetOfAttributes};
use evorun_core::rng::Prg;
use evorun_core::value::Value;
use evorun_sim::plugin::{Edge, Graph, GraphPlugin, Model, ModelPlugin, PluginRegistry};
use evorun_sim::scheduler::{ExperimentsMgr, SchedulerConfig, SchedulerEvent};
use evorun_sim::{Experiment, ExperimentSetup};

/// Ring topology over the trial population; takes no parameters.
pub struct RingGraphPlugin {
    scope: AttrsScope,
}

impl RingGraphPlugin {
    pub fn new() -> Self {
        Self {
            scope: AttrsScope::new(),
        }
    }
}

impl GraphPlugin for RingGraphPlugin {
    fn id(&self) -> &str {
        "ring"
    }

    fn attrs_scope(&self) -> &AttrsScope {
        &self.scope
    }

    fn create(&self) -> Box<dyn Graph> {
        Box::new(RingGraph { edges: Vec::new() })
    }
}

struct RingGraph {
    edges: Vec<Edge>,
}

impl Graph for RingGraph {
    fn init(&mut self, n_nodes: usize, _params: &Attributes, _prg: &mut Prg) -> bool {
        if n_nodes == 0 {
            return false;
        }
        self.edges = (0..n_nodes)
            .map(|i| Edge {
                from: i,
                to: (i + 1) % n_nodes,
            })
            .collect();
        true
    }

    fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Random-walk model: each step nudges one node's energy by ±1.
pub struct DriftModelPlugin {
    node_scope: AttrsScope,
    model_scope: AttrsScope,
    step_delay: Duration,
}

impl DriftModelPlugin {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Variant whose steps take a fixed wall-clock time, for tests that
    /// need a run to outlive a few progress ticks.
    pub fn with_delay(step_delay: Duration) -> Self {
        Self {
            node_scope: scope_from_specs(&[("energy", "int[0,100]")]).unwrap(),
            model_scope: scope_from_specs(&[("noise", "double[0,1]")]).unwrap(),
            step_delay,
        }
    }
}

impl ModelPlugin for DriftModelPlugin {
    fn id(&self) -> &str {
        "drift"
    }

    fn node_attrs_scope(&self) -> &AttrsScope {
        &self.node_scope
    }

    fn model_attrs_scope(&self) -> &AttrsScope {
        &self.model_scope
    }

    fn create(&self) -> Box<dyn Model> {
        Box::new(DriftModel {
            nodes: Vec::new(),
            edges: Vec::new(),
            noise: 0.0,
            step_delay: self.step_delay,
        })
    }
}

struct DriftModel {
    nodes: SetOfAttributes,
    edges: Vec<Edge>,
    noise: f64,
    step_delay: Duration,
}

impl Model for DriftModel {
    fn init(
        &mut self,
        nodes: SetOfAttributes,
        edges: Vec<Edge>,
        params: &Attributes,
        _prg: &mut Prg,
    ) -> bool {
        self.noise = params.value_by_name("noise").unwrap().as_double().unwrap();
        self.nodes = nodes;
        self.edges = edges;
        !self.nodes.is_empty()
    }

    fn algorithm_step(&mut self, prg: &mut Prg) -> bool {
        if !self.step_delay.is_zero() {
            thread::sleep(self.step_delay);
        }
        let idx = prg.rand_index(self.nodes.len());
        let energy = self.nodes[idx].value(0).unwrap().as_int().unwrap();
        let delta = if prg.bernoulli_p(self.noise) { 1 } else { -1 };
        let next = (energy + delta).clamp(0, 100);
        self.nodes[idx].set_value(0, Value::Int(next)).unwrap();
        true
    }

    fn nodes(&self) -> &SetOfAttributes {
        &self.nodes
    }
}

/// Model whose single step blocks until the shared gate opens, then
/// reports completion. Lets tests hold experiments in `Running`.
pub struct GateModelPlugin {
    gate: Arc<AtomicBool>,
    scope: AttrsScope,
}

impl GateModelPlugin {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let gate = Arc::new(AtomicBool::new(false));
        (
            Self {
                gate: Arc::clone(&gate),
                scope: AttrsScope::new(),
            },
            gate,
        )
    }
}

impl ModelPlugin for GateModelPlugin {
    fn id(&self) -> &str {
        "gate"
    }

    fn node_attrs_scope(&self) -> &AttrsScope {
        &self.scope
    }

    fn model_attrs_scope(&self) -> &AttrsScope {
        &self.scope
    }

    fn create(&self) -> Box<dyn Model> {
        Box::new(GateModel {
            gate: Arc::clone(&self.gate),
            nodes: Vec::new(),
        })
    }
}

struct GateModel {
    gate: Arc<AtomicBool>,
    nodes: SetOfAttributes,
}

impl Model for GateModel {
    fn init(
        &mut self,
        nodes: SetOfAttributes,
        _edges: Vec<Edge>,
        _params: &Attributes,
        _prg: &mut Prg,
    ) -> bool {
        self.nodes = nodes;
        true
    }

    fn algorithm_step(&mut self, _prg: &mut Prg) -> bool {
        while !self.gate.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn nodes(&self) -> &SetOfAttributes {
        &self.nodes
    }
}

/// Model that refuses to initialize; drives the Invalid path.
pub struct FailingModelPlugin {
    scope: AttrsScope,
}

impl FailingModelPlugin {
    pub fn new() -> Self {
        Self {
            scope: AttrsScope::new(),
        }
    }
}

impl ModelPlugin for FailingModelPlugin {
    fn id(&self) -> &str {
        "failing"
    }

    fn node_attrs_scope(&self) -> &AttrsScope {
        &self.scope
    }

    fn model_attrs_scope(&self) -> &AttrsScope {
        &self.scope
    }

    fn create(&self) -> Box<dyn Model> {
        Box::new(FailingModel { nodes: Vec::new() })
    }
}

struct FailingModel {
    nodes: SetOfAttributes,
}

impl Model for FailingModel {
    fn init(
        &mut self,
        _nodes: SetOfAttributes,
        _edges: Vec<Edge>,
        _params: &Attributes,
        _prg: &mut Prg,
    ) -> bool {
        false
    }

    fn algorithm_step(&mut self, _prg: &mut Prg) -> bool {
        false
    }

    fn nodes(&self) -> &SetOfAttributes {
        &self.nodes
    }
}

/// Registry with the drift model and the ring graph.
pub fn drift_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register_model(Arc::new(DriftModelPlugin::new())).unwrap();
    registry.register_graph(Arc::new(RingGraphPlugin::new())).unwrap();
    registry
}

/// Registry with the gate model and the ring graph, plus the gate handle.
pub fn gate_registry() -> (PluginRegistry, Arc<AtomicBool>) {
    let mut registry = PluginRegistry::new();
    let (plugin, gate) = GateModelPlugin::new();
    registry.register_model(Arc::new(plugin)).unwrap();
    registry.register_graph(Arc::new(RingGraphPlugin::new())).unwrap();
    (registry, gate)
}

/// A drift setup over `n` nodes.
pub fn drift_setup(seed: u64, trials: u16, stop_at: u64) -> ExperimentSetup {
    ExperimentSetup {
        model_id: "drift".into(),
        graph_id: "ring".into(),
        seed,
        trials,
        stop_at,
        auto_delete: false,
        nodes: "*8;rand_99".into(),
        model_params: [("noise".to_string(), "0.5".to_string())].into(),
        graph_params: Default::default(),
    }
}

/// A single-step gate setup.
pub fn gate_setup(seed: u64) -> ExperimentSetup {
    ExperimentSetup {
        model_id: "gate".into(),
        graph_id: "ring".into(),
        seed,
        trials: 1,
        stop_at: 10,
        auto_delete: false,
        nodes: "*2;min".into(),
        model_params: Default::default(),
        graph_params: Default::default(),
    }
}

/// A scheduler with a small deterministic configuration.
pub fn manager(capacity: usize) -> (ExperimentsMgr, std::sync::mpsc::Receiver<SchedulerEvent>) {
    ExperimentsMgr::new(SchedulerConfig {
        capacity,
        threads: 4,
        progress_interval_ms: 20,
    })
    .unwrap()
}

/// Builds and registers one experiment, returning its id.
pub fn add_experiment(
    mgr: &ExperimentsMgr,
    registry: &PluginRegistry,
    setup: ExperimentSetup,
) -> evorun_sim::ExpId {
    mgr.add(Experiment::new(setup, registry).unwrap())
}
