//! Capability contracts for model and graph plugins.
//!
//! The scheduler consumes plugins through these traits only: it needs
//! `init`, `algorithm_step` and the population accessors, nothing else.
//! Plugin instances are created per trial and owned exclusively by that
//! trial's execution context; the plugin objects themselves are shared
//! read-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use evorun_attrs::range::AttrsScope;
use evorun_core::attributes::{Attributes, SetOfAttributes};
use evorun_core::errors::{ErrorInfo, EvoError};
use evorun_core::rng::Prg;

/// A directed edge between two node indices of a trial population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Index of the source node.
    pub from: usize,
    /// Index of the destination node.
    pub to: usize,
}

/// One model instance driving one trial.
pub trait Model: Send {
    /// Prepares the model over its population and topology; returning
    /// false aborts the trial before the first step.
    fn init(
        &mut self,
        nodes: SetOfAttributes,
        edges: Vec<Edge>,
        params: &Attributes,
        prg: &mut Prg,
    ) -> bool;

    /// Performs one simulated step; returning false signals that the
    /// simulation should stop after this step.
    fn algorithm_step(&mut self, prg: &mut Prg) -> bool;

    /// The current node population.
    fn nodes(&self) -> &SetOfAttributes;
}

/// Factory and metadata for a model plugin.
pub trait ModelPlugin: Send + Sync {
    /// Stable plugin identifier.
    fn id(&self) -> &str;

    /// Domain of every node attribute this model drives.
    fn node_attrs_scope(&self) -> &AttrsScope;

    /// Domain of the model's own parameters.
    fn model_attrs_scope(&self) -> &AttrsScope;

    /// Creates a fresh model instance for one trial.
    fn create(&self) -> Box<dyn Model>;
}

/// One graph (topology) instance backing one trial.
pub trait Graph: Send {
    /// Builds the topology over `n_nodes` nodes; returning false aborts
    /// the trial.
    fn init(&mut self, n_nodes: usize, params: &Attributes, prg: &mut Prg) -> bool;

    /// The generated edges.
    fn edges(&self) -> &[Edge];
}

/// Factory and metadata for a graph plugin.
pub trait GraphPlugin: Send + Sync {
    /// Stable plugin identifier.
    fn id(&self) -> &str;

    /// Domain of the graph's own parameters.
    fn attrs_scope(&self) -> &AttrsScope;

    /// Creates a fresh graph instance for one trial.
    fn create(&self) -> Box<dyn Graph>;
}

/// Explicitly constructed plugin registry, passed to whatever owns the
/// experiment lifecycle. There is no process-wide plugin state.
#[derive(Default)]
pub struct PluginRegistry {
    models: BTreeMap<String, Arc<dyn ModelPlugin>>,
    graphs: BTreeMap<String, Arc<dyn GraphPlugin>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model plugin under its id.
    pub fn register_model(&mut self, plugin: Arc<dyn ModelPlugin>) -> Result<(), EvoError> {
        let id = plugin.id().to_string();
        if self.models.contains_key(&id) {
            return Err(duplicate("model", &id));
        }
        self.models.insert(id, plugin);
        Ok(())
    }

    /// Registers a graph plugin under its id.
    pub fn register_graph(&mut self, plugin: Arc<dyn GraphPlugin>) -> Result<(), EvoError> {
        let id = plugin.id().to_string();
        if self.graphs.contains_key(&id) {
            return Err(duplicate("graph", &id));
        }
        self.graphs.insert(id, plugin);
        Ok(())
    }

    /// Looks up a model plugin.
    pub fn model(&self, id: &str) -> Option<Arc<dyn ModelPlugin>> {
        self.models.get(id).cloned()
    }

    /// Looks up a graph plugin.
    pub fn graph(&self, id: &str) -> Option<Arc<dyn GraphPlugin>> {
        self.graphs.get(id).cloned()
    }

    /// Ids of the registered model plugins.
    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Ids of the registered graph plugins.
    pub fn graph_ids(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }
}

fn duplicate(kind: &str, id: &str) -> EvoError {
    EvoError::Validation(
        ErrorInfo::new("plugin.duplicate_id", "a plugin with this id is already registered")
            .with_context("kind", kind)
            .with_context("id", id),
    )
}
