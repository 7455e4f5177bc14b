#![doc = "Experiment lifecycle and trial scheduler for the evorun engine."]

pub mod experiment;
pub mod plugin;
pub mod scheduler;

pub use experiment::{Experiment, ExperimentSetup, Status};
pub use plugin::{Edge, Graph, GraphPlugin, Model, ModelPlugin, PluginRegistry};
pub use scheduler::{ExpId, ExperimentsMgr, SchedulerConfig, SchedulerEvent};
