//! Experiment configuration, validation and per-trial runtime state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;

use evorun_attrs::generator::AttrsGenerator;
use evorun_attrs::range::AttrsScope;
use evorun_core::attributes::{Attributes, SetOfAttributes};
use evorun_core::errors::{ErrorInfo, EvoError};
use evorun_core::rng::Prg;
use evorun_core::{MAX_STEPS, MAX_TRIALS};

use crate::plugin::{GraphPlugin, Model, ModelPlugin, PluginRegistry};

/// Lifecycle status of an experiment or of one of its trials.
///
/// Experiments move `Ready → Queued → Running → {Finished | Ready}`;
/// `Invalid` is reachable from any state on fatal misconfiguration. Trials
/// use the `Ready`/`Running`/`Finished` subset plus `Invalid` when their
/// plugin fails to initialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Something went wrong; the experiment cannot run.
    Invalid,
    /// Good for another step.
    Ready,
    /// Waiting for scheduler capacity.
    Queued,
    /// Executing in the trial pool.
    Running,
    /// Every trial ran to completion.
    Finished,
}

/// User-facing experiment configuration.
///
/// All fields are validated by [`Experiment::new`] before any trial may
/// run; a setup that fails validation never produces an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSetup {
    /// Model plugin identifier.
    pub model_id: String,
    /// Graph plugin identifier.
    pub graph_id: String,
    /// Root seed; trial t draws from `seed + t`.
    #[serde(default)]
    pub seed: u64,
    /// Number of independent trials.
    #[serde(default = "default_trials")]
    pub trials: u16,
    /// Step at which trials stop (clamped to [`MAX_STEPS`]).
    #[serde(default = "default_stop_at")]
    pub stop_at: u64,
    /// Drop per-trial runtimes once the experiment finishes.
    #[serde(default = "default_auto_delete")]
    pub auto_delete: bool,
    /// Population command, e.g. `*100;min` or `#2;a_max;b_value_5`.
    pub nodes: String,
    /// Model parameters, validated against the model's attribute scope.
    #[serde(default)]
    pub model_params: BTreeMap<String, String>,
    /// Graph parameters, validated against the graph's attribute scope.
    #[serde(default)]
    pub graph_params: BTreeMap<String, String>,
}

fn default_trials() -> u16 {
    1
}

fn default_stop_at() -> u64 {
    MAX_STEPS
}

fn default_auto_delete() -> bool {
    true
}

/// Shared status slot for one trial. The status is written only by the
/// trial's own execution context; the step counter is additionally read by
/// the progress ticker.
#[derive(Debug)]
pub(crate) struct TrialHandle {
    status: Mutex<Status>,
    step: AtomicU64,
}

impl TrialHandle {
    fn new() -> Self {
        Self {
            status: Mutex::new(Status::Ready),
            step: AtomicU64::new(0),
        }
    }

    pub(crate) fn status(&self) -> Status {
        *lock_or_recover(&self.status)
    }

    fn set_status(&self, status: Status) {
        *lock_or_recover(&self.status) = status;
    }

    pub(crate) fn step(&self) -> u64 {
        self.step.load(Ordering::Acquire)
    }

    fn advance(&self) {
        self.step.fetch_add(1, Ordering::AcqRel);
    }

    fn reset(&self) {
        self.set_status(Status::Ready);
        self.step.store(0, Ordering::Release);
    }
}

/// Owned runtime of one trial: its generator and its model instance.
///
/// Runtimes live inside the experiment while idle and are taken out by the
/// scheduler for the duration of a batch, so trial workers get exclusive
/// access without touching scheduler bookkeeping.
pub(crate) struct TrialRuntime {
    id: u16,
    prg: Prg,
    model: Option<Box<dyn Model>>,
}

impl TrialRuntime {
    fn new(id: u16, seed: u64) -> Self {
        Self {
            id,
            prg: Prg::new(seed),
            model: None,
        }
    }

    /// Runs this trial until its experiment's soft step bound, the stop
    /// step, or the model signalling completion.
    pub(crate) fn run(&mut self, exp: &Experiment) {
        let handle = &exp.trials[usize::from(self.id)];
        if matches!(handle.status(), Status::Finished | Status::Invalid) {
            return;
        }

        if self.model.is_none() {
            match Self::init(exp, &mut self.prg) {
                Some(model) => self.model = Some(model),
                None => {
                    handle.set_status(Status::Invalid);
                    return;
                }
            }
        }
        let Some(model) = self.model.as_mut() else {
            return;
        };

        handle.set_status(Status::Running);
        let mut has_next = true;
        while has_next && handle.step() < exp.pause_at() {
            has_next = model.algorithm_step(&mut self.prg);
            handle.advance();
        }

        if !has_next || handle.step() >= exp.stop_at() {
            handle.set_status(Status::Finished);
        } else {
            handle.set_status(Status::Ready);
        }
    }

    fn init(exp: &Experiment, prg: &mut Prg) -> Option<Box<dyn Model>> {
        let mut graph = exp.graph.create();
        if !graph.init(exp.population.len(), &exp.graph_attrs, prg) {
            warn!(graph = exp.graph.id(), "the graph could not be initialized");
            return None;
        }
        let edges = graph.edges().to_vec();

        let mut model = exp.model.create();
        if !model.init(exp.population.clone(), edges, &exp.model_attrs, prg) {
            warn!(model = exp.model.id(), "the model could not be initialized");
            return None;
        }
        Some(model)
    }
}

/// A configured simulation submitted for execution.
///
/// The experiment owns its validated inputs, the generated node
/// population, and one status/step slot per trial. The aggregate status is
/// process-wide mutable state with a single-writer invariant: only the
/// scheduler transitions it.
pub struct Experiment {
    setup: ExperimentSetup,
    model: Arc<dyn ModelPlugin>,
    graph: Arc<dyn GraphPlugin>,
    model_attrs: Attributes,
    graph_attrs: Attributes,
    population: SetOfAttributes,
    nodes_command: String,

    status: Mutex<Status>,
    stop_at: AtomicU64,
    pause_at: AtomicU64,
    progress: AtomicU64, // f64 bits

    trials: Vec<TrialHandle>,
    runtimes: Mutex<Vec<TrialRuntime>>,
    runtimes_built: AtomicBool,
}

impl Experiment {
    /// Validates a setup against the registry and generates its population.
    ///
    /// This is the fail-fast gate: parse and validation errors surface
    /// here, before any trial runs.
    pub fn new(setup: ExperimentSetup, registry: &PluginRegistry) -> Result<Self, EvoError> {
        let model = registry.model(&setup.model_id).ok_or_else(|| {
            EvoError::Lookup(
                ErrorInfo::new("exp.unknown_model", "no model plugin with the given id")
                    .with_context("id", &setup.model_id),
            )
        })?;
        let graph = registry.graph(&setup.graph_id).ok_or_else(|| {
            EvoError::Lookup(
                ErrorInfo::new("exp.unknown_graph", "no graph plugin with the given id")
                    .with_context("id", &setup.graph_id),
            )
        })?;

        if setup.trials < 1 || setup.trials > MAX_TRIALS {
            return Err(EvoError::Validation(
                ErrorInfo::new("exp.bad_trials", "invalid number of trials")
                    .with_context("trials", setup.trials.to_string())
                    .with_context("max", MAX_TRIALS.to_string()),
            ));
        }

        let model_attrs = validate_params(model.model_attrs_scope(), &setup.model_params, "model")?;
        let graph_attrs = validate_params(graph.attrs_scope(), &setup.graph_params, "graph")?;

        let generator = AttrsGenerator::parse(model.node_attrs_scope(), &setup.nodes)?;
        let population = generator.create();
        let nodes_command = generator.command().to_string();

        let stop_at = setup.stop_at.min(MAX_STEPS);
        let trials = (0..setup.trials).map(|_| TrialHandle::new()).collect();

        Ok(Self {
            setup,
            model,
            graph,
            model_attrs,
            graph_attrs,
            population,
            nodes_command,
            status: Mutex::new(Status::Ready),
            stop_at: AtomicU64::new(stop_at),
            pause_at: AtomicU64::new(stop_at),
            progress: AtomicU64::new(0f64.to_bits()),
            trials,
            runtimes: Mutex::new(Vec::new()),
            runtimes_built: AtomicBool::new(false),
        })
    }

    /// The validated setup this experiment was created from.
    pub fn setup(&self) -> &ExperimentSetup {
        &self.setup
    }

    /// The normalized population command.
    pub fn nodes_command(&self) -> &str {
        &self.nodes_command
    }

    /// The generated initial population (shared read-only; every trial
    /// works on its own clone).
    pub fn population(&self) -> &SetOfAttributes {
        &self.population
    }

    /// Current aggregate status.
    pub fn status(&self) -> Status {
        *lock_or_recover(&self.status)
    }

    pub(crate) fn set_status(&self, status: Status) {
        *lock_or_recover(&self.status) = status;
    }

    /// Number of trials.
    pub fn num_trials(&self) -> u16 {
        self.trials.len() as u16
    }

    /// Status of one trial.
    pub fn trial_status(&self, trial: u16) -> Option<Status> {
        self.trials.get(usize::from(trial)).map(TrialHandle::status)
    }

    /// Current step of one trial.
    pub fn trial_step(&self, trial: u16) -> Option<u64> {
        self.trials.get(usize::from(trial)).map(TrialHandle::step)
    }

    /// Step at which trials stop for good.
    pub fn stop_at(&self) -> u64 {
        self.stop_at.load(Ordering::Acquire)
    }

    /// Soft upper bound on simulated steps; trials pause when they reach it.
    pub fn pause_at(&self) -> u64 {
        self.pause_at.load(Ordering::Acquire)
    }

    /// Sets the soft step bound, clamped to the stop step.
    pub fn set_pause_at(&self, step: u64) {
        self.pause_at
            .store(step.min(self.stop_at()), Ordering::Release);
    }

    /// Asks all trials to pause at the next step boundary.
    pub fn pause(&self) {
        self.pause_at.store(0, Ordering::Release);
    }

    pub(crate) fn reset_pause(&self) {
        self.pause_at.store(self.stop_at(), Ordering::Release);
    }

    pub(crate) fn force_stop(&self) {
        self.stop_at.store(0, Ordering::Release);
        self.pause_at.store(0, Ordering::Release);
    }

    pub(crate) fn restore_stop(&self) {
        let stop_at = self.setup.stop_at.min(MAX_STEPS);
        self.stop_at.store(stop_at, Ordering::Release);
        self.pause_at.store(stop_at, Ordering::Release);
    }

    /// Aggregate progress in `[0, 1]`: the completed fraction of
    /// trial-steps.
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Acquire))
    }

    pub(crate) fn set_progress(&self, value: f64) {
        self.progress.store(value.to_bits(), Ordering::Release);
    }

    /// Recomputes the aggregate progress; returns true when it changed.
    pub(crate) fn update_progress(&self) -> bool {
        let stop_at = self.stop_at();
        let mut sum = 0f64;
        for trial in &self.trials {
            sum += match trial.status() {
                Status::Finished => 1.0,
                _ if stop_at == 0 => 0.0,
                _ => (trial.step() as f64 / stop_at as f64).min(1.0),
            };
        }
        let value = sum / self.trials.len() as f64;
        let changed = value != self.progress();
        if changed {
            self.set_progress(value);
        }
        changed
    }

    pub(crate) fn any_trial_invalid(&self) -> bool {
        self.trials.iter().any(|t| t.status() == Status::Invalid)
    }

    pub(crate) fn all_trials_finished(&self) -> bool {
        self.trials.iter().all(|t| t.status() == Status::Finished)
    }

    /// Smallest step among trials that can still run.
    pub(crate) fn min_unfinished_step(&self) -> Option<u64> {
        self.trials
            .iter()
            .filter(|t| matches!(t.status(), Status::Ready | Status::Running))
            .map(TrialHandle::step)
            .min()
    }

    /// Clones the current node population of one trial.
    ///
    /// Available while the trial's runtime is held by the experiment, i.e.
    /// not mid-batch and not dropped by `auto_delete`.
    pub fn trial_nodes(&self, trial: u16) -> Option<SetOfAttributes> {
        let guard = lock_or_recover(&self.runtimes);
        guard
            .iter()
            .find(|rt| rt.id == trial)
            .and_then(|rt| rt.model.as_ref())
            .map(|model| model.nodes().clone())
    }

    /// Takes the trial runtimes for a batch; `None` while another batch
    /// holds them.
    pub(crate) fn take_runtimes(&self) -> Option<Vec<TrialRuntime>> {
        let mut guard = lock_or_recover(&self.runtimes);
        if !self.runtimes_built.load(Ordering::Acquire) {
            *guard = self.build_runtimes();
            self.runtimes_built.store(true, Ordering::Release);
        }
        if guard.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut *guard))
        }
    }

    pub(crate) fn store_runtimes(&self, runtimes: Vec<TrialRuntime>) {
        *lock_or_recover(&self.runtimes) = runtimes;
    }

    pub(crate) fn clear_runtimes(&self) {
        lock_or_recover(&self.runtimes).clear();
        self.runtimes_built.store(false, Ordering::Release);
    }

    /// Resets every trial to its initial state so the experiment can run
    /// again from step 0.
    pub(crate) fn reset_trials(&self) {
        for trial in &self.trials {
            trial.reset();
        }
        self.clear_runtimes();
        self.restore_stop();
        self.set_progress(0.0);
    }

    fn build_runtimes(&self) -> Vec<TrialRuntime> {
        (0..self.trials.len() as u16)
            .map(|t| TrialRuntime::new(t, self.setup.seed.wrapping_add(u64::from(t))))
            .collect()
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("model", &self.setup.model_id)
            .field("graph", &self.setup.graph_id)
            .field("trials", &self.trials.len())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Validates a parameter map against a scope, producing a record laid out
/// in scope order. Missing, unknown and out-of-domain parameters are all
/// rejected.
fn validate_params(
    scope: &AttrsScope,
    params: &BTreeMap<String, String>,
    kind: &str,
) -> Result<Attributes, EvoError> {
    for name in params.keys() {
        if !scope.contains_key(name) {
            return Err(EvoError::Validation(
                ErrorInfo::new("exp.unknown_param", "parameter does not belong to the plugin")
                    .with_context("kind", kind)
                    .with_context("name", name),
            ));
        }
    }

    let mut attrs = Attributes::new();
    for (name, range) in scope {
        let text = params.get(name).ok_or_else(|| {
            EvoError::Validation(
                ErrorInfo::new("exp.missing_param", "a required parameter is missing")
                    .with_context("kind", kind)
                    .with_context("name", name),
            )
        })?;
        let value = range.validate(text);
        if !value.is_valid() {
            return Err(EvoError::Validation(
                ErrorInfo::new("exp.bad_param", "parameter outside its declared domain")
                    .with_context("kind", kind)
                    .with_context("name", name)
                    .with_context("value", text),
            ));
        }
        attrs.push(name.as_str(), value);
    }
    Ok(attrs)
}

pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
