// vpt-controllers/src/registry.rs
// ============================================================================
// Module: Controller Registry
// Description: Per-device, per-category controller instances with lazy
//              construction and command→category routing (§4.4).
// Purpose: Implement `vpt_core::interfaces::CommandDispatcher` so the
//          Executor never talks to a driver directly.
// Dependencies: vpt-core, dashmap
// ============================================================================

//! ## Overview
//! One [`ControllerRegistry`] instance lives for the Host process's lifetime
//! (§9 "Global mutable state"). It holds, per device model, a factory for
//! each [`Category`] the model declares a driver for; [`ControllerRegistry::new`]
//! samples each factory once to build the `{command -> category}` routing
//! table (§4.4), then discards the sample. `execute_command` — the
//! [`vpt_core::CommandDispatcher`] entry point — resolves a command's
//! category from that table, lazily constructs (and caches) the real
//! instance for `(device_id, category)` under a per-device construction
//! lock, and dispatches.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use dashmap::DashMap;
use serde_json::Value;

use vpt_core::core::ids::DeviceId;
use vpt_core::core::CoreError;
use vpt_core::interfaces::CommandDispatcher;
use vpt_core::interfaces::CommandOutcome;

use crate::clock::wait_time_from_params;
use crate::clock::Clock;
use crate::clock::RealClock;
use crate::driver::CancelSignal;
use crate::driver::Category;
use crate::driver::Driver;

/// A device declares no driver for the requested category (§4.4
/// `GetController`).
#[derive(Debug, thiserror::Error)]
#[error("no controller registered for device {device_id} category {category}")]
pub struct NoSuchControllerError {
    pub device_id: String,
    pub category: &'static str,
}

type DriverFactory = Arc<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

/// The set of drivers one device model declares, one factory per category it
/// supports. A model need not cover every category (§4.4: "`NoSuchController`
/// if the device's model declares no driver for that category").
#[derive(Clone)]
pub struct ModelDriverSet {
    pub device_model: String,
    factories: HashMap<Category, DriverFactory>,
}

impl ModelDriverSet {
    #[must_use]
    pub fn new(device_model: impl Into<String>) -> Self {
        Self { device_model: device_model.into(), factories: HashMap::new() }
    }

    #[must_use]
    pub fn with_driver<F>(mut self, category: Category, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Driver> + Send + Sync + 'static,
    {
        self.factories.insert(category, Arc::new(factory));
        self
    }
}

struct Never;
impl CancelSignal for Never {
    fn is_canceled(&self) -> bool {
        false
    }
}

/// Host-side controller registry (§4.4, §5 "Shared-resource policy").
pub struct ControllerRegistry {
    model_sets: HashMap<String, ModelDriverSet>,
    command_routes: HashMap<String, Category>,
    device_models: DashMap<DeviceId, String>,
    instances: DashMap<(DeviceId, Category), Arc<dyn Driver>>,
    construction_locks: DashMap<DeviceId, Arc<Mutex<()>>>,
    clock: Arc<dyn Clock>,
}

impl ControllerRegistry {
    /// Builds the registry and its command→category routing table by
    /// sampling one throwaway instance from each model's factories (§4.4:
    /// "computed from each driver's declared command list at startup").
    #[must_use]
    pub fn new(model_sets: Vec<ModelDriverSet>) -> Self {
        Self::with_clock(model_sets, Arc::new(RealClock))
    }

    #[must_use]
    pub fn with_clock(model_sets: Vec<ModelDriverSet>, clock: Arc<dyn Clock>) -> Self {
        let mut command_routes = HashMap::new();
        for set in &model_sets {
            for factory in set.factories.values() {
                let sample = factory();
                let category = sample.category();
                for command in sample.commands() {
                    command_routes.insert(command.name, category);
                }
            }
        }

        Self {
            model_sets: model_sets.into_iter().map(|set| (set.device_model.clone(), set)).collect(),
            command_routes,
            device_models: DashMap::new(),
            instances: DashMap::new(),
            construction_locks: DashMap::new(),
            clock,
        }
    }

    /// Declares the device model backing `device_id`, so later
    /// `get_controller` calls know which factory set to construct from.
    /// Idempotent — re-registering the same device with the same model is a
    /// no-op; re-registering with a different model drops any cached
    /// controller instances for it (a reconnect with a new model identity).
    pub fn register_device(&self, device_id: DeviceId, device_model: impl Into<String>) {
        let device_model = device_model.into();
        let changed = self
            .device_models
            .get(&device_id)
            .map(|existing| *existing != device_model)
            .unwrap_or(true);
        self.device_models.insert(device_id.clone(), device_model);
        if changed {
            self.instances.retain(|(id, _), _| id != &device_id);
        }
    }

    /// `GetController(device_id, category) -> Controller` (§4.4). Returns
    /// the cached instance or constructs it from the device model's
    /// configured driver set; concurrent construction for the same device is
    /// serialized by a per-device lock.
    ///
    /// # Errors
    /// [`NoSuchControllerError`] when the device is unregistered or its
    /// model declares no driver for `category`.
    pub fn get_controller(&self, device_id: &DeviceId, category: Category) -> Result<Arc<dyn Driver>, NoSuchControllerError> {
        if let Some(existing) = self.instances.get(&(device_id.clone(), category)) {
            return Ok(existing.clone());
        }

        let lock = self
            .construction_locks
            .entry(device_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().expect("controller construction lock poisoned");

        // Re-check: another thread may have constructed it while we waited.
        if let Some(existing) = self.instances.get(&(device_id.clone(), category)) {
            return Ok(existing.clone());
        }

        let no_such = || NoSuchControllerError { device_id: device_id.to_string(), category: category.as_str() };
        let model = self.device_models.get(device_id).ok_or_else(no_such)?;
        let set = self.model_sets.get(model.as_str()).ok_or_else(no_such)?;
        let factory = set.factories.get(&category).ok_or_else(no_such)?;
        let instance: Arc<dyn Driver> = Arc::from(factory());
        self.instances.insert((device_id.clone(), category), instance.clone());
        Ok(instance)
    }

    /// The category that would handle `command`, per the startup-computed
    /// routing table (§4.4).
    #[must_use]
    pub fn category_for_command(&self, command: &str) -> Option<Category> {
        self.command_routes.get(command).copied()
    }
}

impl CommandDispatcher for ControllerRegistry {
    /// `ExecuteCommand(device_id, category, command, params) ->
    /// (success, evidence?)` (§4.4): the category is resolved from the
    /// command-routing table rather than taken as a parameter, since
    /// `CommandDispatcher` (the Executor's view, §4.2.1) only knows commands.
    fn execute_command(&self, device_id: &DeviceId, command: &str, params: &Value) -> Result<CommandOutcome, CoreError> {
        let category = self
            .category_for_command(command)
            .ok_or_else(|| CoreError::DeviceUnavailable(format!("no driver declares command \"{command}\"")))?;

        let driver = self
            .get_controller(device_id, category)
            .map_err(|err| CoreError::DeviceUnavailable(err.to_string()))?;

        let outcome = driver
            .execute(command, params, &Never)
            .map_err(|err| CoreError::DeviceUnavailable(format!("driver construction/transport error: {err}")))?;

        self.clock.sleep(wait_time_from_params(params));

        if outcome.success {
            Ok(CommandOutcome { success: true, evidence_uris: outcome.evidence })
        } else {
            // A controller-reported failure is a retryable step failure
            // (§4.4 Failure semantics), not a dispatcher error: return it as
            // an unsuccessful outcome so the executor's action-set retry
            // policy decides what happens next, rather than aborting here.
            Ok(CommandOutcome { success: false, evidence_uris: outcome.evidence })
        }
    }
}
