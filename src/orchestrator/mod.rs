//! Service Orchestrator: owns the set of live service instances, executes
//! create/delete through the Tool Caller, runs the health-check control
//! loop, and publishes lifecycle events.
//!
//! Grounded on the teacher's locking style in `backend/mod.rs` (a single
//! reader-writer lock per component, shared reads / exclusive writes) and
//! the two-index-under-one-lock pattern from
//! `other_examples/.../girt-runtime/lifecycle.rs`'s `LifecycleManager`
//! (`components` + `tool_index` kept in lock-step).

mod events;
mod health;
mod instance;

pub use events::{ServiceInstanceEvent, SUBSCRIBER_QUEUE_CAPACITY};
pub use instance::{InstanceHealth, InstanceState, ServiceInstance};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capability::ServiceCapabilityStore;
use crate::config::OrchestratorConfig;
use crate::templater;
use crate::tool_iface::ToolCaller;
use crate::{Error, Result};
use events::EventBus;
use health::ControlMessage;

/// State shared between the public orchestrator handle and the background
/// health-check tasks. Not exposed outside this module.
pub(crate) struct Shared {
    instances: RwLock<HashMap<String, ServiceInstance>>,
    labels: RwLock<HashMap<String, String>>,
    store: Arc<ServiceCapabilityStore>,
    caller: Arc<dyn ToolCaller>,
    events: EventBus,
    /// Root cancellation token, raced against every in-flight create/delete
    /// tool call. Does not fire on its own; external callers trigger it via
    /// [`ServiceOrchestrator::cancellation_token`].
    cancellation: CancellationToken,
}

/// Outcome of racing a tool call against the deadline and the root
/// cancellation token.
enum CallOutcome {
    Done(Result<crate::tool_iface::ToolResponse>),
    TimedOut,
    Cancelled,
}

async fn call_with_cancellation(
    shared: &Shared,
    tool: &str,
    args: Value,
    deadline: Duration,
) -> CallOutcome {
    tokio::select! {
        biased;
        () = shared.cancellation.cancelled() => CallOutcome::Cancelled,
        result = timeout(deadline, shared.caller.call(tool, args)) => match result {
            Ok(response) => CallOutcome::Done(response),
            Err(_elapsed) => CallOutcome::TimedOut,
        },
    }
}

/// Request to create a new service instance.
#[derive(Debug, Clone)]
pub struct CreateServiceRequest {
    /// Name of the service capability to instantiate.
    pub capability_name: String,
    /// User-supplied label. When `None`, the capability's `defaultLabel`
    /// template is rendered against `parameters`.
    pub label: Option<String>,
    /// User-supplied creation parameters.
    pub parameters: HashMap<String, Value>,
}

/// The Service Orchestrator.
pub struct ServiceOrchestrator {
    shared: Arc<Shared>,
    control_tx: Option<mpsc::Sender<ControlMessage>>,
    ticker_handle: Option<JoinHandle<()>>,
    worker_handle: Option<JoinHandle<()>>,
    semaphore: Arc<Semaphore>,
    config: OrchestratorConfig,
    stopped: AtomicBool,
}

impl ServiceOrchestrator {
    /// Construct an orchestrator over `store` and `caller`, launching the
    /// health-check control loop unless `config.disable_control_loops` is
    /// set.
    #[must_use]
    pub fn new(store: Arc<ServiceCapabilityStore>, caller: Arc<dyn ToolCaller>, config: OrchestratorConfig) -> Self {
        let shared = Arc::new(Shared {
            instances: RwLock::new(HashMap::new()),
            labels: RwLock::new(HashMap::new()),
            store,
            caller,
            events: EventBus::new(),
            cancellation: CancellationToken::new(),
        });

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_ops.max(1)));

        let (control_tx, ticker_handle, worker_handle) = if config.disable_control_loops {
            (None, None, None)
        } else {
            let (tx, rx) = mpsc::channel(health::CONTROL_QUEUE_CAPACITY);
            let worker_handle = tokio::spawn(health::run_worker(Arc::clone(&shared), rx));
            let ticker_handle = if config.health_check_interval_secs > 0 {
                let tx2 = tx.clone();
                Some(tokio::spawn(health::run_ticker(Arc::clone(&shared), tx2, config.health_check_interval())))
            } else {
                None
            };
            (Some(tx), ticker_handle, Some(worker_handle))
        };

        Self { shared, control_tx, ticker_handle, worker_handle, semaphore, config, stopped: AtomicBool::new(false) }
    }

    /// Create and start a new service instance.
    pub async fn create_service(&self, req: CreateServiceRequest) -> Result<ServiceInstance> {
        if req.capability_name.trim().is_empty() {
            return Err(Error::validation("capabilityName must not be empty"));
        }

        let def = self
            .shared
            .store
            .get(&req.capability_name)
            .ok_or_else(|| Error::NotFound(req.capability_name.clone()))?;

        if !self.shared.store.is_available(&req.capability_name) {
            return Err(Error::NotAvailable(req.capability_name.clone()));
        }

        let label = match req.label {
            Some(label) if !label.trim().is_empty() => label,
            Some(_) => return Err(Error::validation("label must not be empty")),
            None => {
                let rendered = templater::replace(
                    &Value::String(def.service_config.default_label.clone()),
                    &req.parameters,
                )?;
                rendered.as_str().unwrap_or_default().to_string()
            }
        };
        if label.trim().is_empty() {
            return Err(Error::validation("resolved label must not be empty"));
        }

        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("orchestrator semaphore closed".to_string()))?;

        let now = SystemTime::now();
        let mut instance = ServiceInstance::new(
            label.clone(),
            req.capability_name.clone(),
            def.service_config.service_type.clone(),
            req.parameters.clone(),
            now,
        );

        {
            // Reserve-or-reject under a single write-lock acquisition: the
            // uniqueness check and the index insert must be one atomic step,
            // or two concurrent creates for the same label can both pass the
            // check before either inserts.
            let mut instances = self.shared.instances.write();
            let mut labels = self.shared.labels.write();
            if labels.contains_key(&label) {
                return Err(Error::AlreadyExists(label));
            }
            labels.insert(label.clone(), instance.id.clone());
            instances.insert(instance.id.clone(), instance.clone());
        }

        self.transition_state(&instance.id, InstanceState::Starting, None);
        instance.state = InstanceState::Starting;

        let mut context = req.parameters.clone();
        context.insert("label".to_string(), Value::String(label.clone()));
        context.insert("serviceId".to_string(), Value::String(instance.id.clone()));
        context.insert("capabilityName".to_string(), Value::String(req.capability_name.clone()));
        context.insert("capabilityType".to_string(), Value::String(def.service_config.service_type.clone()));

        let create_tool = &def.service_config.lifecycle_tools.create;
        let args = match templater::replace(
            &Value::Object(create_tool.arguments.clone().into_iter().collect()),
            &context,
        ) {
            Ok(args) => args,
            Err(e) => {
                self.fail_instance(&instance.id, e.to_string());
                return Err(e);
            }
        };

        let create_timeout = if def.service_config.timeout.create_secs > 0 {
            Duration::from_secs(def.service_config.timeout.create_secs)
        } else {
            self.config.default_create_timeout()
        };

        let outcome = call_with_cancellation(&self.shared, &create_tool.tool, args, create_timeout).await;

        let response = match outcome {
            CallOutcome::Done(Ok(response)) => response,
            CallOutcome::Done(Err(e)) => {
                self.fail_instance(&instance.id, e.to_string());
                return Err(e);
            }
            CallOutcome::TimedOut => {
                let err = Error::Timeout(create_timeout);
                self.fail_instance(&instance.id, err.to_string());
                return Err(err);
            }
            CallOutcome::Cancelled => {
                let err = Error::Cancelled(format!("createService cancelled calling '{}'", create_tool.tool));
                self.fail_instance(&instance.id, err.to_string());
                return Err(err);
            }
        };

        if !response.success {
            let message = response.text().unwrap_or("create tool rejected the call").to_string();
            self.fail_instance(&instance.id, message.clone());
            return Err(Error::ToolRejection { tool: create_tool.tool.clone(), message });
        }

        let service_data = extract_response_mapping(&response, &create_tool.response_mapping);
        {
            let mut instances = self.shared.instances.write();
            if let Some(stored) = instances.get_mut(&instance.id) {
                stored.service_data = service_data.clone();
                stored.updated_at = SystemTime::now();
            }
        }
        instance.service_data = service_data;

        self.transition_to_running(&instance.id, &def);
        instance.state = InstanceState::Running;
        if !health_check_configured(&def) {
            instance.health = InstanceHealth::Healthy;
        }

        Ok(instance)
    }

    /// Tear down a service instance by id. Always ends in `Stopped`, even if
    /// the delete tool call fails; the error is recorded, not propagated.
    pub async fn delete_service(&self, id: &str) -> Result<()> {
        let Some(mut instance) = self.get_service(id) else {
            return Err(Error::NotFound(id.to_string()));
        };

        self.transition_state(id, InstanceState::Stopping, None);
        instance.state = InstanceState::Stopping;

        if let Some(def) = self.shared.store.get(&instance.capability_name) {
            let mut context = templater::merge(&[&instance.creation_parameters, &instance.service_data]);
            context.insert("label".to_string(), Value::String(instance.label.clone()));
            context.insert("serviceId".to_string(), Value::String(instance.id.clone()));

            let delete_tool = &def.service_config.lifecycle_tools.delete;
            let delete_timeout = if def.service_config.timeout.delete_secs > 0 {
                Duration::from_secs(def.service_config.timeout.delete_secs)
            } else {
                self.config.default_delete_timeout()
            };

            let mut delete_error = None;
            match templater::replace(&Value::Object(delete_tool.arguments.clone().into_iter().collect()), &context) {
                Ok(args) => match call_with_cancellation(&self.shared, &delete_tool.tool, args, delete_timeout).await {
                    CallOutcome::Done(Ok(response)) if !response.success => {
                        delete_error = Some(response.text().unwrap_or("delete tool rejected the call").to_string());
                    }
                    CallOutcome::Done(Ok(_)) => {}
                    CallOutcome::Done(Err(e)) => delete_error = Some(e.to_string()),
                    CallOutcome::TimedOut => delete_error = Some("delete tool call timed out".to_string()),
                    CallOutcome::Cancelled => {
                        delete_error = Some(
                            Error::Cancelled(format!("deleteService cancelled calling '{}'", delete_tool.tool))
                                .to_string(),
                        );
                    }
                },
                Err(e) => delete_error = Some(e.to_string()),
            }

            if let Some(error) = &delete_error {
                warn!(instance = %id, error, "delete tool call did not succeed; proceeding to Stopped anyway");
            }
            self.transition_state(id, InstanceState::Stopped, delete_error);
        } else {
            warn!(instance = %id, capability = %instance.capability_name, "capability definition missing during delete; transitioning to Stopped");
            self.transition_state(id, InstanceState::Stopped, None);
        }

        let mut instances = self.shared.instances.write();
        let mut labels = self.shared.labels.write();
        if let Some(removed) = instances.remove(id) {
            labels.remove(&removed.label);
        }

        Ok(())
    }

    /// Snapshot of a single instance by id.
    #[must_use]
    pub fn get_service(&self, id: &str) -> Option<ServiceInstance> {
        self.shared.instances.read().get(id).cloned()
    }

    /// Snapshot of a single instance by label.
    #[must_use]
    pub fn get_service_by_label(&self, label: &str) -> Option<ServiceInstance> {
        let id = self.shared.labels.read().get(label).cloned()?;
        self.get_service(&id)
    }

    /// Snapshot of every known instance.
    #[must_use]
    pub fn list_services(&self) -> Vec<ServiceInstance> {
        self.shared.instances.read().values().cloned().collect()
    }

    /// Subscribe to the lifecycle event stream.
    pub fn subscribe_to_events(&self) -> mpsc::Receiver<ServiceInstanceEvent> {
        self.shared.events.subscribe()
    }

    /// The root cancellation token. Triggering it aborts whichever
    /// create/delete tool call is currently in flight on any instance: a
    /// cancelled `createService` transitions the instance to `Failed`; a
    /// cancelled `deleteService` records the cancellation and still
    /// proceeds to `Stopped`, per the best-effort delete contract.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancellation.clone()
    }

    /// Stop the control loops, tear down every `Running` instance, and close
    /// all subscriber queues. Idempotent.
    pub async fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(ControlMessage::Shutdown).await;
        }
        if let Some(handle) = self.ticker_handle.take() {
            handle.abort();
        }

        let running: Vec<String> = self
            .shared
            .instances
            .read()
            .values()
            .filter(|i| i.state == InstanceState::Running)
            .map(|i| i.id.clone())
            .collect();

        let teardown = async {
            for id in running {
                if let Err(e) = self.delete_service(&id).await {
                    warn!(instance = %id, error = %e, "failed to stop instance during shutdown");
                }
            }
        };
        if timeout(Duration::from_secs(30), teardown).await.is_err() {
            warn!("shutdown teardown of running instances exceeded 30s fallback");
        }

        if let Some(handle) = self.worker_handle.take() {
            match timeout(Duration::from_secs(30), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    warn!(error = %Error::from(join_error), "health-check worker ended abnormally during shutdown");
                }
                Err(_elapsed) => warn!("health-check worker did not join within the 30s shutdown fallback"),
            }
        }

        self.shared.events.close();
        info!("service orchestrator stopped");
    }

    fn transition_state(&self, id: &str, new_state: InstanceState, error: Option<String>) {
        let mut instances = self.shared.instances.write();
        let Some(instance) = instances.get_mut(id) else { return };
        let old_state = instance.state;
        let old_health = instance.health;
        instance.state = new_state;
        instance.last_error = error.clone();
        instance.updated_at = SystemTime::now();

        let event = ServiceInstanceEvent {
            id: instance.id.clone(),
            label: instance.label.clone(),
            capability_type: instance.capability_type.clone(),
            old_state,
            new_state,
            old_health,
            new_health: old_health,
            error,
            timestamp: SystemTime::now(),
            metadata: HashMap::new(),
        };
        drop(instances);
        self.shared.events.publish(event);
    }

    fn fail_instance(&self, id: &str, error: String) {
        self.transition_state(id, InstanceState::Failed, Some(error));
    }

    /// Starting -> Running, resolving health synchronously in the same
    /// locked update and the same published event when no health-check tool
    /// is configured (§4.3 step 2: nothing will ever check it, so `Unknown`
    /// would never clear on its own). Instances with health-checking
    /// configured stay `Unknown` here; the control loop resolves them.
    fn transition_to_running(&self, id: &str, def: &crate::capability::ServiceCapabilityDefinition) {
        let mut instances = self.shared.instances.write();
        let Some(instance) = instances.get_mut(id) else { return };
        let old_state = instance.state;
        let old_health = instance.health;
        instance.state = InstanceState::Running;
        if !health_check_configured(def) {
            instance.health = InstanceHealth::Healthy;
        }
        instance.updated_at = SystemTime::now();

        let event = ServiceInstanceEvent {
            id: instance.id.clone(),
            label: instance.label.clone(),
            capability_type: instance.capability_type.clone(),
            old_state,
            new_state: InstanceState::Running,
            old_health,
            new_health: instance.health,
            error: None,
            timestamp: SystemTime::now(),
            metadata: HashMap::new(),
        };
        drop(instances);
        self.shared.events.publish(event);
    }
}

fn health_check_configured(def: &crate::capability::ServiceCapabilityDefinition) -> bool {
    def.service_config.health_check.enabled && def.service_config.lifecycle_tools.health_check.is_some()
}

fn extract_response_mapping(
    response: &crate::tool_iface::ToolResponse,
    mapping: &crate::capability::ResponseMapping,
) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    if let Some(path) = &mapping.service_id {
        if let Some(v) = response.extract_path(path) {
            out.insert("external_service_id".to_string(), v);
        }
    }
    if let Some(path) = &mapping.status {
        if let Some(v) = response.extract_path(path) {
            out.insert("external_status".to_string(), v);
        }
    }
    if let Some(path) = &mapping.health {
        if let Some(v) = response.extract_path(path) {
            out.insert("external_health".to_string(), v);
        }
    }
    if let Some(path) = &mapping.error {
        if let Some(v) = response.extract_path(path) {
            out.insert("external_error".to_string(), v);
        }
    }
    for (key, path) in &mapping.metadata {
        if let Some(v) = response.extract_path(path) {
            out.insert(key.clone(), v);
        }
    }
    out
}
