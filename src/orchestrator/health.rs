//! Health-check control loop: a periodic ticker enqueues work, a single
//! control worker drains it serially.
//!
//! Grounded on the teacher's `failsafe::health::HealthTracker`, which
//! tracks consecutive failures/successes with atomics and a fixed
//! three-failure threshold. The orchestrator generalises the threshold to
//! the capability's configured `failureThreshold`/`successThreshold` and
//! moves the bookkeeping behind a single serialising worker rather than
//! atomics, since the worker is also the sole mutator of instance health.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::events::ServiceInstanceEvent;
use super::instance::{InstanceHealth, InstanceState};
use super::Shared;
use crate::templater;

/// Capacity of the control channel the ticker enqueues onto.
pub const CONTROL_QUEUE_CAPACITY: usize = 100;

/// A message on the health-check control channel.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Run one health check for the named instance.
    Check(String),
    /// Drain and exit.
    Shutdown,
}

/// Periodically enqueue a `Check` message for every `Running` instance.
/// Runs until `interval` is zero (caller should not spawn this at all in
/// that case) or the channel is dropped.
pub async fn run_ticker(shared: Arc<Shared>, tx: mpsc::Sender<ControlMessage>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let running_ids: Vec<String> = shared
            .instances
            .read()
            .iter()
            .filter(|(_, inst)| inst.state == InstanceState::Running)
            .map(|(id, _)| id.clone())
            .collect();

        for id in running_ids {
            match tx.try_send(ControlMessage::Check(id.clone())) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(instance = %id, "health-check control channel full, dropping tick");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    }
}

/// Drain the control channel serially, running health checks one at a time.
/// This is the sole mutator of instance health state, so ordering is
/// naturally linearised.
pub async fn run_worker(shared: Arc<Shared>, mut rx: mpsc::Receiver<ControlMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            ControlMessage::Check(id) => check_instance(&shared, &id).await,
            ControlMessage::Shutdown => break,
        }
    }
}

async fn check_instance(shared: &Shared, id: &str) {
    let Some(instance) = shared.instances.read().get(id).cloned() else {
        return;
    };
    if instance.state != InstanceState::Running {
        return;
    }

    let Some(def) = shared.store.get(&instance.capability_name) else {
        debug!(instance = %id, "capability definition disappeared, skipping health check");
        return;
    };

    let health_check = &def.service_config.health_check;
    let Some(tool) = &def.service_config.lifecycle_tools.health_check else {
        set_health(shared, id, InstanceHealth::Healthy, None);
        return;
    };
    if !health_check.enabled {
        set_health(shared, id, InstanceHealth::Healthy, None);
        return;
    }

    let mut context = templater::merge(&[&instance.creation_parameters, &instance.service_data]);
    context.insert("label".to_string(), serde_json::Value::String(instance.label.clone()));
    context.insert("serviceId".to_string(), serde_json::Value::String(instance.id.clone()));

    let args = match templater::replace(&serde_json::Value::Object(tool.arguments.clone().into_iter().collect()), &context) {
        Ok(args) => args,
        Err(e) => {
            warn!(instance = %id, error = %e, "failed to template health-check arguments");
            record_failure(shared, id, health_check.failure_threshold);
            return;
        }
    };

    let deadline = Duration::from_secs(health_check.interval_secs.max(1)) / 2;
    let call_result = timeout(deadline, shared.caller.call(&tool.tool, args)).await;

    match call_result {
        Ok(Ok(response)) if response.success => {
            record_success(shared, id, health_check.success_threshold);
        }
        Ok(Ok(_failure_response)) => {
            record_failure(shared, id, health_check.failure_threshold);
        }
        Ok(Err(e)) => {
            warn!(instance = %id, error = %e, "health-check tool call failed");
            record_failure(shared, id, health_check.failure_threshold);
        }
        Err(_elapsed) => {
            warn!(instance = %id, "health-check timed out");
            record_failure(shared, id, health_check.failure_threshold);
        }
    }
}

fn record_failure(shared: &Shared, id: &str, failure_threshold: u32) {
    let mut instances = shared.instances.write();
    let Some(instance) = instances.get_mut(id) else { return };
    instance.failure_count += 1;
    instance.success_count = 0;
    instance.last_checked = Some(SystemTime::now());
    let old_health = instance.health;
    if instance.failure_count >= failure_threshold && old_health != InstanceHealth::Unhealthy {
        instance.health = InstanceHealth::Unhealthy;
        let event = health_event(instance, old_health);
        drop(instances);
        shared.events.publish(event);
    }
}

fn record_success(shared: &Shared, id: &str, success_threshold: u32) {
    let mut instances = shared.instances.write();
    let Some(instance) = instances.get_mut(id) else { return };
    instance.success_count += 1;
    instance.failure_count = 0;
    instance.last_checked = Some(SystemTime::now());
    let old_health = instance.health;
    if instance.success_count >= success_threshold && old_health != InstanceHealth::Healthy {
        instance.health = InstanceHealth::Healthy;
        let event = health_event(instance, old_health);
        drop(instances);
        shared.events.publish(event);
    }
}

fn set_health(shared: &Shared, id: &str, health: InstanceHealth, error: Option<String>) {
    let mut instances = shared.instances.write();
    let Some(instance) = instances.get_mut(id) else { return };
    let old_health = instance.health;
    if old_health == health {
        return;
    }
    instance.health = health;
    instance.last_checked = Some(SystemTime::now());
    instance.last_error = error.clone();
    let mut event = health_event(instance, old_health);
    event.error = error;
    drop(instances);
    shared.events.publish(event);
}

fn health_event(instance: &super::instance::ServiceInstance, old_health: InstanceHealth) -> ServiceInstanceEvent {
    ServiceInstanceEvent {
        id: instance.id.clone(),
        label: instance.label.clone(),
        capability_type: instance.capability_type.clone(),
        old_state: instance.state,
        new_state: instance.state,
        old_health,
        new_health: instance.health,
        error: instance.last_error.clone(),
        timestamp: SystemTime::now(),
        metadata: std::collections::HashMap::new(),
    }
}
