//! End-to-end scenarios over the public capability & orchestration surface.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use capability_core::capability::{CapabilityStore, FsDefinitionStorage, ServiceCapabilityStore};
use capability_core::config::StoreConfig;
use capability_core::execution_adapter::CapabilityExecutionAdapter;
use capability_core::orchestrator::{CreateServiceRequest, InstanceHealth, InstanceState, ServiceOrchestrator};
use capability_core::templater;
use capability_core::tool_iface::{ToolAvailabilityOracle, ToolCaller, ToolResponse};
use capability_core::Error;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;

struct FixedOracle(HashSet<String>);
impl ToolAvailabilityOracle for FixedOracle {
    fn is_available(&self, tool_name: &str) -> bool {
        self.0.contains(tool_name)
    }
    fn list_available(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

struct AllAvailable;
impl ToolAvailabilityOracle for AllAvailable {
    fn is_available(&self, _tool_name: &str) -> bool {
        true
    }
    fn list_available(&self) -> Vec<String> {
        vec![]
    }
}

/// Always succeeds on create/delete; health outcome is controlled by a
/// shared flag so tests can flip it mid-run.
struct ScriptedCaller {
    healthy: Arc<AtomicBool>,
}
#[async_trait]
impl ToolCaller for ScriptedCaller {
    async fn call(&self, tool_name: &str, _args: Value) -> capability_core::Result<ToolResponse> {
        if tool_name.contains("health") {
            let ok = self.healthy.load(Ordering::SeqCst);
            return Ok(ToolResponse { success: ok, fields: HashMap::new() });
        }
        let mut response = ToolResponse { success: true, fields: HashMap::new() };
        response.fields.insert("id".to_string(), Value::String("ext-1".to_string()));
        Ok(response)
    }
}

fn store_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        user_dir: None,
        project_dir: dir.path().to_path_buf(),
        capabilities_subdir: "capabilities".to_string(),
        service_capabilities_subdir: "service_capabilities".to_string(),
    }
}

async fn write_service_yaml(dir: &TempDir, name: &str, yaml: &str) {
    tokio::fs::create_dir_all(dir.path().join("service_capabilities")).await.unwrap();
    tokio::fs::write(dir.path().join(format!("service_capabilities/{name}.yaml")), yaml).await.unwrap();
}

const CACHE_YAML: &str = r#"
name: cache
type: memory
operations:
  get:
    description: reads a key
    requires: [api_memory_get]
    workflow: get_workflow
service_config:
  service_type: memory
  default_label: "cache-{{index}}"
  lifecycle_tools:
    create:
      tool: x_memory_create
      arguments: {size: "{{size}}"}
      response_mapping:
        service_id: id
    delete:
      tool: x_memory_delete
      arguments: {service_id: "{{external_service_id}}"}
    health_check:
      tool: x_memory_health
      arguments: {service_id: "{{external_service_id}}"}
  health_check:
    enabled: true
    interval_secs: 1
    failure_threshold: 2
    success_threshold: 2
"#;

/// S1 — creating a service whose required tools are all available runs it
/// to completion and leaves it Running.
#[tokio::test]
async fn s1_create_auto_running() {
    let dir = TempDir::new().unwrap();
    write_service_yaml(&dir, "cache", CACHE_YAML).await;

    let oracle = Arc::new(AllAvailable);
    let storage = Arc::new(FsDefinitionStorage::new(dir.path().join("service_capabilities")));
    let store = Arc::new(ServiceCapabilityStore::new(storage, oracle, store_config(&dir)));
    store.load().await;

    let caller = Arc::new(ScriptedCaller { healthy: Arc::new(AtomicBool::new(true)) });
    let mut orchestrator = ServiceOrchestrator::new(
        store,
        caller,
        capability_core::config::OrchestratorConfig { disable_control_loops: true, ..Default::default() },
    );

    let mut params = HashMap::new();
    params.insert("index".to_string(), Value::String("1".to_string()));
    params.insert("size".to_string(), Value::String("1gb".to_string()));

    let instance = orchestrator
        .create_service(CreateServiceRequest { capability_name: "cache".to_string(), label: None, parameters: params })
        .await
        .unwrap();

    assert_eq!(instance.state, InstanceState::Running);
    assert_eq!(instance.label, "cache-1");
    orchestrator.stop().await;
}

/// S2 — executing an operation whose required tool is not advertised is
/// rejected with `NotAvailable`, not silently attempted.
#[tokio::test]
async fn s2_missing_tool_rejection() {
    let dir = TempDir::new().unwrap();
    tokio::fs::create_dir_all(dir.path().join("capabilities")).await.unwrap();
    tokio::fs::write(
        dir.path().join("capabilities/search.yaml"),
        r"
name: search
type: rest
operations:
  find:
    description: finds things
    requires: [api_search_find]
    workflow: find_workflow
",
    )
    .await
    .unwrap();

    let oracle = Arc::new(FixedOracle(HashSet::new()));
    let storage = Arc::new(FsDefinitionStorage::new(dir.path().join("capabilities")));
    let store = Arc::new(CapabilityStore::new(storage, oracle, store_config(&dir)));
    store.load().await;

    let caller: Arc<dyn ToolCaller> = Arc::new(ScriptedCaller { healthy: Arc::new(AtomicBool::new(true)) });
    let adapter = CapabilityExecutionAdapter::new(store, caller);

    let err = adapter.execute_capability("rest", "find", Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::NotAvailable(_)));
}

/// S3 — two creates racing for the same label: the second is rejected, the
/// first is untouched.
#[tokio::test]
async fn s3_duplicate_label_rejected() {
    let dir = TempDir::new().unwrap();
    write_service_yaml(&dir, "cache", CACHE_YAML).await;

    let oracle = Arc::new(AllAvailable);
    let storage = Arc::new(FsDefinitionStorage::new(dir.path().join("service_capabilities")));
    let store = Arc::new(ServiceCapabilityStore::new(storage, oracle, store_config(&dir)));
    store.load().await;

    let caller = Arc::new(ScriptedCaller { healthy: Arc::new(AtomicBool::new(true)) });
    let mut orchestrator = ServiceOrchestrator::new(
        store,
        caller,
        capability_core::config::OrchestratorConfig { disable_control_loops: true, ..Default::default() },
    );

    let mut params = HashMap::new();
    params.insert("size".to_string(), Value::String("1gb".to_string()));

    orchestrator
        .create_service(CreateServiceRequest {
            capability_name: "cache".to_string(),
            label: Some("shared".to_string()),
            parameters: params.clone(),
        })
        .await
        .unwrap();

    let err = orchestrator
        .create_service(CreateServiceRequest {
            capability_name: "cache".to_string(),
            label: Some("shared".to_string()),
            parameters: params,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AlreadyExists(_)));
    assert!(orchestrator.get_service_by_label("shared").is_some());
    orchestrator.stop().await;
}

/// S4 — a Running instance whose health checks fail `failureThreshold`
/// times in a row degrades to Unhealthy, then recovers after
/// `successThreshold` consecutive successes. Exactly one event fires per
/// crossing.
#[tokio::test(start_paused = true)]
async fn s4_health_degradation_and_recovery() {
    let dir = TempDir::new().unwrap();
    write_service_yaml(&dir, "cache", CACHE_YAML).await;

    let oracle = Arc::new(AllAvailable);
    let storage = Arc::new(FsDefinitionStorage::new(dir.path().join("service_capabilities")));
    let store = Arc::new(ServiceCapabilityStore::new(storage, oracle, store_config(&dir)));
    store.load().await;

    let healthy = Arc::new(AtomicBool::new(true));
    let caller = Arc::new(ScriptedCaller { healthy: healthy.clone() });
    let mut orchestrator = ServiceOrchestrator::new(
        store,
        caller,
        capability_core::config::OrchestratorConfig { health_check_interval_secs: 1, ..Default::default() },
    );

    let mut rx = orchestrator.subscribe_to_events();

    let mut params = HashMap::new();
    params.insert("size".to_string(), Value::String("1gb".to_string()));
    let instance = orchestrator
        .create_service(CreateServiceRequest { capability_name: "cache".to_string(), label: None, parameters: params })
        .await
        .unwrap();
    assert_eq!(instance.state, InstanceState::Running);

    // First threshold crossing: Unknown -> Healthy, once the success
    // threshold is reached.
    let first = next_health_transition(&mut rx).await;
    assert_eq!(first, (InstanceHealth::Unknown, InstanceHealth::Healthy));

    healthy.store(false, Ordering::SeqCst);
    let second = next_health_transition(&mut rx).await;
    assert_eq!(second, (InstanceHealth::Healthy, InstanceHealth::Unhealthy));

    healthy.store(true, Ordering::SeqCst);
    let third = next_health_transition(&mut rx).await;
    assert_eq!(third, (InstanceHealth::Unhealthy, InstanceHealth::Healthy));

    orchestrator.stop().await;
}

async fn next_health_transition(
    rx: &mut tokio::sync::mpsc::Receiver<capability_core::orchestrator::ServiceInstanceEvent>,
) -> (InstanceHealth, InstanceHealth) {
    loop {
        let event = rx.recv().await.expect("event bus closed before expected transition");
        if event.old_health != event.new_health {
            return (event.old_health, event.new_health);
        }
    }
}

/// S5 — deleting an instance whose capability definition has since been
/// removed still completes and leaves the instance fully de-indexed.
#[tokio::test]
async fn s5_delete_with_absent_definition() {
    let dir = TempDir::new().unwrap();
    write_service_yaml(&dir, "cache", CACHE_YAML).await;

    let oracle = Arc::new(AllAvailable);
    let storage = Arc::new(FsDefinitionStorage::new(dir.path().join("service_capabilities")));
    let store = Arc::new(ServiceCapabilityStore::new(storage, oracle, store_config(&dir)));
    store.load().await;

    let caller = Arc::new(ScriptedCaller { healthy: Arc::new(AtomicBool::new(true)) });
    let mut orchestrator = ServiceOrchestrator::new(
        store.clone(),
        caller,
        capability_core::config::OrchestratorConfig { disable_control_loops: true, ..Default::default() },
    );

    let mut params = HashMap::new();
    params.insert("size".to_string(), Value::String("1gb".to_string()));
    let instance = orchestrator
        .create_service(CreateServiceRequest {
            capability_name: "cache".to_string(),
            label: Some("doomed".to_string()),
            parameters: params,
        })
        .await
        .unwrap();

    store.delete("cache").await.unwrap();

    orchestrator.delete_service(&instance.id).await.unwrap();

    assert!(orchestrator.get_service(&instance.id).is_none());
    assert!(orchestrator.get_service_by_label("doomed").is_none());
    orchestrator.stop().await;
}

/// S6 — a value whose variables are all bound round-trips through
/// `replace` idempotently.
#[test]
fn s6_template_round_trip() {
    let mut context = HashMap::new();
    context.insert("label".to_string(), Value::String("cache-1".to_string()));
    context.insert("size".to_string(), Value::String("1gb".to_string()));

    let value = serde_json::json!({
        "name": "{{label}}",
        "config": {"size": "{{ size }}", "replicas": 3},
        "tags": ["{{label}}", "static"]
    });

    let once = templater::replace(&value, &context).unwrap();
    let twice = templater::replace(&once, &context).unwrap();
    assert_eq!(once, twice);
    assert_eq!(once["name"].clone(), Value::String("cache-1".to_string()));
    assert_eq!(once["config"]["size"].clone(), Value::String("1gb".to_string()));
}
