//! `corectl` - diagnostic CLI over the capability & service orchestration core.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use capability_core::capability::{
    is_service_capability_path, parse_definition_file, passed, validate_capability, validate_service_capability,
    CapabilityStore, FsDefinitionStorage, ParsedDefinition, ServiceCapabilityStore,
};
use capability_core::cli::{Cli, Command};
use capability_core::config::{Config, StoreConfig};
use capability_core::execution_adapter::CapabilityExecutionAdapter;
use capability_core::orchestrator::{CreateServiceRequest, ServiceOrchestrator};
use capability_core::tool_iface::{ToolAvailabilityOracle, ToolCaller, ToolResponse};
use capability_core::{setup_tracing, Result};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("failed to set up tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Validate { path, strict } => run_validate(&path, strict).await,
        Command::Demo { definitions } => run_demo(definitions, config.store.clone()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_validate(path: &std::path::Path, strict: bool) -> Result<()> {
    let mut files_checked = 0usize;
    let mut total_errors = 0usize;
    let mut total_warnings = 0usize;

    for entry in WalkDir::new(path).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_path = entry.path();
        let is_yaml = file_path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }

        files_checked += 1;
        let parsed = match parse_definition_file(file_path).await {
            Ok(parsed) => parsed,
            Err(e) => {
                total_errors += 1;
                println!("FAIL {}: {e}", file_path.display());
                continue;
            }
        };

        let issues = match &parsed {
            ParsedDefinition::Capability(def) => validate_capability(def),
            ParsedDefinition::Service(def) => validate_service_capability(def),
        };

        let has_service_hint = is_service_capability_path(file_path);
        if has_service_hint != matches!(parsed, ParsedDefinition::Service(_)) {
            warn!(path = %file_path.display(), "file location and content disagree on capability kind");
        }

        if issues.is_empty() {
            println!("PASS {}", file_path.display());
            continue;
        }

        for issue in &issues {
            match issue.severity {
                capability_core::capability::Severity::Error => total_errors += 1,
                capability_core::capability::Severity::Warning => total_warnings += 1,
            }
            println!("{:?} {}: {} - {}", issue.severity, file_path.display(), issue.field, issue.message);
        }
    }

    println!("\nchecked {files_checked} file(s): {total_errors} error(s), {total_warnings} warning(s)");

    let failed = total_errors > 0 || (strict && total_warnings > 0);
    if failed {
        Err(capability_core::Error::ValidationFailure(vec![format!(
            "{total_errors} error(s), {total_warnings} warning(s)"
        )]))
    } else {
        Ok(())
    }
}

async fn run_demo(definitions: Option<std::path::PathBuf>, mut store_config: StoreConfig) -> Result<()> {
    if let Some(dir) = definitions {
        store_config.project_dir = dir;
    }

    let oracle = Arc::new(AlwaysAvailable);
    let caller: Arc<dyn ToolCaller> = Arc::new(EchoingCaller);

    let capability_storage = Arc::new(FsDefinitionStorage::new(store_config.project_dir.join(&store_config.capabilities_subdir)));
    let capability_store = Arc::new(CapabilityStore::new(capability_storage, oracle.clone(), store_config.clone()));
    let capability_count = capability_store.load().await;

    let service_storage = Arc::new(FsDefinitionStorage::new(
        store_config.project_dir.join(&store_config.service_capabilities_subdir),
    ));
    let service_store = Arc::new(ServiceCapabilityStore::new(service_storage, oracle, store_config));
    let service_count = service_store.load().await;

    info!(capability_count, service_count, "loaded definitions for demo");

    let adapter = CapabilityExecutionAdapter::new(capability_store, caller.clone());
    println!("\ncapability catalogue:");
    for info in adapter.list_capabilities() {
        println!("  {} ({}): {} operation(s)", info.name, info.kind, info.operations.len());
        for op in &info.operations {
            println!("    - {} [available={}]", op.name, op.available);
        }
    }

    let mut orchestrator = ServiceOrchestrator::new(
        service_store.clone(),
        caller,
        capability_core::config::OrchestratorConfig { disable_control_loops: true, ..Default::default() },
    );

    if let Some(def) = service_store.list().into_iter().next() {
        println!("\ncreating a demo instance of '{}'...", def.capability.name);
        match orchestrator
            .create_service(CreateServiceRequest {
                capability_name: def.capability.name.clone(),
                label: None,
                parameters: HashMap::new(),
            })
            .await
        {
            Ok(instance) => {
                println!("  created instance {} ({:?})", instance.id, instance.state);
                orchestrator.delete_service(&instance.id).await?;
                println!("  deleted instance {}", instance.id);
            }
            Err(e) => println!("  demo creation failed: {e}"),
        }
    } else {
        println!("\nno service capabilities loaded; skipping instance demo");
    }

    orchestrator.stop().await;
    Ok(())
}

struct AlwaysAvailable;
impl ToolAvailabilityOracle for AlwaysAvailable {
    fn is_available(&self, _tool_name: &str) -> bool {
        true
    }
    fn list_available(&self) -> Vec<String> {
        vec![]
    }
}

struct EchoingCaller;
#[async_trait]
impl ToolCaller for EchoingCaller {
    async fn call(&self, tool_name: &str, _args: Value) -> Result<ToolResponse> {
        let mut response = ToolResponse { success: true, fields: HashMap::new() };
        response.fields.insert("id".to_string(), Value::String(format!("demo-{tool_name}")));
        Ok(response)
    }
}
