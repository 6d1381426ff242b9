use std::panic;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use scriptrunner::config::SandboxConfig;
use scriptrunner::core::domain::ExecutionRequest;
use scriptrunner::native::sandbox::ProcessSandbox;
use scriptrunner::service::ExecutionService;

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let Some(script_path) = std::env::args_os().nth(1) else {
        eprintln!("usage: scriptrunner <script.py>");
        return Ok(ExitCode::from(64));
    };
    let script = tokio::fs::read_to_string(&script_path).await?;

    let config = SandboxConfig::from_env()?;
    tracing::debug!("Config: {:?}", config);
    let timeout = config.timeout;
    let staging_dir = config.staging_dir.clone();
    let service = ExecutionService::new(Arc::new(ProcessSandbox::new(config)), staging_dir);

    let result = service
        .execute(&ExecutionRequest::new(script, timeout))
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
