//! The isolated runtime. Runs exactly one script and writes exactly one
//! protocol document to stdout. Diagnostics go to stderr, and so does
//! anything the script writes to fd 1 behind the host's back.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use scriptrunner::core::protocol::EXIT_RUNTIME_UNAVAILABLE;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    set_panic_hook();

    // The entry script argument, when present, precedes the script path.
    let Some(script_path) = std::env::args_os().skip(1).last().map(PathBuf::from) else {
        eprintln!("usage: sandbox-runtime <script>");
        return ExitCode::from(64);
    };

    run(&script_path)
}

#[cfg(feature = "python")]
fn run(script_path: &std::path::Path) -> ExitCode {
    use scriptrunner::python::{PyplotRegistry, PythonHost};
    use scriptrunner::runtime::channel::ProtocolChannel;
    use scriptrunner::runtime::executor::IsolatedRuntime;

    let channel = match ProtocolChannel::claim_stdout() {
        Ok(channel) => channel,
        Err(e) => {
            tracing::error!("Failed to claim the protocol channel: {}", e);
            return exit(EXIT_RUNTIME_UNAVAILABLE);
        }
    };

    let mut host = match PythonHost::new() {
        Ok(host) => host,
        Err(e) => {
            tracing::error!("Failed to initialize the interpreter: {}", e);
            return exit(EXIT_RUNTIME_UNAVAILABLE);
        }
    };
    let mut figures = PyplotRegistry::new();

    let report = IsolatedRuntime::default().run(&mut host, &mut figures, script_path);
    if let Err(e) = report.emit(channel) {
        tracing::error!("Failed to write the result document: {}", e);
        return exit(EXIT_RUNTIME_UNAVAILABLE);
    }
    exit(report.exit_code())
}

#[cfg(not(feature = "python"))]
fn run(script_path: &std::path::Path) -> ExitCode {
    tracing::error!(
        "Cannot run {}: built without an interpreter (enable the `python` feature)",
        script_path.display()
    );
    exit(EXIT_RUNTIME_UNAVAILABLE)
}

fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}
