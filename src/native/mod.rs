/// Native module contains the process-spawning implementation of the
/// `Sandbox` trait, talking to the runtime over pipes and signals only.
pub mod process;
pub mod sandbox;
