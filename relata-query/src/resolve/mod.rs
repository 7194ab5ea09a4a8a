//! Per-request execution: environments, the orchestrator and the assembler.

mod assemble;
mod env;
mod orchestrator;

pub use assemble::{DocumentAssembler, DocumentShape};
pub use env::{EnvData, EnvState, EnvTarget, ResolutionEnvironment, RootPlan, SharedConnection};
pub use orchestrator::TaskOrchestrator;
