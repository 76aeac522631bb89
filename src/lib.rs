pub mod cli;
pub mod cloud;
pub mod conditional;
pub mod config;
pub mod context;
pub mod defaults;
pub mod deps;
pub mod errors;
pub mod graph;
pub mod import;
pub mod load;
pub mod overrides;
pub mod prismarine;
pub mod report;
pub mod templates;
pub mod validate;

pub use config::ResourceGraph;
pub use context::DeploymentContext;
pub use deps::{plan_units, resolve as resolve_common_deps, UnitPlan};
pub use errors::{Errors, FatalError};
pub use graph::Graph;
pub use load::{load, LoadOptions, LoadOutcome};
