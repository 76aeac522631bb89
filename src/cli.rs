use anyhow::{Context as _, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::context::{parse_override_arg, DeploymentContext};

#[derive(Parser, Debug)]
#[command(name = "samgraph", version, about)]
pub struct Args {
    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load, resolve and validate a resources directory, then print the graph
    Generate(GenerateArgs),

    /// Look at pieces of an application without loading the whole graph
    #[command(subcommand)]
    Inspect(InspectCommand),

    /// Print every deployable unit with its shared-module closure
    Plan(PlanArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ContextArgs {
    /// Deployment environment used by conditional keys
    #[arg(long)]
    pub environment: Option<String>,

    /// Target region used by conditional keys
    #[arg(long)]
    pub region: Option<String>,

    /// YAML file with environment, region and overrides
    #[arg(long)]
    pub context_file: Option<PathBuf>,

    /// Override a graph value: PATH=VALUE (repeatable, path split on / or .)
    #[arg(long = "override", value_name = "PATH=VALUE")]
    pub overrides: Vec<String>,

    /// Extra search directory for model packages (repeatable)
    #[arg(long = "path")]
    pub search_paths: Vec<PathBuf>,
}

impl ContextArgs {
    /// Context file first, flags on top.
    pub fn deployment_context(&self) -> Result<DeploymentContext> {
        let mut ctx = match &self.context_file {
            Some(p) => DeploymentContext::from_file(p)?,
            None => DeploymentContext::new(),
        };

        if let Some(env) = &self.environment {
            ctx = ctx.with_environment(env.clone());
        }
        if let Some(region) = &self.region {
            ctx = ctx.with_region(region.clone());
        }
        for raw in &self.overrides {
            let (path, value) = parse_override_arg(raw)
                .with_context(|| format!("invalid --override '{raw}'"))?;
            ctx = ctx.with_override(path, value);
        }

        Ok(ctx)
    }
}

#[derive(ClapArgs, Debug)]
pub struct GenerateArgs {
    /// Directory holding resources.yaml
    pub dir: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,

    /// Render a template with the graph: SRC:DST (repeatable)
    #[arg(long = "template", value_name = "SRC:DST")]
    pub templates: Vec<String>,

    /// Cloud facts file; enables enrichment and prerequisite checks
    #[arg(long)]
    pub cloud_facts: Option<PathBuf>,

    /// Print a report to stderr after loading
    #[arg(long, value_enum, default_value_t = ReportMode::Off)]
    pub report: ReportMode,
}

#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// Shared modules a unit directory depends on, transitively
    CommonDeps {
        /// Shared-module root
        #[arg(long, default_value = "common")]
        common_dir: PathBuf,

        unit_dir: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
pub struct PlanArgs {
    pub dir: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Shared-module root, relative to DIR unless absolute
    #[arg(long, default_value = "common")]
    pub common_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportMode {
    Off,
    Summary,
    Full,
}

/// Splits `SRC:DST`.
pub fn parse_template_arg(raw: &str) -> Result<(PathBuf, PathBuf)> {
    let Some((src, dst)) = raw.split_once(':') else {
        anyhow::bail!("expected SRC:DST, got '{raw}'");
    };
    if src.is_empty() || dst.is_empty() {
        anyhow::bail!("expected SRC:DST, got '{raw}'");
    }
    Ok((PathBuf::from(src), PathBuf::from(dst)))
}
