use anyhow::{Context as _, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use samgraph::{
    cli::{self, Args, Command, GenerateArgs, InspectCommand, OutputFormat, PlanArgs, ReportMode},
    cloud::{self, StaticProbe},
    config::ResourceGraph,
    deps, templates, DeploymentContext, Errors, FatalError, LoadOptions, LoadOutcome,
};

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "samgraph=debug" } else { "samgraph=info" };

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn run(args: Args) -> Result<ExitCode> {
    match args.command {
        Command::Generate(g) => generate(g),
        Command::Inspect(InspectCommand::CommonDeps { common_dir, unit_dir }) => {
            let mut errors = Errors::new();
            for name in deps::resolve(&common_dir, &unit_dir, &mut errors) {
                println!("* {name}");
            }
            Ok(finish(&errors))
        }
        Command::Plan(p) => plan(p),
    }
}

fn load_with(
    dir: &std::path::Path,
    ctx: DeploymentContext,
    search_paths: &[std::path::PathBuf],
) -> Result<LoadOutcome> {
    let mut opts = LoadOptions::new(dir, ctx);
    for p in search_paths {
        opts = opts.with_search_path(p);
    }
    Ok(samgraph::load(&opts))
}

fn generate(g: GenerateArgs) -> Result<ExitCode> {
    let ctx = g.context.deployment_context()?;
    let environment = ctx.environment().map(str::to_string);

    let (mut graph, mut errors) = match load_with(&g.dir, ctx, &g.context.search_paths)? {
        LoadOutcome::Loaded { graph, errors } => (graph, errors),
        LoadOutcome::Fatal { errors } => return Ok(fatal(errors)),
    };

    if let Some(facts) = &g.cloud_facts {
        let probe = StaticProbe::from_file(facts)?;
        cloud::enrich(&mut graph, &probe, &mut errors);

        match environment.as_deref() {
            Some(env) => cloud::check_prerequisites(&graph, env, &probe, &mut errors),
            None => warn!("no environment given, skipping cloud prerequisite checks"),
        }
    }

    for raw in &g.templates {
        let (src, dst) = cli::parse_template_arg(raw)?;
        templates::render_template(&graph, &src, &dst, &mut errors);
    }

    let text = match g.format {
        OutputFormat::Yaml => serde_yaml::to_string(&graph).context("serialize graph as YAML")?,
        OutputFormat::Json => {
            let mut s = serde_json::to_string_pretty(&graph).context("serialize graph as JSON")?;
            s.push('\n');
            s
        }
    };
    print!("{text}");

    if g.report != ReportMode::Off {
        eprint!("{}", samgraph::report::build_report(&graph, &errors, g.report));
    }

    Ok(finish(&errors))
}

fn plan(p: PlanArgs) -> Result<ExitCode> {
    let (graph, mut errors) = match load_with(&p.dir, p.context.deployment_context()?, &p.context.search_paths)? {
        LoadOutcome::Loaded { graph, errors } => (graph, errors),
        LoadOutcome::Fatal { errors } => return Ok(fatal(errors)),
    };

    let shared_root = p.dir.join(&p.common_dir);
    match ResourceGraph::from_graph(&graph) {
        Ok(rg) => {
            for unit in deps::plan_units(&p.dir, &shared_root, &rg, &mut errors) {
                println!("{}", unit.name);
                println!("  source: {}", unit.source_dir.display());
                for m in &unit.shared_modules {
                    println!("  * {m}");
                }
            }
        }
        Err(e) => errors.push(format!("Cannot plan units: {e:#}")),
    }

    Ok(finish(&errors))
}

fn finish(errors: &Errors) -> ExitCode {
    if errors.is_empty() {
        info!("Done");
        return ExitCode::SUCCESS;
    }

    eprint!("{}", errors.closing_report());
    ExitCode::from(1)
}

fn fatal(errors: Errors) -> ExitCode {
    eprint!("{errors}");
    eprintln!("{}", FatalError { errors });
    ExitCode::from(2)
}
