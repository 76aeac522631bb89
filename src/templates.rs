use anyhow::{Context as _, Result};
use minijinja::Environment;
use std::{fs, path::Path};
use tracing::info;

use crate::{errors::Errors, graph::Graph};

#[derive(Debug, Clone)]
pub struct RenderedTemplate {
    pub name: String,
    pub text: String,
}

/// Renders `src` with the resolved graph as context and writes `dst`.
/// Failures are reported into `errors`; nothing is written on failure.
pub fn render_template(graph: &Graph, src: &Path, dst: &Path, errors: &mut Errors) {
    info!("Rendering {} -> {}", src.display(), dst.display());

    let result = render_file(graph, src).and_then(|rendered| {
        write_result(dst, &rendered.text)
            .with_context(|| format!("failed to write {}", dst.display()))
    });

    if let Err(e) = result {
        errors.push(format!("Error rendering template {}: {e:#}", src.display()));
    }
}

pub fn render_file(graph: &Graph, src: &Path) -> Result<RenderedTemplate> {
    let source = fs::read_to_string(src)
        .with_context(|| format!("failed to read template file: {}", src.display()))?;

    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "template".to_string());

    let text = render_minijinja(&source, graph)
        .with_context(|| format!("render failed ({})", src.display()))?;

    Ok(RenderedTemplate { name, text })
}

fn render_minijinja(source: &str, graph: &Graph) -> Result<String> {
    let mut env = Environment::new();

    // Jinja-style `tojson`: any value as a JSON literal.
    env.add_filter("tojson", |v: minijinja::Value| -> Result<String, minijinja::Error> {
        serde_json::to_string(&v).map_err(|e| {
            minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
        })
    });

    env.add_template("tpl", source)?;
    let tpl = env.get_template("tpl")?;
    let ctx = minijinja::Value::from_serialize(graph);
    Ok(tpl.render(ctx)?)
}

/// Drops blank and whitespace-only lines before writing.
fn write_result(path: &Path, text: &str) -> Result<()> {
    let sane: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, sane.join("\n"))?;
    Ok(())
}
