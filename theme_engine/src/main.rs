use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result};
use theme_engine::{ActorRegistry, ActorSnapshot, ManagerConfig, ScriptManager};
use theme_metrics::Metrics;

mod cli;
use cli::{Command, RunArgs};

fn main() -> Result<ExitCode> {
    env_logger::init();
    match cli::parse()? {
        Command::ListClasses { verbose } => {
            list_classes(verbose);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { script } => check(&script),
        Command::Run(args) => run(args),
    }
}

fn list_classes(verbose: bool) {
    let registry = ActorRegistry::global();
    let warnings = registry.ensure_initialized();
    for class in registry.class_names() {
        let Some(entry) = registry.class(class) else {
            continue;
        };
        let methods = registry.library(class).map(|lib| lib.len()).unwrap_or(0);
        match entry.parent() {
            Some(parent) => println!("{class} : {parent} ({methods} methods)"),
            None => println!("{class} ({methods} methods)"),
        }
        if verbose {
            if let Some(library) = registry.library(class) {
                let mut names: Vec<_> = library.names().collect();
                names.sort_unstable();
                println!("    {}", names.join(" "));
            }
        }
    }
    for name in registry.static_library_names() {
        let methods = registry.static_library(name).map(|lib| lib.len()).unwrap_or(0);
        println!("{name} [static] ({methods} functions)");
    }
    for warning in warnings {
        println!(
            "!! {}.{} -> {}: {}",
            warning.owner, warning.script_name, warning.host_name, warning.reason
        );
    }
}

fn check(script: &Path) -> Result<ExitCode> {
    let source = fs::read_to_string(script)
        .with_context(|| format!("reading script {}", script.display()))?;
    let manager = ScriptManager::new(ManagerConfig::default())?;
    let chunk = script.display().to_string();
    let diagnostics = manager.check(&source, &chunk);
    if diagnostics.is_empty() {
        println!("{chunk}: ok");
        return Ok(ExitCode::SUCCESS);
    }
    for diagnostic in &diagnostics {
        println!("{diagnostic}");
    }
    Ok(ExitCode::FAILURE)
}

fn run(args: RunArgs) -> Result<ExitCode> {
    let mut config = match args.config.as_deref() {
        Some(path) => ManagerConfig::from_json_file(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(root) = args.theme_root {
        config.theme_root = root;
    }
    config.verbose |= args.verbose;
    let verbose = config.verbose;

    let mut builder = ScriptManager::builder().config(config);
    if let Some(path) = args.metrics.as_deref() {
        let metrics = Metrics::load(path).context("loading theme metrics")?;
        builder = builder.metrics(Rc::new(metrics));
    }
    let manager = builder.build().context("starting script manager")?;

    let root = manager
        .run_file(&args.script)
        .with_context(|| format!("running {}", args.script.display()))?;
    let Some(root) = root else {
        println!("{} did not return an actor descriptor", args.script.display());
        return Ok(ExitCode::SUCCESS);
    };
    let snapshot = root.borrow().snapshot();

    if let Some(path) = args.tree_json.as_ref() {
        let json = serde_json::to_string_pretty(&snapshot)
            .context("serializing actor tree to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("writing actor tree JSON to {}", path.display()))?;
        println!("Saved actor tree JSON to {}", path.display());
    }
    describe_tree(&snapshot, verbose);
    Ok(ExitCode::SUCCESS)
}

fn describe_tree(snapshot: &ActorSnapshot, verbose: bool) {
    let nodes = snapshot.walk();
    println!("Actor tree: {} actors", nodes.len());
    for (depth, node) in nodes {
        if !verbose && depth > 1 {
            continue;
        }
        let label = if node.name.is_empty() {
            node.class.clone()
        } else {
            format!("{} ({})", node.class, node.name)
        };
        println!(
            "{:indent$}- {label} @ ({:.1}, {:.1}) size {:.0}x{:.0}{}",
            "",
            node.position.x,
            node.position.y,
            node.size.0,
            node.size.1,
            if node.visible { "" } else { " [hidden]" },
            indent = depth * 2
        );
    }
}
