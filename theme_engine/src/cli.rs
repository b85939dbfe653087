use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Runs a theme script and reports the actor tree it builds", version)]
pub struct Args {
    /// Theme script to run (or check with --check)
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// JSON file with manager settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// metrics.ini or JSON metrics table exposed through THEME
    #[arg(long)]
    pub metrics: Option<PathBuf>,

    /// Theme directory used to resolve paths and textures (overrides --config)
    #[arg(long)]
    pub theme_root: Option<PathBuf>,

    /// Path to write the resolved actor tree as JSON
    #[arg(long)]
    pub tree_json: Option<PathBuf>,

    /// Only compile the script and print syntax diagnostics
    #[arg(long)]
    pub check: bool,

    /// Print the registered classes and their script methods
    #[arg(long)]
    pub list_classes: bool,

    /// Print every actor in the tree instead of a summary
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug)]
pub enum Command {
    ListClasses { verbose: bool },
    Check { script: PathBuf },
    Run(RunArgs),
}

#[derive(Debug)]
pub struct RunArgs {
    pub script: PathBuf,
    pub config: Option<PathBuf>,
    pub metrics: Option<PathBuf>,
    pub theme_root: Option<PathBuf>,
    pub tree_json: Option<PathBuf>,
    pub verbose: bool,
}

pub fn parse() -> Result<Command> {
    Args::parse().into_command()
}

impl Args {
    pub fn into_command(self) -> Result<Command> {
        if self.list_classes {
            return Ok(Command::ListClasses {
                verbose: self.verbose,
            });
        }
        let Some(script) = self.script else {
            bail!("--script is required unless --list-classes is given");
        };
        if self.check {
            if self.tree_json.is_some() {
                bail!("--tree-json cannot be combined with --check");
            }
            return Ok(Command::Check { script });
        }
        Ok(Command::Run(RunArgs {
            script,
            config: self.config,
            metrics: self.metrics,
            theme_root: self.theme_root,
            tree_json: self.tree_json,
            verbose: self.verbose,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(argv: &[&str]) -> Result<Command> {
        Args::try_parse_from(std::iter::once("theme_engine").chain(argv.iter().copied()))?
            .into_command()
    }

    #[test]
    fn script_is_required_for_runs() {
        assert!(command(&[]).is_err());
        assert!(matches!(
            command(&["--list-classes"]).expect("list"),
            Command::ListClasses { verbose: false }
        ));
    }

    #[test]
    fn check_rejects_tree_output() {
        assert!(command(&["--script", "a.lua", "--check", "--tree-json", "t.json"]).is_err());
        assert!(matches!(
            command(&["--script", "a.lua", "--check"]).expect("check"),
            Command::Check { .. }
        ));
    }

    #[test]
    fn run_carries_paths() {
        let Command::Run(run) = command(&["--script", "a.lua", "--theme-root", "themes/default"])
            .expect("run")
        else {
            panic!("expected a run command");
        };
        assert_eq!(run.script, PathBuf::from("a.lua"));
        assert_eq!(run.theme_root, Some(PathBuf::from("themes/default")));
        assert!(run.tree_json.is_none());
    }
}
