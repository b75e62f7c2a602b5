//! cvshist - CVS history reconstruction
//!
//! Reads per-file CVS history as JSON lines and writes the reconstructed
//! repository history (commits, branch and tag creations) as JSON lines.
//!
//! ## Commands
//!
//! - `convert`: run the conversion passes, optionally resuming
//! - `passes`: list the conversion passes

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use cvshist_core::{
    ConversionOptions, JsonLinesSink, JsonLinesSource, OutputSink, PassManager, RunSummary,
    SymbolDefault,
};
use cvshist_core::telemetry::{init_tracing, LogFormat};
use cvshist_state::FsArtifactStore;

#[derive(Parser)]
#[command(name = "cvshist")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reconstruct changesets and branch/tag topology from CVS history", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a revision dump into a history event stream
    Convert(ConvertArgs),

    /// List the conversion passes
    Passes,
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Revision dump, one JSON-encoded file per line
    input: PathBuf,

    /// Where to write output events (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML options file
    #[arg(long, env = "CVSHIST_OPTIONS")]
    options: Option<PathBuf>,

    /// Directory holding committed pass artifacts; required to resume
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// First pass to run, by number or name
    #[arg(long)]
    start_pass: Option<String>,

    /// Last pass to run, by number or name
    #[arg(long)]
    end_pass: Option<String>,

    /// heuristic, strict, branch or tag
    #[arg(long)]
    symbol_default: Option<SymbolDefault>,

    /// Convert matching symbols as branches (regex, repeatable)
    #[arg(long = "force-branch")]
    force_branch: Vec<String>,

    /// Convert matching symbols as tags (regex, repeatable)
    #[arg(long = "force-tag")]
    force_tag: Vec<String>,

    /// Leave matching symbols out of the conversion (regex, repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Symbol hints file to read
    #[arg(long)]
    symbol_hints: Option<PathBuf>,

    /// Write the resolved symbol hints here
    #[arg(long)]
    write_symbol_hints: Option<PathBuf>,

    /// Commit window in seconds
    #[arg(long)]
    commit_window: Option<i64>,

    /// Convert trunk only
    #[arg(long)]
    trunk_only: bool,

    /// Keep vendor branches that only hold an initial import
    #[arg(long)]
    keep_trivial_imports: bool,

    /// Allow a changeset to span several lines of development
    #[arg(long)]
    cross_branch_commits: bool,

    /// Keep intermediate artifacts after their last use
    #[arg(long)]
    keep_artifacts: bool,

    /// Print the run summary as JSON to stderr
    #[arg(long)]
    summary: bool,
}

impl ConvertArgs {
    /// Options file (if any) with command-line overrides applied.
    fn conversion_options(&self) -> Result<ConversionOptions> {
        let mut options = match &self.options {
            Some(path) => ConversionOptions::load(path)
                .with_context(|| format!("Failed to load options from {}", path.display()))?,
            None => ConversionOptions::default(),
        };

        if let Some(default) = self.symbol_default {
            options.symbol_default = default;
        }
        options.force_branch.extend(self.force_branch.iter().cloned());
        options.force_tag.extend(self.force_tag.iter().cloned());
        options.exclude.extend(self.exclude.iter().cloned());
        if let Some(path) = &self.symbol_hints {
            options.symbol_hints = Some(path.clone());
        }
        if let Some(path) = &self.write_symbol_hints {
            options.write_symbol_hints = Some(path.clone());
        }
        if let Some(secs) = self.commit_window {
            options.commit_window_secs = secs;
        }
        options.trunk_only |= self.trunk_only;
        options.keep_trivial_imports |= self.keep_trivial_imports;
        options.cross_branch_commits |= self.cross_branch_commits;
        options.keep_artifacts |= self.keep_artifacts;

        options.validate().context("Invalid conversion options")?;
        Ok(options)
    }

    /// Resolve the 1-based pass range.
    fn pass_range(&self, manager: &PassManager) -> Result<(usize, usize)> {
        let start = match &self.start_pass {
            Some(pass) => manager.pass_number(pass)?,
            None => 1,
        };
        let end = match &self.end_pass {
            Some(pass) => manager.pass_number(pass)?,
            None => manager.len(),
        };
        if start > end {
            bail!("start pass {start} comes after end pass {end}");
        }
        Ok((start, end))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    match cli.command {
        Commands::Convert(args) => cmd_convert(&args),
        Commands::Passes => cmd_passes(),
    }
}

fn cmd_convert(args: &ConvertArgs) -> Result<()> {
    let options = args.conversion_options()?;
    let manager = PassManager::standard();
    let (start, end) = args.pass_range(&manager)?;

    if start > 1 && args.state_dir.is_none() {
        bail!("--state-dir is required to resume from pass {start}");
    }

    // Without a state dir the artifacts live only for this run.
    let scratch;
    let state_dir: &Path = match &args.state_dir {
        Some(dir) => dir,
        None => {
            scratch = tempfile::tempdir().context("Failed to create scratch state directory")?;
            scratch.path()
        }
    };
    let store = FsArtifactStore::new(state_dir)
        .with_context(|| format!("Failed to open state directory {}", state_dir.display()))?;
    let source = JsonLinesSource::new(&args.input);

    let summary = match &args.output {
        Some(path) => {
            let mut sink = JsonLinesSink::create(path)
                .with_context(|| format!("Failed to create output {}", path.display()))?;
            run(&manager, &store, &options, &source, &mut sink, start, end)?
        }
        None => {
            let mut sink = JsonLinesSink::new(std::io::stdout());
            run(&manager, &store, &options, &source, &mut sink, start, end)?
        }
    };

    info!(
        run_id = %summary.run_id,
        passes = summary.passes.len(),
        "conversion finished"
    );
    if args.summary {
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn run(
    manager: &PassManager,
    store: &FsArtifactStore,
    options: &ConversionOptions,
    source: &JsonLinesSource,
    sink: &mut dyn OutputSink,
    start: usize,
    end: usize,
) -> Result<RunSummary> {
    manager
        .run(store, options, source, sink, start, end)
        .with_context(|| format!("Conversion failed in passes {start}..={end}"))
}

fn cmd_passes() -> Result<()> {
    let manager = PassManager::standard();
    for (number, pass) in manager.iter() {
        println!("{number:>2}  {:<24} {}", pass.name(), pass.description());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> ConvertArgs {
        let mut argv = vec!["cvshist", "convert"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Commands::Convert(args) => args,
            Commands::Passes => panic!("expected convert"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_options_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.toml");
        std::fs::write(
            &path,
            "commit_window_secs = 60\nexclude = [\"^TMP_\"]\nsymbol_default = \"strict\"\n",
        )
        .unwrap();

        let args = parse(&[
            "dump.jsonl",
            "--options",
            path.to_str().unwrap(),
            "--exclude",
            "^OLD_",
            "--symbol-default",
            "branch",
            "--trunk-only",
        ]);
        let options = args.conversion_options().unwrap();
        assert_eq!(options.commit_window_secs, 60);
        assert_eq!(options.exclude, vec!["^TMP_", "^OLD_"]);
        assert_eq!(options.symbol_default, SymbolDefault::Branch);
        assert!(options.trunk_only);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let args = parse(&["dump.jsonl", "--force-tag", "("]);
        assert!(args.conversion_options().is_err());
    }

    #[test]
    fn test_pass_range_accepts_names() {
        let manager = PassManager::standard();
        let args = parse(&["dump.jsonl", "--start-pass", "classify-symbols", "--end-pass", "6"]);
        assert_eq!(args.pass_range(&manager).unwrap(), (4, 6));

        let args = parse(&["dump.jsonl", "--start-pass", "output", "--end-pass", "1"]);
        assert!(args.pass_range(&manager).is_err());
    }

    #[test]
    fn test_convert_writes_event_stream() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dump.jsonl");
        let output = dir.path().join("events.jsonl");
        std::fs::write(
            &input,
            concat!(
                r#"{"path":"a.c","symbols":[["REL_1","1.1"]],"revisions":["#,
                r#"{"number":"1.1","timestamp":100,"author":"ann","log":"start"}]}"#,
                "\n"
            ),
        )
        .unwrap();

        let args = parse(&[
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--state-dir",
            dir.path().join("state").to_str().unwrap(),
        ]);
        cmd_convert(&args).unwrap();

        let events = std::fs::read_to_string(&output).unwrap();
        let kinds: Vec<String> = events
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds, vec!["commit", "create_symbol"]);
    }

    #[test]
    fn test_resume_requires_state_dir() {
        let args = parse(&["dump.jsonl", "--start-pass", "3"]);
        let err = cmd_convert(&args).unwrap_err();
        assert!(err.to_string().contains("--state-dir"));
    }
}
