use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sbbal::config::{ConfigOverrides, ConfigScope, EntryState, Normalization};
use sbbal::diag::Diagnostic;
use sbbal::pipeline::{self, AnalysisState, PassId, PipelineError, PipelineOptions};
use sbbal::report;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitMode {
    Report,
    Json,
    States,
    Distill,
    Dot,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ScopeArg {
    Reset,
    Accumulate,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EntryArg {
    Empty,
    Zero,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum NormalizationArg {
    Shift,
    Absolute,
}

#[derive(Parser, Debug)]
#[command(
    name = "sbbal",
    version,
    about = "Stream-port balance analyzer: checks whether SB_WAIT can observe balanced ports"
)]
struct Cli {
    /// Input .sbg source file
    source: PathBuf,

    /// Function to analyze
    #[arg(long, default_value = "main")]
    function: String,

    /// Number of hardware ports (overrides `set ports`)
    #[arg(long)]
    ports: Option<usize>,

    /// Bytes per stream element (overrides `set word_size`)
    #[arg(long)]
    word_size: Option<i64>,

    /// Block visits before giving up (overrides `set max_iterations`)
    #[arg(long)]
    max_iterations: Option<usize>,

    /// What a later SB_CONFIG() does to accumulated imbalance
    #[arg(long, value_enum)]
    config_scope: Option<ScopeArg>,

    /// State entering the entry block
    #[arg(long, value_enum)]
    entry: Option<EntryArg>,

    /// Port vector normalization
    #[arg(long, value_enum)]
    normalization: Option<NormalizationArg>,

    /// Output mode
    #[arg(long, value_enum, default_value_t = EmitMode::Report)]
    emit: EmitMode,

    /// Write output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print pass timing and analysis progress
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port_count: self.ports,
            word_size: self.word_size,
            max_iterations: self.max_iterations,
            config_scope: self.config_scope.map(|s| match s {
                ScopeArg::Reset => ConfigScope::Reset,
                ScopeArg::Accumulate => ConfigScope::Accumulate,
            }),
            entry_state: self.entry.map(|e| match e {
                EntryArg::Empty => EntryState::Empty,
                EntryArg::Zero => EntryState::Zero,
            }),
            normalization: self.normalization.map(|n| match n {
                NormalizationArg::Shift => Normalization::ShiftInvariant,
                NormalizationArg::Absolute => Normalization::Absolute,
            }),
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_diagnostics(file: &str, source: &str, diags: &[Diagnostic]) {
    for diag in diags {
        eprintln!("sbbal: {}", diag.render(file, source));
    }
}

/// Render the requested output, or `None` when the needed artifacts are missing.
fn render(cli: &Cli, state: &AnalysisState) -> Result<Option<String>, String> {
    match cli.emit {
        EmitMode::Report => Ok(report::build_report(state).map(|r| report::render_text(&r))),
        EmitMode::Json => match report::build_report(state) {
            Some(r) => report::render_json(&r).map(Some).map_err(|e| e.to_string()),
            None => Ok(None),
        },
        EmitMode::States => Ok(state.module.as_ref().and_then(|module| {
            let func = module.function(&cli.function)?;
            let analysis = state.analysis.as_ref()?;
            Some(report::render_states(func, analysis))
        })),
        EmitMode::Distill => Ok(state.module.as_ref().and_then(|module| {
            let func = module.function(&cli.function)?;
            let labeling = sbbal::label::label_blocks(func);
            Some(report::render_distill(func, &labeling))
        })),
        EmitMode::Dot => Ok(state.module.as_ref().and_then(|module| {
            let func = module.function(&cli.function)?;
            let labeling = sbbal::label::label_blocks(func);
            Some(sbbal::dot::emit_dot(func, &labeling))
        })),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file = cli.source.display().to_string();
    let mut state = match pipeline::load(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("sbbal: error: {e}");
            return ExitCode::from(2);
        }
    };

    let options = PipelineOptions {
        function: cli.function.clone(),
        overrides: cli.overrides(),
    };
    // Distill and dot modes list the graph without running the fixpoint.
    let terminal = match cli.emit {
        EmitMode::Distill | EmitMode::Dot => PassId::Configure,
        _ => PassId::Analyze,
    };
    let outcome = pipeline::run_pipeline(&mut state, terminal, &options);
    print_diagnostics(&file, &state.source, &state.diagnostics);

    if let Err(e) = &outcome {
        match e {
            PipelineError::Analysis(err) => eprintln!("sbbal: error: {err}"),
            PipelineError::Diagnostics { failing_pass } => {
                eprintln!("sbbal: {} failed", failing_pass.name())
            }
        }
        return ExitCode::from(1);
    }

    let output = match render(&cli, &state) {
        Ok(Some(text)) => text,
        Ok(None) => {
            eprintln!("sbbal: error: function `{}` not found", cli.function);
            return ExitCode::from(1);
        }
        Err(e) => {
            eprintln!("sbbal: error: {e}");
            return ExitCode::from(2);
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &output) {
                eprintln!("sbbal: error: {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        }
        None => print!("{output}"),
    }

    if state.has_errors() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
