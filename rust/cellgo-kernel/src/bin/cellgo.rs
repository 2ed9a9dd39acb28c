//! cellgo: run Go notebooks cell by cell.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cellgo_kernel::colors::{paint, status_label, Color};
use cellgo_kernel::config::CONFIG_FILE;
use cellgo_kernel::notebook::extract_cells;
use cellgo_kernel::{error_chain, CancelToken, ExecOutcome, KernelConfig, Session, StdioSink};
use cellgo_synth::{Assembler, Cell, DeclStore, LineOrigin};
use clap::{Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "cellgo", version, about = "Incremental Go notebooks")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of searching for cellgo.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every ```go block of a Markdown notebook in one session
    Run {
        #[arg()]
        notebook: PathBuf,

        /// Keep going after a cell fails
        #[arg(long)]
        keep_going: bool,
    },
    /// Start an interactive session
    Repl,
    /// Print the program generated for a single cell, with its line map
    Render {
        #[arg()]
        file: PathBuf,
    },
    /// Write a default cellgo.toml
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match KernelConfig::load_from(path) {
            Ok(config) => config,
            Err(err) => return fail(&err),
        },
        None => KernelConfig::load(),
    };
    init_tracing(cli.verbose, &config.log.filter);

    match cli.command {
        Commands::Run {
            notebook,
            keep_going,
        } => cmd_run(&notebook, keep_going, config),
        Commands::Repl => match cellgo_kernel::repl::run_repl(config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => fail(&err),
        },
        Commands::Render { file } => cmd_render(&file),
        Commands::Init => cmd_init(),
    }
}

/// `RUST_LOG` wins, then `--verbose`, then the config file.
fn init_tracing(verbose: bool, configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("cellgo=debug")
        } else {
            EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("cellgo=info"))
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(err: &dyn std::error::Error) -> ExitCode {
    eprintln!("{} {}", paint(Color::Red, "error:"), error_chain(err));
    ExitCode::FAILURE
}

fn read_source(path: &Path) -> Result<String, ExitCode> {
    std::fs::read_to_string(path).map_err(|err| {
        eprintln!(
            "{} cannot read '{}': {}",
            paint(Color::Red, "error:"),
            path.display(),
            err
        );
        ExitCode::FAILURE
    })
}

fn cmd_run(notebook: &Path, keep_going: bool, config: KernelConfig) -> ExitCode {
    let source = match read_source(notebook) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let cells = extract_cells(&source);
    if cells.is_empty() {
        eprintln!(
            "{} no ```go blocks in {}",
            paint(Color::Yellow, "warning:"),
            notebook.display()
        );
        return ExitCode::SUCCESS;
    }

    let mut session = match Session::new(config) {
        Ok(session) => session,
        Err(err) => return fail(&err),
    };
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(err) = ctrlc::set_handler(move || cancel.cancel()) {
            tracing::warn!(error = %err, "cannot install Ctrl-C handler");
        }
    }

    let mut failed = false;
    for cell in &cells {
        tracing::debug!(line = cell.fence_line, "running notebook cell");
        let outcome = match session.execute(&cell.code, &mut StdioSink, &cancel) {
            Ok(outcome) => outcome,
            Err(err) => return fail(&err),
        };
        if outcome == ExecOutcome::Cancelled {
            eprintln!("{}", status_label(Color::Yellow, "Cancelled"));
            return ExitCode::FAILURE;
        }
        if !outcome.is_success() {
            failed = true;
            eprintln!(
                "{} cell at {}:{}",
                status_label(Color::Red, "Failed"),
                notebook.display(),
                cell.fence_line
            );
            if !keep_going {
                break;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn cmd_render(file: &Path) -> ExitCode {
    let source = match read_source(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let cell = Cell::new(1, &source);
    let mut store = DeclStore::new();
    for decl in cell.declarations() {
        store.upsert(decl);
    }
    let assembly = Assembler::new(&store, cell.id).assemble(&cell, None);
    let width = assembly.len().to_string().len();
    for (idx, line) in assembly.lines.iter().enumerate() {
        let origin = match assembly.map.origin(idx) {
            LineOrigin::Cell(cell_line) => format!("{:>4}", cell_line + 1),
            LineOrigin::Synthetic => "   -".to_string(),
        };
        println!(
            "{:>width$} {} | {}",
            idx + 1,
            paint(Color::Gray, &origin),
            line
        );
    }
    ExitCode::SUCCESS
}

fn cmd_init() -> ExitCode {
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        eprintln!(
            "{} {CONFIG_FILE} already exists, not overwriting",
            paint(Color::Red, "error:")
        );
        return ExitCode::FAILURE;
    }
    if let Err(err) = std::fs::write(&path, KernelConfig::default_template()) {
        eprintln!("{} writing {CONFIG_FILE}: {err}", paint(Color::Red, "error:"));
        return ExitCode::FAILURE;
    }
    println!("{} {CONFIG_FILE}", status_label(Color::Green, "Created"));
    ExitCode::SUCCESS
}
