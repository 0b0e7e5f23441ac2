//! `snap`: drive a coding agent through planned, resumable task pipelines.
//!
//! Sessions live under `.snap/sessions/<name>/`. `plan` turns requirements into
//! `TASK<n>.md` files; `run` takes each task through the ten-step pipeline.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snap::cancel::CancelToken;
use snap::cli::{App, PlanOptions, RunOptions};
use snap::error::is_cancelled;
use snap::exit_codes;
use snap::io::input::StdinLines;
use snap::io::output::{Output, Style};
use snap::logging;

#[derive(Parser)]
#[command(
    name = "snap",
    version,
    about = "Plan and run coding-agent task pipelines"
)]
struct Cli {
    /// Project root (default: current directory).
    #[arg(short = 'C', long = "dir", global = true, value_name = "PATH")]
    dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a session.
    New { name: String },
    /// List sessions with task counts and status.
    List,
    /// Delete a session and all of its files.
    Delete {
        name: String,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        force: bool,
    },
    /// Show a session's progress.
    Status { name: Option<String> },
    /// Gather requirements and generate task files.
    Plan {
        name: Option<String>,
        /// Read the brief from a file instead of asking interactively.
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,
        /// Discard existing planning artifacts without asking.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the task pipeline until every task is complete.
    Run {
        name: Option<String>,
        /// Discard saved progress first.
        #[arg(long)]
        fresh: bool,
        /// Print the saved workflow state and exit.
        #[arg(long)]
        show_state: bool,
        /// With --show-state, print raw JSON.
        #[arg(long, requires = "show_state")]
        json: bool,
        /// Run tasks from this directory instead of a session.
        #[arg(long, value_name = "DIR", conflicts_with = "name")]
        tasks_dir: Option<PathBuf>,
        /// PRD path (default: <tasks-dir>/PRD.md).
        #[arg(long, value_name = "FILE")]
        prd: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        // The signal handler already said "Stopped by user".
        if !is_cancelled(&err) {
            eprintln!("error: {err:#}");
        }
        std::process::exit(exit_codes::for_error(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
    let app = App::new(
        root,
        Output::stdout(),
        Style::detect(),
        CancelToken::new(),
        interactive,
    );

    match cli.command {
        Command::New { name } => app.new_session(&name),
        Command::List => app.list(),
        Command::Delete { name, force } => app.delete(&name, force, &mut io::stdin().lock()),
        Command::Status { name } => app.status(name.as_deref()),
        Command::Plan { name, from, force } => {
            let opts = PlanOptions { name, from, force };
            let agent = app.agent()?;
            // The lock is released before the line reader thread takes stdin.
            let target = app.prepare_plan(&opts, &mut io::stdin().lock())?;
            app.plan(&agent, &target, &mut StdinLines::stdin())
        }
        Command::Run {
            name,
            fresh,
            show_state,
            json,
            tasks_dir,
            prd,
        } => app.run(&RunOptions {
            name,
            fresh,
            show_state,
            json,
            tasks_dir,
            prd,
        }),
    }
}
