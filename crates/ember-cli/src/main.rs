//! `ember` — CLI principal de la VM Ember
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation (logger,
//! couleur), et délégation à `ember_cli` (lib).

#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use ember_cli as cli;

#[cfg(feature = "color")]
use owo_colors::OwoColorize;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "ember", version, about = "Ember — assembler, désassembler, exécuter du bytecode", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux (casse la verbosité)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// Force la couleur (si la feature `color` est compilée)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,

    /// Sous-commandes
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Exécuter un programme (.emasm ou .embc)
    Run {
        /// Programme (ou - pour stdin, lu comme source assembleur)
        input: Option<PathBuf>,
        /// Trace la pile et chaque instruction pendant l'exécution
        #[arg(long)]
        trace: bool,
        /// Profondeur maximale de la pile d'opérandes
        #[arg(long = "stack-limit")]
        stack_limit: Option<usize>,
        /// Affiche la pile restante sur stderr après l'exécution
        #[arg(long = "dump-stack")]
        dump_stack: bool,
        /// Afficher le temps d'exécution
        #[arg(long)]
        time: bool,
    },

    /// Désassembler un programme vers du texte
    Disasm {
        /// Programme (.emasm ou .embc)
        input: Option<PathBuf>,
        /// Sortie texte (stdout si omis)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Assembler un source vers un conteneur binaire .embc
    Build {
        /// Source assembleur (ou - pour stdin)
        input: Option<PathBuf>,
        /// Fichier de sortie (même nom + .embc si omis)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Écrire le binaire sur stdout
        #[arg(long, conflicts_with = "output")]
        stdout: bool,
        /// Écraser le fichier de sortie
        #[arg(long)]
        overwrite: bool,
    },
}

// ──────────────────────────── Entrée / Sortie ────────────────────────────

fn input_from_opt(p: Option<PathBuf>) -> cli::Input {
    match p {
        Some(path) if path.as_os_str() == "-" => cli::Input::Stdin,
        Some(path) => cli::Input::Path(path),
        None => cli::Input::Stdin,
    }
}

fn output_from_opt(output: Option<PathBuf>) -> cli::Output {
    output.map_or(cli::Output::Stdout, cli::Output::Path)
}

// ──────────────────────────── Logger / Verbosité ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    #[cfg(feature = "trace")]
    {
        let level = if quiet {
            "error"
        } else {
            match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };
        std::env::set_var(
            "RUST_LOG",
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()),
        );
        cli::init_logger();
    }
    #[cfg(not(feature = "trace"))]
    {
        let _ = (verbose, quiet);
    }
}

fn init_color(choice: ColorChoice) {
    // `owo-colors` détecte le TTY ; on force seulement via les variables usuelles.
    match choice {
        ColorChoice::Auto => {},
        ColorChoice::Always => {
            std::env::set_var("CLICOLOR_FORCE", "1");
            std::env::remove_var("NO_COLOR");
        },
        ColorChoice::Never => {
            std::env::set_var("NO_COLOR", "1");
            std::env::remove_var("CLICOLOR_FORCE");
        },
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        #[cfg(feature = "color")]
        eprintln!("{} {:#}", "error:".red().bold(), e);
        #[cfg(not(feature = "color"))]
        eprintln!("error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn real_main() -> Result<()> {
    let opt = Opt::parse();

    init_color(opt.color);
    init_telemetry(opt.verbose, opt.quiet);

    use cli::{BuildTask, Command as C, DisasmTask, RunTask};

    let command = match opt.cmd {
        Command::Run { input, trace, stack_limit, dump_stack, time } => C::Run(RunTask {
            input: input_from_opt(input),
            trace,
            stack_limit,
            dump_stack,
            time,
        }),
        Command::Disasm { input, output } => {
            C::Disasm(DisasmTask { input: input_from_opt(input), output: output_from_opt(output) })
        },
        Command::Build { input, output, stdout, overwrite } => {
            let output = match output {
                Some(p) => cli::Output::Path(p),
                None if stdout => cli::Output::Stdout,
                None => cli::Output::Auto,
            };
            C::Build(BuildTask { input: input_from_opt(input), output, overwrite })
        },
    };

    cli::execute(command).context("échec d'exécution de la commande")
}
