//! ember-cli — bibliothèque interne du binaire `ember`
//!
//! But : fournir une API **testable** pour le CLI sans mélanger la logique
//! d'E/S et le parsing d'arguments (laissé à `main.rs`).
//!
//! Points clés :
//! - Chargement d'un chunk depuis un source assembleur (`.emasm`, stdin) ou
//!   un conteneur binaire (`.embc`), validé avant usage
//! - Sous-commandes `run`, `disasm`, `build`
//! - Traces (`feature = "trace"`) et couleurs (`feature = "color"`) optionnelles

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::{
    fs,
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{anyhow, Context, Result};
use ember_core::{asm::assemble, disasm::disassemble_chunk, helpers::validate_chunk, Chunk};
use ember_vm::{Vm, VmConfig};

#[cfg(feature = "color")]
use owo_colors::OwoColorize;

/// Extension des conteneurs binaires.
pub const BYTECODE_EXT: &str = "embc";

// ───────────────────────────── Types publics ─────────────────────────────

/// Commande haut-niveau (sans parsing CLI — réservé à main.rs).
#[derive(Clone, Debug)]
pub enum Command {
    /// Charge un chunk et l'exécute dans une VM neuve.
    Run(RunTask),
    /// Désassemble un chunk.
    Disasm(DisasmTask),
    /// Assemble un source vers un conteneur binaire.
    Build(BuildTask),
}

/// Paramètres de `run`.
#[derive(Clone, Debug, Default)]
pub struct RunTask {
    /// Programme à charger.
    pub input: Input,
    /// Trace pile + instruction avant chaque pas.
    pub trace: bool,
    /// Profondeur maximale de pile.
    pub stack_limit: Option<usize>,
    /// Affiche la pile restante (stderr) après l'exécution.
    pub dump_stack: bool,
    /// Afficher le temps d'exécution.
    pub time: bool,
}

/// Paramètres de `disasm`.
#[derive(Clone, Debug, Default)]
pub struct DisasmTask {
    /// Chunk à désassembler.
    pub input: Input,
    /// Fichier ou stdout.
    pub output: Output,
}

/// Paramètres de `build`.
#[derive(Clone, Debug, Default)]
pub struct BuildTask {
    /// Source assembleur.
    pub input: Input,
    /// Fichier `.embc`, stdout, ou même nom + `.embc`.
    pub output: Output,
    /// Autorise l'écrasement.
    pub overwrite: bool,
}

/// Entrée : fichier ou `-` (=stdin, toujours lu comme source assembleur).
#[derive(Clone, Debug, Default)]
pub enum Input {
    /// Chemin sur disque.
    Path(PathBuf),
    /// Entrée standard.
    #[default]
    Stdin,
}

/// Sortie générique.
#[derive(Clone, Debug, Default)]
pub enum Output {
    /// Chemin sur disque.
    Path(PathBuf),
    /// Sortie standard.
    #[default]
    Stdout,
    /// Pour build : même nom + `.embc`.
    Auto,
}

// ───────────────────────────── Initialisation ─────────────────────────────

/// Initialise le logger selon la feature `trace`.
pub fn init_logger() {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .format_timestamp_secs()
            .try_init();
    }
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute une commande. Toute erreur (chargement, exécution, E/S) remonte
/// en `Err` ; `main` la traduit en code de sortie 1.
pub fn execute(cmd: Command) -> Result<()> {
    match cmd {
        Command::Run(t) => run_entry(&t),
        Command::Disasm(t) => disasm_entry(&t),
        Command::Build(t) => build_entry(&t),
    }
}

/// Charge un chunk : conteneur binaire si l'extension est `.embc`, source
/// assembleur sinon. Le chunk est validé structurellement.
pub fn load_chunk(input: &Input) -> Result<Chunk> {
    let chunk = match input {
        Input::Path(p) if is_bytecode(p) => {
            let bytes = fs::read(p).with_context(|| format!("lecture bytecode: {}", display(p)))?;
            Chunk::from_bytes(&bytes).with_context(|| format!("chargement échoué: {}", display(p)))?
        },
        Input::Path(p) => {
            let src = read_source(input)?;
            let name = p.file_stem().and_then(|s| s.to_str()).unwrap_or("main");
            assemble(&src, name).with_context(|| format!("assemblage: {}", display(p)))?
        },
        Input::Stdin => {
            let src = read_source(input)?;
            assemble(&src, "main").context("assemblage: <stdin>")?
        },
    };
    validate_chunk(&chunk).with_context(|| format!("chunk invalide: {}", chunk.name()))?;
    log::debug!("chunk `{}` chargé ({} octets, {} constantes)", chunk.name(), chunk.len(), chunk.constants().len());
    Ok(chunk)
}

fn run_entry(task: &RunTask) -> Result<()> {
    let chunk = load_chunk(&task.input)?;
    let config = VmConfig { trace_execution: task.trace, stack_limit: task.stack_limit };
    let mut vm = Vm::with_config(config);

    let start = Instant::now();
    let outcome = vm.interpret(chunk);
    let elapsed = start.elapsed();

    if task.dump_stack {
        eprint!("{}", vm.trace());
    }
    if task.time {
        status_info("TIME", &format!("run: {} µs", elapsed.as_micros()));
    }

    outcome.context("exécution interrompue")?;
    Ok(())
}

fn disasm_entry(task: &DisasmTask) -> Result<()> {
    let chunk = load_chunk(&task.input)?;
    let text = disassemble_chunk(&chunk)?;
    match task.output {
        Output::Stdout => {
            let mut w = BufWriter::new(io::stdout().lock());
            w.write_all(text.as_bytes())?;
            w.flush()?;
        },
        Output::Path(ref p) => {
            write_bytes(p, text.as_bytes())?;
            status_ok("DISASM", &display(p));
        },
        Output::Auto => anyhow::bail!("Output::Auto n'est pas valide pour disasm"),
    }
    Ok(())
}

fn build_entry(task: &BuildTask) -> Result<()> {
    let chunk = load_chunk(&task.input)?;
    let bytes = chunk.to_bytes().context("encodage du conteneur")?;

    let out_path = match (&task.output, &task.input) {
        (Output::Auto, Input::Path(p)) => default_bytecode_path(p),
        (Output::Auto, Input::Stdin) => PathBuf::from(format!("out.{BYTECODE_EXT}")),
        (Output::Path(p), _) => p.clone(),
        (Output::Stdout, _) => {
            let mut w = BufWriter::new(io::stdout().lock());
            w.write_all(&bytes)?;
            w.flush()?;
            return Ok(());
        },
    };

    if out_path.exists() && !task.overwrite {
        return Err(anyhow!("fichier de sortie existe déjà: {}", display(&out_path)));
    }
    write_bytes(&out_path, &bytes).with_context(|| format!("écriture de {}", display(&out_path)))?;
    status_ok("BUILD", &format!("{} ({} octets)", display(&out_path), bytes.len()));
    Ok(())
}

// ───────────────────────────── Utilitaires E/S ─────────────────────────────

fn read_source(input: &Input) -> Result<String> {
    let mut s = String::new();
    match input {
        Input::Stdin => {
            io::stdin().read_to_string(&mut s)?;
        },
        Input::Path(p) => {
            File::open(p)
                .with_context(|| format!("ouverture: {}", display(p)))?
                .read_to_string(&mut s)?;
        },
    }
    Ok(s)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(bytes)?;
    w.flush()?;
    Ok(())
}

fn is_bytecode(p: &Path) -> bool {
    p.extension().and_then(|e| e.to_str()) == Some(BYTECODE_EXT)
}

fn default_bytecode_path(src: &Path) -> PathBuf {
    src.with_extension(BYTECODE_EXT)
}

fn display(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

// ───────────────────────────── Sorties jolies ─────────────────────────────

fn status_ok(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.green().bold(), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

fn status_info(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.blue().bold(), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::Value;
    use pretty_assertions::assert_eq;

    const PROGRAM: &str = "; 10 + 10\nCONST 10\nCONST 10\nADD\nRETURN\n";

    #[test]
    fn build_then_load_binary() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("sum.emasm");
        fs::write(&src, PROGRAM).unwrap();

        build_entry(&BuildTask { input: Input::Path(src.clone()), output: Output::Auto, overwrite: false })
            .unwrap();
        let bin = dir.path().join("sum.embc");
        assert!(bin.exists());

        let from_src = load_chunk(&Input::Path(src)).unwrap();
        let from_bin = load_chunk(&Input::Path(bin.clone())).unwrap();
        assert_eq!(from_bin, from_src);
        assert_eq!(from_bin.name(), "sum");
        assert_eq!(from_bin.constants(), &[Value::Int(10), Value::Int(10)]);

        let again = BuildTask { input: Input::Path(dir.path().join("sum.emasm")), output: Output::Path(bin), overwrite: false };
        assert!(build_entry(&again).is_err());
    }

    #[test]
    fn disasm_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("main.emasm");
        fs::write(&src, PROGRAM).unwrap();
        let out = dir.path().join("listing").join("main.txt");

        disasm_entry(&DisasmTask { input: Input::Path(src), output: Output::Path(out.clone()) }).unwrap();
        let text = fs::read_to_string(out).unwrap();
        assert_eq!(
            text,
            "=== main ===\n00000000 CONST [0]; 10\n00000002 CONST [1]; 10\n00000004 ADD\n00000005 RETURN\n"
        );
    }

    #[test]
    fn invalid_chunks_are_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("bad.emasm");
        fs::write(&src, "CONST [4]\nRETURN\n").unwrap();
        let err = load_chunk(&Input::Path(src)).unwrap_err();
        assert!(format!("{err:#}").contains("constant index 4 out of range"), "{err:#}");
    }

    #[test]
    fn failed_runs_surface_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("ok.emasm");
        fs::write(&ok, PROGRAM).unwrap();
        let bad = dir.path().join("div0.emasm");
        fs::write(&bad, "CONST 1\nCONST 0\nDIV\nRETURN\n").unwrap();

        let run = |path: PathBuf| execute(Command::Run(RunTask { input: Input::Path(path), ..RunTask::default() }));
        assert!(run(ok).is_ok());
        let err = run(bad).unwrap_err();
        assert!(format!("{err:#}").contains("division by zero"), "{err:#}");
    }

    #[test]
    fn default_paths() {
        let out = default_bytecode_path(Path::new("src/main.emasm"));
        assert_eq!(out, PathBuf::from("src/main.embc"));
    }
}
