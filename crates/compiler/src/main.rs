//! Lumen Compiler CLI
//!
//! Compiles AST documents produced by the external front end into `.lbc`
//! bytecode files, disassembles them, and runs them on the bundled VM.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use lumen_core::Chunk;
use lumenc::{CompilerConfig, DiagnosticSink, ast::Program, compile};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "lumenc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lumen compiler - compile AST documents to register bytecode", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an AST document (JSON) to a .lbc bytecode file
    Build {
        /// Input AST document (.json)
        input: PathBuf,

        /// Output bytecode path (defaults to the input with a .lbc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compile the unit in strict mode
        #[arg(long)]
        strict: bool,

        /// Print the disassembly after compiling
        #[arg(long)]
        disasm: bool,
    },

    /// Disassemble a compiled .lbc file (or compile-and-disassemble an AST)
    Disasm {
        /// Input .lbc bytecode file or AST document
        input: PathBuf,
    },

    /// Compile (if needed) and execute on the bundled VM
    Run {
        /// Input .lbc bytecode file or AST document
        input: PathBuf,

        /// Compile the unit in strict mode
        #[arg(long)]
        strict: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Build {
            input,
            output,
            strict,
            disasm,
        } => cmd_build(&input, output, strict, disasm),
        Commands::Disasm { input } => cmd_disasm(&input),
        Commands::Run { input, strict } => cmd_run(&input, strict),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "lumenc", &mut io::stdout());
            Ok(())
        }
    };
    if let Err(message) = result {
        eprintln!("error: {}", message);
        process::exit(1);
    }
}

fn load_ast(path: &Path) -> Result<Program, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid AST document: {}", e))
}

fn load_chunk(path: &Path) -> Result<Chunk, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    bincode::deserialize(&bytes).map_err(|e| format!("invalid bytecode file: {}", e))
}

fn is_bytecode(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "lbc")
}

fn compile_ast_file(path: &Path, strict: bool) -> Result<Chunk, String> {
    let program = load_ast(path)?;
    let config = CompilerConfig::default().strict(strict);
    let mut sink = DiagnosticSink::new();
    match compile(&program, &config, &mut sink) {
        Some(chunk) => {
            for diagnostic in sink.diagnostics() {
                eprintln!("{}", diagnostic);
            }
            Ok(chunk)
        }
        None => {
            for diagnostic in sink.diagnostics() {
                eprintln!("{}", diagnostic);
            }
            Err(format!(
                "compilation failed with {} error(s)",
                sink.error_count()
            ))
        }
    }
}

fn load_or_compile(path: &Path, strict: bool) -> Result<Chunk, String> {
    if is_bytecode(path) {
        load_chunk(path)
    } else {
        compile_ast_file(path, strict)
    }
}

fn cmd_build(
    input: &Path,
    output: Option<PathBuf>,
    strict: bool,
    disasm: bool,
) -> Result<(), String> {
    let chunk = compile_ast_file(input, strict)?;
    let output = output.unwrap_or_else(|| input.with_extension("lbc"));
    let bytes =
        bincode::serialize(&chunk).map_err(|e| format!("failed to encode bytecode: {}", e))?;
    std::fs::write(&output, bytes)
        .map_err(|e| format!("failed to write {}: {}", output.display(), e))?;
    if disasm {
        print!("{}", chunk.disassemble("<script>"));
    }
    println!("wrote {}", output.display());
    Ok(())
}

fn cmd_disasm(input: &Path) -> Result<(), String> {
    let chunk = load_or_compile(input, false)?;
    print!("{}", chunk.disassemble("<script>"));
    Ok(())
}

fn cmd_run(input: &Path, strict: bool) -> Result<(), String> {
    let chunk = load_or_compile(input, strict)?;
    let mut vm = lumen_runtime::Vm::new();
    match vm.run(&chunk) {
        Ok(value) => {
            println!("{}", value);
            Ok(())
        }
        Err(e) => Err(format!("runtime error: {}", e)),
    }
}
