use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, info};

use lisp::{Limits, LispError, Machine};

/// A small Lisp interpreter.
#[derive(Parser, Debug)]
#[command(name = "lisp", version, about)]
struct Args {
    /// Source files to evaluate, printing each result. Without files the
    /// interpreter reads from stdin.
    files: Vec<PathBuf>,

    /// Evaluate a file silently before the REPL starts (repeatable)
    #[arg(long, value_name = "FILE")]
    load: Vec<PathBuf>,

    /// Log store activity (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Log every frame and application (trace level)
    #[arg(long)]
    trace: bool,

    /// Start from the small fixed store sizes instead of the defaults
    #[arg(long)]
    classic: bool,

    /// Pairs available to evaluation
    #[arg(long, value_name = "N")]
    durable_cells: Option<usize>,

    /// Pairs available to the reader per form
    #[arg(long, value_name = "N")]
    transient_cells: Option<usize>,

    /// Bytes of interned atom text
    #[arg(long, value_name = "N")]
    symbol_bytes: Option<usize>,

    /// Environment frames, the global frame included
    #[arg(long, value_name = "N")]
    frame_pool: Option<usize>,

    /// Bindings per call frame
    #[arg(long, value_name = "N")]
    frame_bindings: Option<usize>,

    /// Bindings in the global frame, primitives included
    #[arg(long, value_name = "N")]
    global_bindings: Option<usize>,

    /// Nested evaluations before a form is aborted
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,
}

impl Args {
    fn limits(&self) -> Limits {
        let base = if self.classic {
            Limits::classic()
        } else {
            Limits::default()
        };
        Limits {
            durable_cells: self.durable_cells.unwrap_or(base.durable_cells),
            transient_cells: self.transient_cells.unwrap_or(base.transient_cells),
            symbol_bytes: self.symbol_bytes.unwrap_or(base.symbol_bytes),
            frame_pool: self.frame_pool.unwrap_or(base.frame_pool),
            frame_bindings: self.frame_bindings.unwrap_or(base.frame_bindings),
            global_bindings: self.global_bindings.unwrap_or(base.global_bindings),
            max_depth: self.max_depth.unwrap_or(base.max_depth),
            ..base
        }
    }

    fn log_level(&self) -> tracing::Level {
        if self.trace {
            tracing::Level::TRACE
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(args.log_level().into()),
        )
        .with_writer(io::stderr)
        .init();

    let limits = args.limits();
    let mut machine = Machine::new(limits).context("failed to initialize interpreter")?;
    info!(version = lisp::VERSION, "interpreter ready");

    // Read every source file up front so a missing one fails before anything runs.
    let mut sources = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        sources.push((path.as_path(), text));
    }

    for path in &args.load {
        load_file(&mut machine, path)?;
    }

    if !sources.is_empty() {
        let mut failed = false;
        for (path, text) in &sources {
            failed |= !run_file(&mut machine, path, text);
        }
        return Ok(if failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    if io::stdin().is_terminal() {
        run_interactive(&mut machine)?;
    } else {
        run_piped(&mut machine)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Evaluate a file without printing results. Any error is fatal.
fn load_file(machine: &mut Machine, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut pos = 0;
    let mut count = 0;
    while let Some((expr, next)) = machine
        .read(&text, pos)
        .with_context(|| format!("{}: form {}", path.display(), count + 1))?
    {
        count += 1;
        machine
            .eval(expr)
            .with_context(|| format!("{}: form {}", path.display(), count))?;
        pos = next;
    }
    debug!(path = %path.display(), forms = count, "loaded");
    Ok(())
}

/// Evaluate and print every form in a file. Stops at the first error and
/// returns false.
fn run_file(machine: &mut Machine, path: &Path, text: &str) -> bool {
    let mut pos = 0;
    let mut count = 0;
    loop {
        count += 1;
        let (expr, next) = match machine.read(text, pos) {
            Ok(Some(form)) => form,
            Ok(None) => return true,
            Err(e) => {
                eprintln!("{}:form {}: {}", path.display(), count, e);
                return false;
            }
        };
        pos = next;
        match machine.eval(expr) {
            Ok(val) => println!("{}", machine.print(val)),
            Err(e) => {
                eprintln!("{}:form {}: {}", path.display(), count, e);
                return false;
            }
        }
    }
}

/// Interactive REPL: accumulate lines until parens are balanced.
fn run_interactive(machine: &mut Machine) -> Result<()> {
    println!("lisp {}", lisp::VERSION);
    println!("Type :quit to leave, :env for bindings, :stats for store usage.");

    let mut rl = DefaultEditor::new().context("could not initialize line editor")?;
    let mut buf = String::new();

    loop {
        let prompt = if buf.is_empty() { ">> " } else { ".. " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buf.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":quit" | ":exit" => break,
                        ":env" => {
                            let _ = rl.add_history_entry(line.trim());
                            print_environment(machine);
                            continue;
                        }
                        ":stats" => {
                            let _ = rl.add_history_entry(line.trim());
                            print_stats(machine);
                            continue;
                        }
                        _ => {}
                    }
                }

                buf.push_str(&line);
                buf.push('\n');
                if paren_balance(&buf) > 0 {
                    continue;
                }

                let input = std::mem::take(&mut buf);
                let _ = rl.add_history_entry(input.trim());
                eval_and_print(&input, machine);
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C drops a half-typed form
                buf.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("line editor failed"),
        }
    }
    Ok(())
}

/// Piped mode: read all input, then evaluate it like REPL input.
fn run_piped(machine: &mut Machine) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
    eval_and_print(&input, machine);
    Ok(())
}

/// Evaluate one or more expressions in a string and print results.
/// An evaluation error skips to the next form; a read error skips to the
/// next line.
fn eval_and_print(input: &str, machine: &mut Machine) {
    let mut out = io::stdout().lock();
    let mut err = io::stderr().lock();
    eval_and_write(input, machine, &mut out, &mut err);
}

fn eval_and_write(input: &str, machine: &mut Machine, out: &mut impl Write, err: &mut impl Write) {
    let mut pos = 0;
    while pos < input.len() {
        match machine.read(input, pos) {
            Ok(Some((expr, next))) => {
                pos = next;
                let _ = match machine.eval(expr) {
                    Ok(val) => writeln!(out, "{}", machine.print(val)),
                    Err(e) => writeln!(err, "Error: {}", e),
                };
            }
            Ok(None) => break,
            Err(e) => {
                let _ = writeln!(err, "Error: {}", e);
                let at = match e {
                    LispError::Parse { position, .. } => position.max(pos),
                    _ => pos,
                };
                pos = next_line(input, at);
            }
        }
    }
}

/// Start of the line after byte `pos`, or the end of `input`.
fn next_line(input: &str, pos: usize) -> usize {
    let bytes = input.as_bytes();
    let pos = pos.min(bytes.len());
    bytes[pos..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |i| pos + i + 1)
}

/// Open minus close parentheses, ignoring comments.
fn paren_balance(text: &str) -> i32 {
    let mut depth = 0;
    for line in text.lines() {
        let code = line.split(';').next().unwrap_or("");
        for ch in code.chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
        }
    }
    depth
}

fn print_environment(machine: &Machine) {
    let bindings = machine.global_bindings();
    println!("Global bindings ({} total):", bindings.len());
    for (name, value) in bindings {
        println!("  {} = {}", name, value);
    }
}

fn print_stats(machine: &Machine) {
    let stats = machine.stats();
    println!(
        "  pairs:   {}/{}",
        stats.durable_used, stats.durable_capacity
    );
    println!(
        "  atoms:   {} ({}/{} bytes)",
        stats.atoms, stats.symbol_bytes, stats.symbol_capacity
    );
    println!(
        "  frames:  {}/{} live",
        stats.live_frames, stats.frame_capacity
    );
    println!("  globals: {}", stats.global_bindings);
}
