use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use dern::{resolve, Handle, Input, Value, Vm, VmBuilder};

#[derive(Parser)]
#[command(name = "dern", version, about = "Dern: an embeddable Lisp virtual machine")]
struct Cli {
    /// Source files to evaluate, in order
    files: Vec<PathBuf>,

    /// Evaluate an expression
    #[arg(short, long)]
    eval: Option<String>,

    /// Directory searched by `require` (repeatable)
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// Deny file system access to evaluated code
    #[arg(long)]
    no_fs: bool,

    /// Log every evaluated form
    #[arg(long)]
    debug: bool,

    /// Print errors in color
    #[arg(short, long)]
    color_diagnostics: bool,

    /// Arguments passed to the program, after `--`
    #[arg(last = true)]
    args: Vec<String>,
}

fn init_tracing(debug: bool) {
    let mut filter = EnvFilter::from_default_env();
    if debug {
        if let Ok(directive) = "dern_vm=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_vm(cli: &Cli) -> Vm {
    let mut builder = VmBuilder::new()
        .with_debug_mode(cli.debug)
        .with_file_system_access(!cli.no_fs);
    for dir in &cli.include {
        builder = builder.with_include_directory(dir.clone());
    }
    for arg in &cli.args {
        builder = builder.with_command_line_argument(arg.clone());
    }
    for (key, value) in std::env::vars() {
        builder = builder.with_environment_variable(format!("{key}={value}"));
    }
    builder.build()
}

fn is_error(vm: &Vm, h: Handle) -> bool {
    matches!(vm.get(h), Value::Error(_))
}

fn report_error(message: &str, color: bool) {
    if color {
        eprintln!("\x1b[31m{message}\x1b[0m");
    } else {
        eprintln!("{message}");
    }
}

fn exit_code(vm: &Vm) -> ExitCode {
    ExitCode::from(vm.get_exit_code().clamp(0, 255) as u8)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut vm = build_vm(&cli);
    let color = cli.color_diagnostics;

    for file in &cli.files {
        debug!(path = %file.display(), "evaluating file");
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(e) => {
                report_error(&format!("Error reading {}: {e}", file.display()), color);
                return ExitCode::FAILURE;
            }
        };
        let result = vm.read_from_str_and_eval_in_global_environment(&source);
        if is_error(&vm, result) {
            report_error(&vm.to_string(result), color);
            return ExitCode::FAILURE;
        }
        if vm.is_quit() {
            return exit_code(&vm);
        }
    }

    if let Some(expr) = &cli.eval {
        let result = vm.read_from_str_and_eval_in_global_environment(expr);
        if is_error(&vm, result) {
            report_error(&vm.to_string(result), color);
            return ExitCode::FAILURE;
        }
        if !matches!(vm.get(result), Value::Nil) {
            println!("{}", vm.to_string(result));
        }
        return exit_code(&vm);
    }

    if !cli.files.is_empty() {
        return exit_code(&vm);
    }

    match ReplSession::new(vm, color) {
        Ok(mut session) => {
            session.run();
            exit_code(session.vm())
        }
        Err(e) => {
            report_error(&format!("Cannot start line editor: {e}"), color);
            ExitCode::FAILURE
        }
    }
}

/// Interactive read-eval-print loop over one VM.
///
/// Lines accumulate in `input` until they form complete expressions; the
/// history file is written when the session drops.
struct ReplSession {
    vm: Vm,
    editor: DefaultEditor,
    input: Input,
    entry: String,
    color: bool,
    history_path: PathBuf,
}

impl ReplSession {
    fn new(vm: Vm, color: bool) -> rustyline::Result<Self> {
        let mut editor = DefaultEditor::new()?;
        let history_path = dern_home().join("history.txt");
        let _ = editor.load_history(&history_path);
        Ok(ReplSession {
            vm,
            editor,
            input: Input::new(""),
            entry: String::new(),
            color,
            history_path,
        })
    }

    fn vm(&self) -> &Vm {
        &self.vm
    }

    fn pending(&self) -> bool {
        !self.entry.is_empty()
    }

    fn reset(&mut self) {
        self.input.clear();
        self.entry.clear();
    }

    fn run(&mut self) {
        println!("Dern v{}", env!("CARGO_PKG_VERSION"));
        println!("Type ,help for help, ,quit to exit\n");

        loop {
            let prompt = if self.pending() { "  ... " } else { "dern> " };
            match self.editor.readline(prompt) {
                Ok(line) => {
                    if !self.pending() {
                        match line.trim() {
                            ",quit" | ",exit" | ",q" => break,
                            ",help" | ",h" => {
                                print_help();
                                continue;
                            }
                            ",env" => {
                                self.print_env();
                                continue;
                            }
                            "" => continue,
                            _ => {}
                        }
                    }
                    self.feed(&line);
                    if self.vm.is_quit() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    if self.pending() {
                        self.reset();
                        println!("^C");
                        continue;
                    }
                    break;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    report_error(&format!("Error: {e}"), self.color);
                    break;
                }
            }
        }
    }

    /// Append a line and evaluate every complete form it finishes.
    fn feed(&mut self, line: &str) {
        if self.pending() {
            self.entry.push('\n');
        }
        self.entry.push_str(line);
        self.input.push_str(line);
        self.input.push_str("\n");

        while let Some(form) = self.vm.parse(&mut self.input) {
            if matches!(self.vm.get(form), Value::MultilineComment(_)) {
                continue;
            }
            let result = if is_error(&self.vm, form) {
                form
            } else {
                self.vm.eval_in_global_environment(form)
            };
            self.print_result(result);
            if self.vm.is_quit() {
                break;
            }
        }

        if !self.input.has_pending() {
            let entry = std::mem::take(&mut self.entry);
            let _ = self.editor.add_history_entry(entry.trim());
            self.input.clear();
        }
    }

    fn print_result(&self, result: Handle) {
        let text = self.vm.to_string(result);
        if is_error(&self.vm, result) {
            report_error(&text, self.color);
        } else {
            println!("{text}");
        }
    }

    fn print_env(&self) {
        let Some(env) = self.vm.heap().env(self.vm.global_environment()) else {
            return;
        };
        let mut user_bindings: Vec<(String, String)> = env
            .iter()
            .filter(|b| !matches!(self.vm.get(b.value), Value::Builtin(_) | Value::Special(_)))
            .map(|b| (resolve(b.name), self.vm.to_string(b.value)))
            .collect();
        user_bindings.sort();
        for (name, value) in user_bindings {
            println!("  {name} = {value}");
        }
    }
}

impl Drop for ReplSession {
    fn drop(&mut self) {
        let _ = std::fs::create_dir_all(dern_home());
        let _ = self.editor.save_history(&self.history_path);
    }
}

fn print_help() {
    println!("Dern REPL Commands:");
    println!("  ,quit / ,q    Exit the REPL");
    println!("  ,help / ,h    Show this help");
    println!("  ,env          Show global bindings other than builtins");
    println!();
    println!("Forms:");
    println!("  define, fn, if, select, do, while, for, quote, and, or, howto");
    println!("  (doc name) shows the documentation of a binding");
}

fn dern_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".dern")
}
