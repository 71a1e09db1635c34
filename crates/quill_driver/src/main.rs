use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand};
use quill_ast::{Ast, Location, ModuleId, Span};
use quill_lexer::Lexer;
use quill_parser::parse_program;
use quill_resolve::resolve_names;
use quill_types::check_types;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Quill front end: parse, resolve and type check a module tree
#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill compiler front end", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the token stream of one file
    Lex {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Load a module with its imports and print every body
    Parse {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Resolve names and print the flattened member tables
    Resolve {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Type check and print the result type of each module
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print every body with its types
        #[arg(long)]
        dump: bool,
    },
}

fn main() -> ExitCode {
    if let Ok(filter) = EnvFilter::try_from_env("QUILL_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
        debug!("tracing initialized");
    }

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Lex { file } => run_lexer(&file),
        Command::Parse { file } => Session::load(&file).map(|session| print_program(&session.ast, false)),
        Command::Resolve { file } => Session::load(&file).and_then(|mut session| {
            session.resolve()?;
            print_program(&session.ast, false);
            Ok(())
        }),
        Command::Check { file, dump } => Session::load(&file).and_then(|mut session| {
            session.resolve()?;
            session.check()?;
            if dump {
                print_program(&session.ast, true);
            }
            print_entries(&session.ast, session.root);
            Ok(())
        }),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

fn run_lexer(file: &Path) -> Result<(), ()> {
    let source = read_file(file)?;
    match Lexer::tokenize(&source) {
        Ok(tokens) => {
            for spanned in &tokens {
                let span = format!("{}..{}", spanned.span.start, spanned.span.end);
                println!("{:<10} {}", span, spanned.token);
            }
            println!("{} tokens", tokens.len());
            Ok(())
        }
        Err(err) => {
            let name = file.display().to_string();
            render(&name, &source, "lex", &err.message, err.span);
            Err(())
        }
    }
}

fn read_file(file: &Path) -> Result<String, ()> {
    fs::read_to_string(file).map_err(|err| eprintln!("error: cannot read '{}': {}", file.display(), err))
}

/// Module texts read from the root file's directory
struct Sources {
    dir: PathBuf,
    texts: HashMap<String, String>,
}

impl Sources {
    fn read(&mut self, module: &str) -> Option<String> {
        let path = self.dir.join(format!("{module}.q"));
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), "module read");
                self.texts.insert(module.to_string(), text.clone());
                Some(text)
            }
            Err(err) => {
                debug!(path = %path.display(), %err, "module not readable");
                None
            }
        }
    }
}

struct Session {
    ast: Ast,
    sources: Sources,
    root: ModuleId,
}

impl Session {
    fn load(file: &Path) -> Result<Self, ()> {
        let Some(name) = file.file_stem().and_then(|s| s.to_str()) else {
            eprintln!("error: '{}' does not name a module", file.display());
            return Err(());
        };
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut sources = Sources {
            dir,
            texts: HashMap::new(),
        };
        let mut ast = Ast::new();
        match parse_program(&mut ast, name, &mut |module: &str| sources.read(module)) {
            Ok(root) => Ok(Self { ast, sources, root }),
            Err(err) => {
                report(&ast, &sources, "parse", &err.kind.to_string(), err.loc);
                Err(())
            }
        }
    }

    fn resolve(&mut self) -> Result<(), ()> {
        resolve_names(&mut self.ast)
            .map_err(|err| report(&self.ast, &self.sources, "name", &err.kind.to_string(), err.loc))
    }

    fn check(&mut self) -> Result<(), ()> {
        check_types(&mut self.ast)
            .map_err(|err| report(&self.ast, &self.sources, "type", &err.kind.to_string(), err.loc))
    }
}

/// Render an error against the source of the module it points into
fn report(ast: &Ast, sources: &Sources, stage: &str, message: &str, loc: Location) {
    let located = loc.module.and_then(|module| {
        let name = ast.names.display(ast.module(module).name);
        sources.texts.get(&name).map(|text| (name, text))
    });
    match located {
        Some((name, text)) => render(&name, text, stage, message, loc.span),
        None => eprintln!("{stage} error: {message}"),
    }
}

fn render(name: &str, text: &str, stage: &str, message: &str, span: Span) {
    let range = span.start..span.end.max(span.start);
    let printed = Report::build(ReportKind::Error, name.to_string(), range.start)
        .with_message(format!("{stage} error"))
        .with_label(
            Label::new((name.to_string(), range))
                .with_message(message)
                .with_color(Color::Red),
        )
        .finish()
        .eprint((name.to_string(), Source::from(text.to_string())));
    if printed.is_err() {
        eprintln!("{stage} error in {name}: {message}");
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines().map(|line| format!("{pad}{line}\n")).collect()
}

fn print_program(ast: &Ast, typed: bool) {
    let signature = |slot: quill_ast::TypeSlot| match slot.fixed() {
        Some(ty) if typed => format!(" : {}", ast.type_name(ty)),
        _ => String::new(),
    };
    for class in ast.class_ids() {
        print!("{}", ast.dump_class(class));
        let def = ast.class(class);
        let methods = def.methods.iter().chain(def.bases.iter().flat_map(|b| b.overloads.iter()));
        for method in methods {
            let method = ast.method(*method);
            println!("  {}{}", ast.names.display(method.name), signature(method.ty));
            if let Some(body) = method.body {
                print!("{}", indent(&ast.dump_action(body), 4));
            }
        }
    }
    for function in ast.function_ids() {
        let function = ast.function(function);
        println!("fn {}{}", ast.names.display(function.name), signature(function.ty));
        if let Some(body) = function.body {
            print!("{}", indent(&ast.dump_action(body), 2));
        }
    }
    if typed {
        for cold in ast.colds.ids().filter(|c| ast.colds.find(*c) == *c) {
            if let Some(ty) = ast.colds.get(cold).signature {
                println!("cold#{} = {}", cold.0, ast.type_name(ty));
            }
        }
    }
}

fn print_entries(ast: &Ast, root: ModuleId) {
    for module in &ast.modules {
        let Some(entry) = module.entry else {
            continue;
        };
        let result = match ast.function(entry).ty.fixed().map(|ty| ast.types.get(ty)) {
            Some(quill_ast::Type::Function { result, .. }) => ast.type_name(*result),
            _ => "?".to_string(),
        };
        println!("{}: {}", ast.names.display(module.name), result);
    }
    debug!(root = %ast.names.display(ast.module(root).name), "check finished");
}
