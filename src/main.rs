use std::{fmt::Display, path::PathBuf, process::ExitCode};

use clap::{ArgAction, CommandFactory, Parser as ClapParser, ValueEnum, error::ErrorKind};
use colored::Colorize;
use indoc::indoc;
use log::{LevelFilter, Log, Metadata, Record, debug, error};
use midend::{
    PipelineConfig, Program, SubstitutionPolicy,
    ast::pretty_print::pretty_print_program,
    middle::{DEFAULT_COLLECTOR_REGION_BYTES, run_pipeline},
};

const LONG_ABOUT: &str = indoc! {"
    Runs the middle-end passes over resolved programs.

    Each source file holds one resolved program serialized as JSON. Complex
    types are lowered to records and, with --copy-collect, every function is
    instrumented with root registration for the copying collector. The
    lowered program is printed to stdout.
"};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Human readable listing
    Pretty,
    /// The lowered program in the same format as the input
    Json,
}

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = LONG_ABOUT)]
pub struct Args {
    source_files: Vec<PathBuf>,

    /// Instrument functions with root registration for the copying collector
    #[arg(long)]
    copy_collect: bool,

    /// Size of the memory region the collector is initialized with
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_COLLECTOR_REGION_BYTES)]
    collector_region: i64,

    /// What to do with containers instantiated over a complex type that has
    /// no record counterpart
    #[arg(long, value_enum, default_value_t = SubstitutionPolicy::Fail)]
    unknown_substitution: SubstitutionPolicy,

    /// Skip the consistency checks run after every pass
    #[arg(long)]
    no_verify: bool,

    #[arg(long, value_enum, default_value_t = Emit::Pretty)]
    emit: Emit,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = match record.level() {
            log::Level::Error => "error".red().bold(),
            log::Level::Warn => "warning".yellow().bold(),
            log::Level::Info => "info".green().bold(),
            log::Level::Debug => "debug".blue().bold(),
            log::Level::Trace => "trace".dimmed(),
        };

        eprintln!("{level}{} {}", ":".bold(), record.args());
    }

    fn flush(&self) {}
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // only fails if a logger is already installed
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

fn fail(message: impl Display) -> ExitCode {
    error!("{message}");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    if args.collector_region <= 0 {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Collector region must be positive, got {}", args.collector_region),
            )
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    let config = PipelineConfig {
        copy_collect: args.copy_collect,
        collector_region_bytes: args.collector_region,
        unknown_substitution: args.unknown_substitution,
        verify: !args.no_verify,
    };

    for source_file in &args.source_files {
        let contents = match std::fs::read_to_string(source_file) {
            Ok(contents) => contents,
            Err(err) => return fail(format!("Failed to read '{}': {err}", source_file.display())),
        };

        let mut program = match Program::from_json(&contents) {
            Ok(program) => program,
            Err(err) => {
                return fail(format!(
                    "'{}' is not a resolved program: {err}",
                    source_file.display()
                ));
            }
        };

        match run_pipeline(&mut program, &config) {
            Ok(report) => debug!("{}: {report:?}", source_file.display()),
            Err(err) => {
                return fail(format!(
                    "{}: internal compiler error: {err}",
                    source_file.display()
                ));
            }
        }

        match args.emit {
            Emit::Pretty => print!("{}", pretty_print_program(&program)),
            Emit::Json => match program.to_json() {
                Ok(json) => println!("{json}"),
                Err(err) => return fail(format!("Failed to serialize program: {err}")),
            },
        }
    }

    ExitCode::SUCCESS
}
