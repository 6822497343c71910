//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, Context};
use clap::{self, crate_version, Arg, ArgMatches, Command};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use xdrgen::{
    codegen::EmitOptions, preprocess::Preprocessor, symbol::Define, CompileError, CompileOptions,
};

use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    process,
};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("xdrgen")
        .version(crate_version!())
        .about("Compiles XDR/ONC-RPC interface definitions to Rust")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("Interface definition file ('-' or absent for stdin)"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .takes_value(true)
                .default_value("generate")
                .possible_values(["lex", "parse", "ir", "generate"])
                .help("Stop after the given stage and dump its output"),
        )
        .arg(
            Arg::new("define")
                .short('D')
                .long("define")
                .value_name("NAME[=VALUE]")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Define a constant before parsing starts"),
        )
        .arg(
            Arg::new("cpp")
                .long("cpp")
                .help("Run the source through the C preprocessor first"),
        )
        .arg(
            Arg::new("cpp-command")
                .long("cpp-command")
                .value_name("COMMAND")
                .takes_value(true)
                .requires("cpp")
                .help("Preprocessor to run instead of 'cpp -P'"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Output file (stdout if absent)"),
        )
        .arg(
            Arg::new("standalone")
                .long("standalone")
                .help("Emit inner attributes, for a module of its own"),
        )
        .arg(
            Arg::new("no-structural")
                .long("no-structural")
                .help("Do not emit structural (JSON) conversions"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Increase log verbosity"),
        )
        .get_matches();

    init_logging(args.occurrences_of("verbose"));

    let options = options(&args)?;
    let (name, text) = read_input(args.value_of("input"))?;

    let mut output: Box<dyn Write> = match args.value_of("output") {
        None | Some("-") => Box::new(io::stdout()),
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            Box::new(BufWriter::new(file))
        }
    };

    let mode = args.value_of("mode").unwrap_or("generate");
    let result = run(mode, &text, &name, &options, &mut output);

    match result {
        // Los errores ubicados ya traen su propio formato
        Err(CompileError::Rejected { report, .. }) => {
            eprint!("{}", report);
            process::exit(1);
        }

        result => result.with_context(|| format!("Failed to compile {}", name))?,
    }

    output.flush().context("Failed to flush output")?;
    Ok(())
}

fn run(
    mode: &str,
    text: &str,
    name: &str,
    options: &CompileOptions,
    output: &mut dyn Write,
) -> Result<(), CompileError> {
    match mode {
        "lex" => {
            for token in xdrgen::lex_source(text, name, options)? {
                writeln!(output, "{}\t{}", token.location(), token.val())?;
            }
        }

        "parse" => {
            let parsed = xdrgen::parse_source(text, name, options)?;
            let dump = json!({
                "declarations": parsed.declarations,
                "constants": parsed.symbols.constants(),
            });

            write_json(output, &dump)?;
        }

        "ir" => {
            let bundle = xdrgen::bundle_source(text, name, options)?;
            write_json(output, &bundle)?;
        }

        _ => xdrgen::compile(text, name, options, output)?,
    }

    Ok(())
}

fn options(args: &ArgMatches) -> anyhow::Result<CompileOptions> {
    let defines = args
        .values_of("define")
        .into_iter()
        .flatten()
        .map(|define| {
            define
                .parse::<Define>()
                .with_context(|| format!("Bad define: {}", define))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let preprocessor = match (args.is_present("cpp"), args.value_of("cpp-command")) {
        (false, _) => None,
        (true, None) => Some(Preprocessor::default()),
        (true, Some(command)) => {
            let mut words = command.split_whitespace();
            let program = words.next().context("Empty preprocessor command")?;

            Some(Preprocessor::new(program).args(words))
        }
    };

    let mut emit = EmitOptions::default();
    if args.is_present("standalone") {
        emit |= EmitOptions::INNER_ATTRIBUTES;
    }

    if args.is_present("no-structural") {
        emit.remove(EmitOptions::STRUCTURAL);
    }

    Ok(CompileOptions {
        defines,
        preprocessor,
        emit,
    })
}

fn read_input(path: Option<&str>) -> anyhow::Result<(String, String)> {
    match path {
        None | Some("-") => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read from stdin")?;

            Ok(("<stdin>".to_owned(), text))
        }

        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read: {}", path))?;

            Ok((path.to_owned(), text))
        }
    }
}

fn write_json<T: serde::Serialize>(output: &mut dyn Write, value: &T) -> Result<(), CompileError> {
    serde_json::to_writer_pretty(&mut *output, value).map_err(io::Error::from)?;
    writeln!(output)?;

    Ok(())
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
