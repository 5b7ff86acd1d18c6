use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::{fmt, EnvFilter};

use prodtrace::report::{TranslateStats, Translator};
use prodtrace::symstore::{SymbolPath, SymbolStore, SymbolStoreConfig};

fn store_from_args(matches: &ArgMatches) -> SymbolStore {
    let mut path = SymbolPath::new();
    for arg in matches.get_many::<String>("symbol_path").unwrap_or_default() {
        path.extend(SymbolPath::parse(arg));
    }

    if !matches.get_flag("no_env") {
        path.extend(SymbolPath::from_env());
        path.add(".");
    }

    let mut config = SymbolStoreConfig::new(path);
    if let Some(cache) = matches.get_one::<PathBuf>("cache") {
        config.default_cache = cache.clone();
    }

    SymbolStore::new(config)
}

fn report_stats(name: &str, stats: &TranslateStats) {
    for (module, error) in &stats.errors {
        eprintln!("{name}: failed to load symbols for {module}: {error}");
    }
}

fn execute(matches: &ArgMatches) -> Result<()> {
    let store = store_from_args(matches);
    let translator = Translator::new(&store);

    let stdout = io::stdout();
    let mut output = stdout.lock();

    match matches.get_many::<PathBuf>("files") {
        Some(files) => {
            for path in files {
                let file = File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                let stats = translator
                    .translate(BufReader::new(file), &mut output)
                    .with_context(|| format!("failed to translate {}", path.display()))?;
                report_stats(&path.display().to_string(), &stats);
            }
        }
        None => {
            let stdin = io::stdin();
            let stats = translator
                .translate(stdin.lock(), &mut output)
                .context("failed to translate standard input")?;
            report_stats("<stdin>", &stats);
        }
    }

    output.flush()?;
    Ok(())
}

fn main() {
    let matches = Command::new("prodtrace-translate")
        .about("Adds source files and line numbers to production .NET exception reports")
        .arg(
            Arg::new("symbol_path")
                .short('s')
                .long("symbol-path")
                .value_name("PATH")
                .action(ArgAction::Append)
                .help(
                    "Symbol search path, such as `C:\\symbols;srv*C:\\cache*https://host/symbols`. \
                     Can be given multiple times.",
                ),
        )
        .arg(
            Arg::new("no_env")
                .long("no-env")
                .action(ArgAction::SetTrue)
                .help("Do not search _NT_SYMBOL_PATH and the current directory."),
        )
        .arg(
            Arg::new("cache")
                .long("cache")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Cache for symbol servers without an explicit cache."),
        )
        .arg(
            Arg::new("files")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .num_args(1..)
                .help("Reports to translate. Reads standard input if omitted."),
        )
        .get_matches();

    // Tracing subscriber controlled by `RUST_LOG`
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .event_format(fmt::format().compact().with_target(false).without_time())
        .init();

    if let Err(error) = execute(&matches) {
        eprintln!("error: {error:?}");
        std::process::exit(1);
    }
}
