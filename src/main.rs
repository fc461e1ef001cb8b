use std::{fs, path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use clap::Parser;
use pyduchain::{
    background::source::FileSystemSource, config::config::AnalysisConfig, display_error,
    duchain::duchain::DocumentId, language::language::LanguageSupport, Position,
};

/// Infers the types of the declarations in a Python file.
#[derive(Parser, Debug)]
#[command(name = "pyduchain", version)]
struct Args {
    file: PathBuf,

    /// JSON file with analysis settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Used when `RUST_LOG` is not set.
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Also show the declaration at this line and column.
    #[arg(long, requires = "column")]
    line: Option<u32>,

    #[arg(long, requires = "line")]
    column: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    let path = fs::canonicalize(&args.file).with_context(|| format!("cannot open {}", args.file.display()))?;
    let source = fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;
    let document = DocumentId::from(path.as_path());

    let support = LanguageSupport::new(config, Arc::new(FileSystemSource));
    let start = Instant::now();
    support.update_document(&document)?;
    println!("Analysed in {:?}", start.elapsed());

    for declaration in support.declarations(&document) {
        let ty = support.type_string(&declaration.id).unwrap_or_default();
        println!("{} {}: {}", declaration.range.start, declaration.id, ty);
    }

    for problem in support.problems(&document) {
        print!("{}", display_error(&problem, &path, &source));
    }

    if let (Some(line), Some(column)) = (args.line, args.column) {
        match support.declaration_at(&document, &Position::cursor(line, column)) {
            Some(declaration) => println!(
                "At {}:{}: {} ({})",
                line,
                column,
                declaration.id,
                support.type_string(&declaration.id).unwrap_or_default()
            ),
            None => println!("No declaration at {}:{}", line, column),
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    use std::sync::OnceLock;
    use tracing_subscriber::{fmt, EnvFilter};

    static INITIALISED: OnceLock<()> = OnceLock::new();

    INITIALISED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
