use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use assess_core::model::{ItemOrdering, SessionConfigDraft, SessionMode};
use services::{Clock, FlashcardPlayer, QuizPlayer, ResultHistoryService, SessionLoopService};
use storage::repository::Storage;

mod console;
mod settings;

use console::Console;
use settings::{DEFAULT_DB_URL, ENV_BANK, ENV_DB_URL, FileSettings};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    MissingBank,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingBank => write!(
                f,
                "no question bank given (use --bank, {ENV_BANK} or `bank` in the config file)"
            ),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- quiz       [--bank <file.json>] [options]");
    eprintln!("  cargo run -p app -- flashcards [--bank <file.json>] [options]");
    eprintln!("  cargo run -p app -- history    [--db <sqlite_url>] [--limit <n>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file.toml>   settings file (default: ./medlearn.toml if present)");
    eprintln!("  --db <sqlite_url>      results database (default: {DEFAULT_DB_URL})");
    eprintln!("  --items <n>            number of items, 0 = whole bank");
    eprintln!("  --time-limit <secs>    0 = untimed");
    eprintln!("  --pass <percent>       pass threshold");
    eprintln!("  --shuffle              shuffle items at start");
    eprintln!("  --seed <n>             shuffle with a fixed seed");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {ENV_DB_URL}, {ENV_BANK}, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quiz,
    Flashcards,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "quiz" => Some(Self::Quiz),
            "flashcards" | "cards" => Some(Self::Flashcards),
            "history" => Some(Self::History),
            _ => None,
        }
    }

    fn mode(self) -> Option<SessionMode> {
        match self {
            Self::Quiz => Some(SessionMode::GradedTimed),
            Self::Flashcards => Some(SessionMode::SelfPacedPractice),
            Self::History => None,
        }
    }
}

/// Command-line flags before layering over the settings file.
#[derive(Debug, Default)]
struct Flags {
    config: Option<PathBuf>,
    db_url: Option<String>,
    bank: Option<PathBuf>,
    items: Option<i64>,
    time_limit: Option<i64>,
    pass: Option<i64>,
    shuffle: bool,
    seed: Option<u64>,
    limit: Option<u32>,
}

impl Flags {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut flags = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => flags.config = Some(require_value(args, "--config")?.into()),
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    flags.db_url = Some(value);
                }
                "--bank" => flags.bank = Some(require_value(args, "--bank")?.into()),
                "--items" => flags.items = Some(parse_number(args, "--items")?),
                "--time-limit" => flags.time_limit = Some(parse_number(args, "--time-limit")?),
                "--pass" => flags.pass = Some(parse_number(args, "--pass")?),
                "--shuffle" => flags.shuffle = true,
                "--seed" => flags.seed = Some(parse_number(args, "--seed")?),
                "--limit" => flags.limit = Some(parse_number(args, "--limit")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(flags)
    }
}

/// Settings after defaults, file, environment and flags are applied.
#[derive(Debug)]
struct Resolved {
    db_url: String,
    bank: Option<PathBuf>,
    session: SessionConfigDraft,
}

fn resolve(flags: Flags, file: FileSettings, mode: Option<SessionMode>) -> Resolved {
    let db_url = flags
        .db_url
        .or_else(|| std::env::var(ENV_DB_URL).ok())
        .or(file.db_url)
        .unwrap_or_else(|| DEFAULT_DB_URL.into());
    let bank = flags
        .bank
        .or_else(|| std::env::var(ENV_BANK).ok().map(PathBuf::from))
        .or(file.bank);

    let mut session = file.session;
    if let Some(mode) = mode {
        session.mode = mode;
    }
    if let Some(items) = flags.items {
        session.number_of_items = items;
    }
    if let Some(limit) = flags.time_limit {
        session.time_limit_secs = limit;
    }
    if let Some(pass) = flags.pass {
        session.pass_threshold = pass;
    }
    if flags.shuffle || flags.seed.is_some() {
        session.ordering = ItemOrdering::Shuffled { seed: flags.seed };
    }

    Resolved {
        db_url: normalize_sqlite_url(db_url),
        bank,
        session,
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("warn,app=info,services=info,storage=info,assess_core=info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            ArgsError::UnknownArg(first.clone())
        })?,
    };

    let flags = Flags::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let limit = flags.limit.unwrap_or(20);
    let file = settings::load_file_settings(flags.config.as_deref())?;
    let resolved = resolve(flags, file, cmd.mode());

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&resolved.db_url)?;
    let storage = Storage::sqlite(&resolved.db_url).await?;
    let clock = Clock::default_clock();

    if cmd == Command::History {
        let history = ResultHistoryService::new(Arc::clone(&storage.results));
        console::print_history(&history.list_recent(limit).await?);
        return Ok(());
    }

    let bank_path = resolved.bank.ok_or(ArgsError::MissingBank)?;
    let bank = settings::load_bank(&bank_path)?;
    let loop_svc = SessionLoopService::new(clock, Arc::clone(&storage.recorder));
    let session = loop_svc.start_from_draft(bank, resolved.session).await?;

    let mut console = Console::new();
    let report = match cmd {
        Command::Quiz => {
            let quiz = QuizPlayer::new(session.clone())?;
            console.run_quiz(&quiz).await?
        }
        Command::Flashcards => {
            let mut player = FlashcardPlayer::new(session.clone())?;
            console.run_flashcards(&mut player).await?
        }
        Command::History => None,
    };

    match report {
        Some(report) => console::finish(&session, &report).await?,
        None => eprintln!("session abandoned"),
    }
    Ok(())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(args: &[&str]) -> Flags {
        Flags::parse(&mut args.iter().map(|s| (*s).to_string())).unwrap()
    }

    #[test]
    fn flags_override_file_settings() {
        let file = settings::parse_settings(
            r#"
                db_url = "sqlite::memory:"
                [session]
                number_of_items = 10
                time_limit_secs = 600
            "#,
        )
        .unwrap();
        let resolved = resolve(
            flags(&["--items", "3", "--seed", "5"]),
            file,
            Some(SessionMode::GradedTimed),
        );

        assert_eq!(resolved.db_url, "sqlite::memory:");
        assert_eq!(resolved.session.number_of_items, 3);
        assert_eq!(resolved.session.time_limit_secs, 600);
        assert_eq!(resolved.session.ordering, ItemOrdering::Shuffled { seed: Some(5) });
    }

    #[test]
    fn subcommand_picks_the_mode() {
        let resolved = resolve(
            Flags::default(),
            FileSettings::default(),
            Command::Flashcards.mode(),
        );
        assert_eq!(resolved.session.mode, SessionMode::SelfPacedPractice);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = Flags::parse(&mut ["--pass", "high"].iter().map(|s| (*s).to_string()))
            .unwrap_err();
        assert!(matches!(err, ArgsError::InvalidNumber { flag: "--pass", .. }));
    }
}
