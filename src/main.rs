use std::{
    error::Error,
    fs,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    process::ExitCode,
};

use book_scanner::{
    ScanSession, SessionEvent, StabilizerVisualization,
    category::normalise_category,
    clock::Millis,
    config::{self, Config},
    isbn::{self, Isbn},
    library::{BookRecord, Library, LibraryQuery, ReadFilter, SortKey},
    observers::{ScanObserver, TransitionLogger},
    stabilizer::ScanStabilizer,
    store::FileStore,
    telemetry,
};
use clap::{Parser, Subcommand};
use colored::Colorize;

/// Gap assumed between reads that carry no timestamp (about 10 frames/second)
const FRAME_INTERVAL_MS: Millis = 100;

/// Command-line arguments for the book scanner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./book-scanner.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Reader whose read flags are used
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
enum Command {
    /// Check ISBN checksums
    Validate {
        /// ISBNs, separators allowed
        #[arg(required = true)]
        isbns: Vec<String>,
    },
    /// Replay decoder reads ("<ms> <code>" or "<code>" per line) through the stabilizer
    Scan {
        /// Read from a file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Keep scanning after an acceptance instead of stopping
        #[arg(long)]
        continuous: bool,
        /// Add scanned books to the library with placeholder metadata
        #[arg(long)]
        add: bool,
    },
    /// Add or update a book
    Add {
        /// ISBN of the book
        isbn: String,
        /// Title
        #[arg(long, default_value = "")]
        title: String,
        /// Author
        #[arg(long, default_value = "")]
        author: String,
        /// Subject headings used to pick a category
        #[arg(long = "subject")]
        subjects: Vec<String>,
        /// Shelf category, overrides --subject
        #[arg(long)]
        category: Option<String>,
        /// Mark as read for the current reader
        #[arg(long)]
        read: bool,
    },
    /// Flip the current reader's read flag
    Toggle {
        /// ISBN of the book
        isbn: String,
    },
    /// Delete a book
    Remove {
        /// ISBN of the book
        isbn: String,
    },
    /// List books
    List {
        /// Text to search in title, author, category and ISBN
        #[arg(short, long)]
        search: Option<String>,
        /// all, read or unread
        #[arg(short, long, default_value = "all")]
        filter: ReadFilter,
        /// Exact category
        #[arg(long)]
        category: Option<String>,
        /// title, author, category or isbn
        #[arg(long, default_value = "title")]
        sort: SortKey,
    },
    /// Show totals for the current reader
    Stats,
    /// Merge an exported JSON array of book rows into the library
    Import {
        /// JSON file to import
        file: PathBuf,
    },
    /// Replay reads and print the stabilizer as a DOT graph
    Graph {
        /// Read from a file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Write the DOT graph here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also print the transition history
        #[arg(long)]
        history: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    telemetry::init(args.verbose);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Execute the chosen subcommand; `Ok(false)` means "ran, but found problems"
fn run(args: Args) -> Result<bool, Box<dyn Error>> {
    let config = config::load(args.config.as_deref())?;
    let user = config.resolve_user(args.user.as_deref());
    let store = FileStore::new(&config.library_dir);

    match args.command {
        Command::Validate { isbns } => Ok(validate(&isbns)),
        Command::Scan { input, continuous, add } => {
            let reads = read_frames(input.as_deref())?;
            let scanned = scan(&config, &reads, continuous);
            if add && !scanned.is_empty() {
                let mut library = Library::load_from(&store, config.users.clone())?;
                for isbn in &scanned {
                    library.add_book(BookRecord::new(isbn, "", "", ""), &user, false)?;
                }
                library.save_to(&store)?;
            }
            Ok(!scanned.is_empty())
        }
        Command::Add { isbn, title, author, subjects, category, read } => {
            let isbn = ScanSession::enter_manual(&isbn)?;
            let category = category
                .unwrap_or_else(|| normalise_category(subjects.as_slice()).to_string());
            let record = BookRecord::new(&isbn, &title, &author, &category);
            let mut library = Library::load_from(&store, config.users.clone())?;
            let inserted = library.add_book(record, &user, read)?;
            library.save_to(&store)?;
            let verb = if inserted { "Added" } else { "Updated" };
            if let Some(book) = library.get(&isbn) {
                println!("{} {book}", verb.green().bold());
            }
            Ok(true)
        }
        Command::Toggle { isbn } => {
            let mut library = Library::load_from(&store, config.users.clone())?;
            let code = isbn::normalize(&isbn);
            let read = library.toggle_read(&code, &user)?;
            library.save_to(&store)?;
            let status = if read { "read".green() } else { "unread".yellow() };
            println!("{code} is now {status} for {user}");
            Ok(true)
        }
        Command::Remove { isbn } => {
            let mut library = Library::load_from(&store, config.users.clone())?;
            let removed = library.remove(&isbn::normalize(&isbn))?;
            library.save_to(&store)?;
            println!("{} {removed}", "Removed".red().bold());
            Ok(true)
        }
        Command::List { search, filter, category, sort } => {
            let library = Library::load_from(&store, config.users.clone())?;
            let query = LibraryQuery { search, read: filter, category, sort, user: user.clone() };
            let books = library.query(&query);
            if books.is_empty() {
                println!("{}", "No books match.".yellow());
            }
            for book in books {
                let mark = if book.is_read_by(&user) { "[x]".green() } else { "[ ]".normal() };
                println!("{mark} {book}");
            }
            Ok(true)
        }
        Command::Stats => {
            let library = Library::load_from(&store, config.users.clone())?;
            let stats = library.stats(&user);
            println!("{}", format!("Library of {user}").green().bold());
            println!("Books:  {}", stats.total);
            println!("Read:   {}", stats.read);
            println!("Unread: {}", stats.unread);
            println!("Categories: {}", library.categories().join(", "));
            Ok(true)
        }
        Command::Import { file } => {
            let json = fs::read_to_string(&file)?;
            let mut library = Library::load_from(&store, config.users.clone())?;
            let added = library.import_rows(&json)?;
            library.save_to(&store)?;
            println!("Imported {added} new book(s), {} total", library.len());
            Ok(true)
        }
        Command::Graph { input, output, history } => {
            let reads = read_frames(input.as_deref())?;
            let mut stabilizer = ScanStabilizer::new(config.stabilizer.to_stabilizer_config());
            for (at, code) in &reads {
                stabilizer.submit(code, *at);
            }
            let dot = StabilizerVisualization::generate_dot(&stabilizer, true);
            match output {
                Some(path) => StabilizerVisualization::save_dot_to_file(&dot, &path)?,
                None => print!("{dot}"),
            }
            if history {
                println!("{}", StabilizerVisualization::history_table(stabilizer.get_history()));
            }
            Ok(true)
        }
    }
}

/// Print the verdict for each ISBN; true when all are valid
fn validate(isbns: &[String]) -> bool {
    let mut all_valid = true;
    for raw in isbns {
        match Isbn::parse(raw) {
            Ok(isbn) => println!("{} {isbn} ({:?})", "valid".green().bold(), isbn.kind()),
            Err(err) => {
                all_valid = false;
                println!("{} {raw}: {err}", "invalid".red().bold());
            }
        }
    }
    all_valid
}

/// Feed `reads` through a scan session and return the ISBNs it produced
fn scan(config: &Config, reads: &[(Millis, String)], continuous: bool) -> Vec<Isbn> {
    let mut session =
        ScanSession::new(config.stabilizer.to_stabilizer_config()).with_observers(Box::new(|| {
            let observers: Vec<Box<dyn ScanObserver>> = vec![Box::new(TransitionLogger)];
            observers
        }));
    session.start();

    let mut scanned = Vec::new();
    for (at, code) in reads {
        match session.feed(code, *at) {
            SessionEvent::Scanned { isbn, accepted } => {
                println!(
                    "{} {isbn} after {} identical reads at {} ms",
                    "scanned".green().bold(),
                    accepted.same_count,
                    accepted.at
                );
                scanned.push(isbn);
            }
            SessionEvent::Rejected { accepted, error } => {
                println!("{} {}: {error}", "rejected".red().bold(), accepted.code);
            }
            SessionEvent::Ignored(_) | SessionEvent::Inactive => continue,
        }
        if continuous {
            session.unlock();
        } else {
            session.stop();
            break;
        }
    }
    session.stop();

    if scanned.is_empty() {
        println!("{}", "No stable ISBN found.".yellow());
    }
    scanned
}

/// Read decoder frames from `path` or stdin
fn read_frames(path: Option<&Path>) -> io::Result<Vec<(Millis, String)>> {
    let reader: Box<dyn BufRead> = match path {
        Some(path) => Box::new(BufReader::new(fs::File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(line?);
    }
    Ok(parse_frames(&lines))
}

/// Turn "<ms> <code>" or "<code>" lines into timestamped reads.
///
/// Bare codes are spaced [`FRAME_INTERVAL_MS`] after the previous read. Blank
/// lines stand for frames where the decoder found nothing.
fn parse_frames(lines: &[String]) -> Vec<(Millis, String)> {
    let mut frames = Vec::with_capacity(lines.len());
    let mut next_at: Millis = 0;
    for line in lines {
        let mut parts = line.split_whitespace();
        let (at, code) = match (parts.next(), parts.next()) {
            (Some(first), Some(second)) => match first.parse::<Millis>() {
                Ok(at) => (at, second.to_string()),
                Err(_) => (next_at, line.trim().to_string()),
            },
            (Some(only), None) => (next_at, only.to_string()),
            _ => (next_at, String::new()),
        };
        frames.push((at, code));
        next_at = at.saturating_add(FRAME_INTERVAL_MS);
    }
    frames
}
