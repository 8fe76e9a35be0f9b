use anyhow::{Context, bail};
use clap::{CommandFactory, Parser, Subcommand};
use knowdb::{
    Config, EmbeddingFallback, Embedder, KnowledgeBase, KnowledgeItem,
    server::{self, AppState},
};
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

type Kb = KnowledgeBase<Arc<dyn Embedder>>;

#[derive(Parser)]
#[command(name = "knowdb", version, about = "A small retrieval-augmented knowledge base")]
pub struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Knowledge-base directory (overrides `data_dir`)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Starts the REPL when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// One REPL line: the same subcommands without the program name or global flags.
#[derive(Parser)]
#[command(name = "knowdb", no_binary_name = true, disable_version_flag = true)]
struct ReplLine {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add a knowledge item
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        score: f32,
    },
    /// Show the item stored under a hash
    Get { hash: String },
    /// Replace the item under a hash with new text
    Update {
        hash: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        score: f32,
    },
    /// Delete an item
    Delete { hash: String },
    /// Most similar items to a query
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Number of results (defaults to `top_k` from the config)
        #[arg(short)]
        k: Option<usize>,
    },
    /// Related-knowledge prompt fragment for a query
    Context {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        #[arg(short)]
        k: Option<usize>,
    },
    /// Chunk a text file and add every chunk
    Ingest {
        file: PathBuf,
        /// Chunk window in characters (defaults to `window_size` from the config)
        #[arg(long)]
        window: Option<usize>,
    },
    /// List every item
    List,
    /// Number of stored items
    Count,
    /// Clear both stores
    Clear,
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value = "0.0.0.0:7878")]
        bind: String,
    },
    /// Interactive session
    Repl,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.data_dir = db;
    }
    let embedder = config.embedding.build()?;

    match cli.command {
        Some(Command::Serve { bind }) => serve(&bind, &embedder, config.embedding_fallback),
        Some(Command::Repl) | None => run_repl(&config, &embedder),
        Some(command) => {
            let mut kb = open(&config, &embedder);
            execute(&mut kb, &config, command)
        }
    }
}

fn open(config: &Config, embedder: &Arc<dyn Embedder>) -> Kb {
    KnowledgeBase::open(&config.data_dir, Arc::clone(embedder)).with_fallback(config.embedding_fallback)
}

/// The server runs on its own actix system so blocking embedders are built and dropped outside it.
fn serve(bind: &str, embedder: &Arc<dyn Embedder>, fallback: EmbeddingFallback) -> anyhow::Result<()> {
    let state = AppState::new(Arc::clone(embedder), fallback);
    actix_web::rt::System::new()
        .block_on(server::run(bind, state))
        .with_context(|| format!("server on {} failed", bind))
}

/// REPL mode - interactive session on one knowledge base
fn run_repl(config: &Config, embedder: &Arc<dyn Embedder>) -> anyhow::Result<()> {
    let mut kb = open(config, embedder);

    println!("knowdb - knowledge base at '{}'", config.data_dir.display());
    println!("Type 'help' for commands, 'exit' or 'quit' to quit\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("knowdb> ");
        io::stdout().flush()?;

        let input = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "exit" | "quit" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                println!("{}", ReplLine::command().render_long_help());
                continue;
            }
            _ => {}
        }

        let command = match ReplLine::try_parse_from(input.split_whitespace()) {
            Ok(line) => line.command,
            Err(e) => {
                // clap renders its own usage text, help requests included
                let _ = e.print();
                continue;
            }
        };

        if let Err(e) = execute(&mut kb, config, command) {
            eprintln!("Error: {:#}", e);
        }
    }

    Ok(())
}

fn execute(kb: &mut Kb, config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Add { text, score } => {
            let item = kb.add_item(&text.join(" "), score)?;
            println!("Added {}", item.hash);
        }

        Command::Get { hash } => match kb.get_item(&hash)? {
            Some(item) => print_item(&item),
            None => bail!("no item with hash '{}'", hash),
        },

        Command::Update { hash, text, score } => {
            let item = kb.update_item(&hash, &text.join(" "), score)?;
            println!("Updated {} -> {}", hash, item.hash);
        }

        Command::Delete { hash } => {
            if kb.delete_item(&hash)? {
                println!("Deleted {}", hash);
            } else {
                println!("Nothing stored under {}", hash);
            }
        }

        Command::Search { query, k } => {
            let results = kb.search(&query.join(" "), k.unwrap_or(config.top_k))?;
            if results.is_empty() {
                println!("No results found");
            } else {
                println!("Top {} results:", results.len());
                for (rank, item) in results.iter().enumerate() {
                    println!("{}. [{:.4}] {}  {}", rank + 1, item.score, short_hash(&item.hash), item.text);
                }
            }
        }

        Command::Context { query, k } => {
            let context = kb.related_context(&query.join(" "), k.unwrap_or(config.top_k))?;
            if context.is_empty() {
                println!("No related knowledge");
            } else {
                println!("{}", context);
            }
        }

        Command::Ingest { file, window } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read '{}'", file.display()))?;
            let items = kb.ingest_document(&text, window.unwrap_or(config.window_size))?;
            println!("Ingested {} chunks from '{}'", items.len(), file.display());
        }

        Command::List => {
            let items = kb.list()?;
            if items.is_empty() {
                println!("Knowledge base is empty");
            } else {
                println!("Stored items:");
                for item in &items {
                    println!("  {}  {}", short_hash(&item.hash), item.text);
                }
                println!("Total: {} items", items.len());
            }
        }

        Command::Count => println!("{}", kb.len()?),

        Command::Clear => {
            kb.clear()?;
            println!("Knowledge base cleared");
        }

        Command::Serve { .. } | Command::Repl => bail!("not available inside the REPL"),
    }

    Ok(())
}

fn print_item(item: &KnowledgeItem) {
    println!("hash:  {}", item.hash);
    println!("score: {}", item.score);
    println!("text:  {}", item.text);
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod cli_test {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
        ReplLine::command().debug_assert();
    }

    #[test]
    fn test_parse_one_shot_commands() {
        let cli = Cli::try_parse_from(["knowdb", "--db", "/tmp/kb", "add", "Rust", "is", "fast", "--score", "0.5"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/kb")));
        match cli.command {
            Some(Command::Add { text, score }) => {
                assert_eq!(text.join(" "), "Rust is fast");
                assert_eq!(score, 0.5);
            }
            _ => panic!("expected add"),
        }

        let cli = Cli::try_parse_from(["knowdb", "search", "borrow", "checker", "-k", "3", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Command::Search { k: Some(3), .. })));

        let cli = Cli::try_parse_from(["knowdb"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_repl_line() {
        let line = ReplLine::try_parse_from("ingest notes.txt --window 200".split_whitespace()).unwrap();
        match line.command {
            Command::Ingest { file, window } => {
                assert_eq!(file, PathBuf::from("notes.txt"));
                assert_eq!(window, Some(200));
            }
            _ => panic!("expected ingest"),
        }

        assert!(ReplLine::try_parse_from("add".split_whitespace()).is_err());
        assert!(ReplLine::try_parse_from("frobnicate".split_whitespace()).is_err());
    }

    #[test]
    fn test_execute_against_a_knowledge_base() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { data_dir: dir.path().to_path_buf(), ..Config::default() };
        let embedder: Arc<dyn Embedder> = Arc::new(knowdb::HashingEmbedder::new(64));
        let mut kb = open(&config, &embedder);

        let add = ReplLine::try_parse_from("add Ferris is a crab".split_whitespace()).unwrap();
        execute(&mut kb, &config, add.command).unwrap();
        assert_eq!(kb.len().unwrap(), 1);

        let missing = ReplLine::try_parse_from("get deadbeef".split_whitespace()).unwrap();
        assert!(execute(&mut kb, &config, missing.command).is_err());

        assert!(execute(&mut kb, &config, Command::Repl).is_err());

        execute(&mut kb, &config, Command::Clear).unwrap();
        assert_eq!(kb.len().unwrap(), 0);
    }
}
