use knowdb::{HashingEmbedder, KnowledgeBase};
use std::time::Instant;

const SAMPLE: &str = "\
Rust is a general-purpose programming language. It emphasizes performance, type safety and concurrency.
Rust enforces memory safety without a garbage collector. The borrow checker tracks the lifetime of every reference.

Cargo is the Rust build system and package manager. It downloads dependencies from crates.io. It also runs tests and builds documentation.

Ferris the crab is the unofficial mascot of the Rust community. Rustaceans is the name the community uses for itself.
";

const QUERIES: &[&str] = &[
    "who is the mascot",
    "how does rust handle memory",
    "package manager and dependencies",
];

fn main() -> anyhow::Result<()> {
    // usage: cargo run --example ingest_demo -- [document.txt] [window]
    let mut args = std::env::args().skip(1);
    let document = match args.next() {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE.to_string(),
    };
    let window = args.next().map(|w| w.parse::<usize>()).transpose()?.unwrap_or(120);

    let dir = "demo_kb";
    let embedder = HashingEmbedder::new(256);
    let mut kb = KnowledgeBase::open(dir, &embedder);
    kb.clear()?;

    // === Phase 1: ingest ===
    println!("=== Phase 1: Ingest (window {}) ===\n", window);
    let start = Instant::now();
    let items = kb.ingest_document(&document, window)?;
    println!("Ingested {} chunks in {:.3}ms", items.len(), start.elapsed().as_secs_f64() * 1000.0);
    for item in &items {
        println!("  {}  {}", &item.hash[..12], item.text);
    }
    println!();

    // === Phase 2: search ===
    println!("=== Phase 2: Searches ===\n");
    for query in QUERIES {
        let start = Instant::now();
        let results = kb.search(query, 2)?;
        println!("'{}' ({:.3}ms):", query, start.elapsed().as_secs_f64() * 1000.0);
        for (rank, item) in results.iter().enumerate() {
            println!("  {}. {} (score: {:.4})", rank + 1, item.text, item.score);
        }
        println!();
    }

    // === Phase 3: prompt context ===
    println!("=== Phase 3: Related knowledge ===\n");
    println!("{}\n", kb.related_context(QUERIES[0], 2)?);

    kb.clear()?;
    println!("Cleared '{}'", dir);
    Ok(())
}
