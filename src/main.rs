use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::Result;
use std::path::PathBuf;
use todostore::{Config, FilterMode, Stats, Store, Todo};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "TodoStore CLI - Ordered todo list with write-through persistence")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Directory holding the todo slot (overrides config file and TODOSTORE_DIR)
    #[arg(short, long, global = true)]
    store_dir: Option<PathBuf>,

    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a todo; words are joined with spaces
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Flip a todo between active and completed
    Toggle { id: i64 },

    /// Remove a todo
    Delete { id: i64 },

    /// List todos in insertion order
    List {
        #[arg(short, long, value_enum, default_value_t = FilterMode::All)]
        filter: FilterMode,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show total, completed and active counts
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?.with_store_dir(cli.store_dir);

    // Open store
    let mut store = Store::open(config.open_slot()?)?;

    match cli.command {
        Commands::Add { text } => {
            let text = text.join(" ");
            match store.add(&text) {
                Some(id) => println!("Added {} {}", id.to_string().cyan(), text),
                None => println!("{}", "Nothing to add: todo text is blank".yellow()),
            }
        }
        Commands::Toggle { id } => {
            if store.toggle(id) {
                if let Some(todo) = store.get(id) {
                    let state = if todo.completed { "completed" } else { "active" };
                    println!("Marked {} {}", id.to_string().cyan(), state);
                }
            } else {
                println!("{}", format!("No todo with id {}", id).yellow());
            }
        }
        Commands::Delete { id } => {
            if store.delete(id) {
                println!("Deleted {}", id.to_string().cyan());
            } else {
                println!("{}", format!("No todo with id {}", id).yellow());
            }
        }
        Commands::List { filter, json } => {
            let view = store.filter(filter);
            if json {
                let todos: Vec<&Todo> = view.collect();
                println!("{}", serde_json::to_string_pretty(&todos)?);
            } else if view.clone().next().is_none() {
                println!("No {} todos", filter);
            } else {
                for todo in view {
                    print_todo(todo);
                }
                print_stats(&store.stats());
            }
        }
        Commands::Stats { json } => {
            let stats = store.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
    }

    Ok(())
}

fn print_todo(todo: &Todo) {
    let date = todo.created_at.with_timezone(&Local).format("%Y-%m-%d").to_string();
    let id = todo.id.to_string();

    if todo.completed {
        println!(
            "{} {}  {}  {}",
            "[x]".green(),
            id.dimmed(),
            todo.text.strikethrough().dimmed(),
            date.dimmed()
        );
    } else {
        println!("[ ] {}  {}  {}", id.cyan(), todo.text, date.dimmed());
    }
}

fn print_stats(stats: &Stats) {
    println!(
        "\nTotal: {}  Completed: {}  Active: {}",
        stats.total.to_string().bold(),
        stats.completed.to_string().green(),
        stats.active.to_string().yellow()
    );
}
