use clap::{Args, Parser, Subcommand};
use clickask::{config, server};

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// ClickAsk - natural-language questions over a ClickHouse data dictionary
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Answer one question and exit
    Ask {
        question: String,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        settings: ServeArgs,
    },
    /// Show the dictionary tables matching a question
    Search {
        question: String,
        #[arg(long, default_value_t = 8)]
        top_k: usize,
        #[command(flatten)]
        settings: ServeArgs,
    },
}

#[derive(Args, Clone)]
struct ServeArgs {
    /// HTTP server host address
    #[arg(long, env = "CLICKASK_HOST", default_value = "0.0.0.0")]
    http_host: String,

    /// HTTP server port
    #[arg(long, env = "CLICKASK_PORT", default_value_t = 8080)]
    http_port: u16,

    /// CSV export of the dictionary's "Table" sheet
    #[arg(long, env = "CLICKASK_TABLES_CSV", default_value = "dictionary/tables.csv")]
    tables_csv: String,

    /// CSV export of the dictionary's "Column" sheet
    #[arg(long, env = "CLICKASK_COLUMNS_CSV", default_value = "dictionary/columns.csv")]
    columns_csv: String,

    /// Hard ceiling on rows returned by any statement
    #[arg(long, env = "CLICKASK_MAX_ROWS", default_value_t = 200)]
    max_rows: u32,

    /// Candidate tables kept from schema search
    #[arg(long, env = "CLICKASK_SEARCH_TOP_K", default_value_t = 8)]
    search_top_k: usize,

    /// Fact table used when nothing better is known
    #[arg(long, env = "CLICKASK_DEFAULT_TABLE", default_value = "DW.Cluster_Main_Sales")]
    default_table: String,

    /// Comma-separated tables sampled as a last resort
    #[arg(long, env = "CLICKASK_FALLBACK_TABLES", value_delimiter = ',')]
    fallback_tables: Vec<String>,

    #[arg(long, env = "CLICKASK_LLM_TIMEOUT_SECS", default_value_t = 60)]
    llm_timeout_secs: u64,

    #[arg(long, env = "CLICKASK_QUERY_TIMEOUT_SECS", default_value_t = 30)]
    query_timeout_secs: u64,

    /// Longest question accepted over HTTP
    #[arg(long, env = "CLICKASK_MAX_INPUT_CHARS", default_value_t = 4000)]
    max_input_chars: usize,
}

impl From<ServeArgs> for config::CliConfig {
    fn from(args: ServeArgs) -> Self {
        config::CliConfig {
            http_host: args.http_host,
            http_port: args.http_port,
            tables_csv: args.tables_csv,
            columns_csv: args.columns_csv,
            max_rows: args.max_rows,
            search_top_k: args.search_top_k,
            default_table: args.default_table,
            fallback_tables: args.fallback_tables,
            llm_timeout_secs: args.llm_timeout_secs,
            query_timeout_secs: args.query_timeout_secs,
            max_input_chars: args.max_input_chars,
        }
    }
}

fn load_config(args: ServeArgs) -> config::ServerConfig {
    match config::ServerConfig::from_cli(args.into()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            println!("\nClickAsk v{}\n", env!("CARGO_PKG_VERSION"));
            server::run_with_config(load_config(args)).await;
        }
        Command::Ask {
            question,
            json,
            settings,
        } => {
            let config = load_config(settings);
            let engine = server::build_engine(&config)?;
            let result = engine.answer(&question).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.render_text(50));
            }
        }
        Command::Search {
            question,
            top_k,
            settings,
        } => {
            let config = load_config(settings);
            let engine = server::build_engine(&config)?;
            let registry = engine.registry();
            for table in registry.search(&question, top_k) {
                let h = registry.highlights(table);
                println!("{}  {}", table.qualified_name(), table.description);
                println!(
                    "    date: {}  store: {}  metric: {}",
                    h.date_cols.join(", "),
                    h.store_cols.join(", "),
                    h.metric_cols.join(", ")
                );
            }
        }
    }
    Ok(())
}
