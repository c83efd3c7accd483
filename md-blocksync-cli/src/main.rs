use clap::{Parser, Subcommand};
use md_blocksync::sync::conflict;
use md_blocksync::sync::state::file_hash;
use md_blocksync::{Project, SyncConfig, SyncStateStore, WireBlock, flatten, markdown_to_blocks};
use serde::Serialize;
use std::collections::HashSet;
use std::env;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "md-blocksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Global state file for documents outside any project
    #[arg(global = true, long, env = "LARK_SYNC_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Directory for pulled documents with no known path
    #[arg(global = true, long, env = "LARK_SYNC_DIR")]
    sync_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the block JSON for a Markdown file
    Convert {
        file: PathBuf,
        /// Print the nested block tree instead of the flat listing
        #[arg(long)]
        tree: bool,
        #[arg(long)]
        pretty: bool,
    },
    /// Render a flat block listing (JSON array) to Markdown
    Render { file: PathBuf },
    /// Shows the local status of tracked files
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Initialize a project state file at the enclosing Git root
    Init { path: Option<PathBuf> },
    /// Unified diff between two Markdown files
    Diff { old: PathBuf, new: PathBuf },
}

#[derive(Serialize)]
struct FileStatus {
    path: String,
    status: String,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = config_from(&cli);
    match &cli.command {
        Commands::Convert { file, tree, pretty } => convert_command(file, *tree, *pretty),
        Commands::Render { file } => render_command(file),
        Commands::Status { json } => status_command(&config, *json),
        Commands::Init { path } => init_command(&config, path.as_deref()),
        Commands::Diff { old, new } => diff_command(old, new),
    }
}

fn config_from(cli: &Cli) -> SyncConfig {
    let mut config = SyncConfig::default();
    if let Some(path) = &cli.state_file {
        config = config.with_state_file(path);
    }
    if let Some(path) = &cli.sync_dir {
        config = config.with_sync_dir(path);
    }
    config
}

fn fail(err: impl Display) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(1);
}

fn read(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => fail(format!("{}: {err}", path.display())),
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> String {
    let encoded = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    encoded.unwrap_or_else(|err| fail(err))
}

fn convert_command(file: &Path, tree: bool, pretty: bool) {
    let blocks = markdown_to_blocks(&read(file));
    let output = if tree {
        to_json(&blocks, pretty)
    } else {
        to_json(&flatten("page", &blocks), pretty)
    };
    println!("{output}");
}

fn render_command(file: &Path) {
    let blocks: Vec<WireBlock> = match serde_json::from_str(&read(file)) {
        Ok(blocks) => blocks,
        Err(err) => fail(format!("{}: {err}", file.display())),
    };
    print!("{}", md_blocksync::render(&blocks));
}

fn status_command(config: &SyncConfig, json: bool) {
    let current_dir = env::current_dir().unwrap_or_else(|err| fail(err));
    let project = Project::discover(&current_dir, &config.project_state_filename);
    let opened = match &project {
        Some(project) => project.store(),
        None => SyncStateStore::open(&config.state_file, None),
    };
    let store = opened.unwrap_or_else(|err| fail(err));
    tracing::debug!(
        state_file = %store.path().display(),
        mappings = store.mappings().len(),
        "loaded state"
    );

    let mut statuses = Vec::new();
    let mut tracked = HashSet::new();
    for mapping in store.mappings() {
        let path = store.resolve_path(&mapping.local_path);
        let status = match file_hash(&path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => "missing",
            Err(_) => "local_ahead",
            Ok(hash) if hash == mapping.local_hash_at_sync => "in_sync",
            Ok(_) => "local_ahead",
        };
        statuses.push(FileStatus {
            path: mapping.local_path.clone(),
            status: status.to_string(),
        });
        tracked.insert(path);
    }
    if let Some(project) = &project {
        for file in project.files().filter(|file| !tracked.contains(file)) {
            statuses.push(FileStatus {
                path: project.relative(&file),
                status: "untracked".to_string(),
            });
        }
    }

    let is_dirty = statuses.iter().any(|s| s.status != "in_sync");

    if json {
        let output = serde_json::json!({
            "root": project.as_ref().map(|p| p.root().display().to_string()),
            "files": statuses,
        });
        println!("{}", to_json(&output, true));
    } else if !is_dirty {
        println!("All files in sync.");
    } else {
        for file in statuses.iter().filter(|s| s.status != "in_sync") {
            println!("{}: {}", file.status, file.path);
        }
    }
    if is_dirty {
        std::process::exit(1);
    }
}

fn init_command(config: &SyncConfig, path: Option<&Path>) {
    let target = match path {
        Some(path) => path.to_path_buf(),
        None => env::current_dir().unwrap_or_else(|err| fail(err)),
    };
    let global =
        SyncStateStore::open(&config.state_file, None).unwrap_or_else(|err| fail(err));
    match Project::init(&target, &global, &config.project_state_filename) {
        Ok((project, migrated)) => println!(
            "Initialized project at {} ({migrated} mapping(s) migrated)",
            project.root().display()
        ),
        Err(err) => fail(err),
    }
}

fn diff_command(old: &Path, new: &Path) {
    let output = conflict::diff(&read(new), &read(old));
    if output.is_empty() {
        println!("Files are identical.");
        return;
    }
    print!("{output}");
    std::process::exit(1);
}
