use arbor::{Node, NodeClient, NodeId, StoreConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and populate a node table
#[derive(Parser)]
#[command(name = "arbor", version, about)]
struct Cli {
    /// Store backend: sqlite, memory or dynamodb
    #[arg(long, global = true)]
    backend: Option<String>,

    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Table name
    #[arg(long, global = true)]
    table: Option<String>,

    /// Name of the ParentID index
    #[arg(long, global = true)]
    index: Option<String>,

    /// Log level for arbor (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the node table and its ParentID index
    CreateTable,
    /// Delete the node table
    DeleteTable,
    /// Print one node
    Get { id: String },
    /// Print the stored children of a node
    Children { id: String },
    /// Print the stored siblings of a node, including itself
    Siblings { id: String },
    /// Delete one node; its children are left in place
    Delete { id: String },
    /// Build a tree, store it and print it
    Seed {
        /// Children per node
        #[arg(long, default_value_t = 3)]
        children: usize,
        /// Levels below the root
        #[arg(long, default_value_t = 2)]
        depth: usize,
        /// Metadata attached to every node
        #[arg(long)]
        metadata: Option<String>,
    },
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(format!("arbor={},sqlx=warn", level)),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("arbor=info,sqlx=warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn grow(node: &mut Node, children: usize, depth: usize, metadata: Option<&str>) {
    if depth == 0 {
        return;
    }
    for _ in 0..children {
        let child = node.create_child();
        if let Some(metadata) = metadata {
            child.set_metadata(metadata);
        }
        grow(child, children, depth - 1, metadata);
    }
}

fn print_nodes(nodes: &[Node]) {
    for node in nodes {
        print!("{}", node);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut config = StoreConfig::from_env()?;
    if let Some(backend) = &cli.backend {
        config.backend = backend.parse()?;
    }
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(table) = cli.table {
        config.client.table_name = table;
    }
    if let Some(index) = cli.index {
        config.client.index_name = index;
    }

    let store = config.open().await?;
    let client = NodeClient::new(store, config.client.clone());
    tracing::debug!(?config, "opened store");

    match cli.command {
        Command::CreateTable => {
            client.create_table().await?;
            println!("created table {}", client.table_name());
        }
        Command::DeleteTable => {
            client.delete_table().await?;
            println!("deleted table {}", client.table_name());
        }
        Command::Get { id } => {
            let node = client.get(&NodeId::parse_str(&id)?).await?;
            print!("{}", node);
            if let Some(metadata) = node.metadata() {
                println!("Metadata: {}", metadata);
            }
        }
        Command::Children { id } => {
            let children = client.children_of(&NodeId::parse_str(&id)?).await?;
            print_nodes(&children);
        }
        Command::Siblings { id } => {
            let node = client.get(&NodeId::parse_str(&id)?).await?;
            let siblings = client.get_siblings(&node).await?;
            print_nodes(&siblings);
        }
        Command::Delete { id } => {
            let id = NodeId::parse_str(&id)?;
            client.delete_by_id(&id).await?;
            println!("deleted {}", id);
        }
        Command::Seed {
            children,
            depth,
            metadata,
        } => {
            let mut root = Node::new();
            if let Some(metadata) = metadata.as_deref() {
                root.set_metadata(metadata);
            }
            grow(&mut root, children, depth, metadata.as_deref());

            client.put_tree(&root).await?;
            tracing::info!(
                root = %root.id(),
                nodes = root.descendant_count() + 1,
                "stored tree"
            );
            print!("{}", root);
        }
    }

    Ok(())
}
