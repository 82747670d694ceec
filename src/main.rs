use chrono::Local;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use structure_store::{Config, Database, StructureRecord, StructureUpdate};

#[derive(Parser, Debug)]
#[command(name = "structure-store")]
#[command(author, version, about = "Store database structure descriptions per connection")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// SQLite file to use (overrides STRUCTURE_STORE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a new structure for a connection
    Create {
        /// Database connection id the structure belongs to
        #[arg(short, long)]
        connection: i64,

        /// Structure text
        structure: String,
    },

    /// Show one structure by id
    Get {
        id: i64,
    },

    /// List structures of a connection
    List {
        /// Database connection id
        connection: i64,

        /// Include soft-deleted structures
        #[arg(long)]
        include_deleted: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Change the structure text or the deleted flag
    Update {
        id: i64,

        /// New structure text
        #[arg(short, long)]
        structure: Option<String>,

        /// New deleted flag
        #[arg(long)]
        deleted: Option<bool>,
    },

    /// Soft-delete a structure
    Delete {
        id: i64,
    },

    /// Undo a soft delete
    Restore {
        id: i64,
    },

    /// Show the newest live structure of a connection
    Latest {
        connection: i64,
    },

    /// Show record counts
    Summary,

    /// Start the JSON API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001")]
        port: u16,
    },

    /// Create a backup of the database
    Backup {
        /// Output path for backup (default: structure_store_backup_<timestamp>.db)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let config = match args.db {
        Some(path) => config.with_db_path(path),
        None => config,
    };

    let db = match Database::open_with(&config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(db, args.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(db: Database, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Create { connection, structure } => {
            let record = db.create(&structure, connection)?;
            println!("Created structure {} (connection: {})", record.id, record.database_connection_id);
        }

        Command::Get { id } => {
            let record = db.find_by_id(id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Command::List { connection, include_deleted, json } => {
            let records = db.list_by_connection(connection, include_deleted)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No structures found.");
            } else {
                print_table(&records);
            }
        }

        Command::Update { id, structure, deleted } => {
            let changes = StructureUpdate {
                structure: structure.map(Some),
                deleted,
            };
            let record = db.update(id, &changes)?;
            println!("Updated structure {} (deleted: {})", record.id, record.deleted);
        }

        Command::Delete { id } => {
            let record = db.soft_delete(id)?;
            println!("Deleted structure {}", record.id);
        }

        Command::Restore { id } => {
            let record = db.restore(id)?;
            println!("Restored structure {}", record.id);
        }

        Command::Latest { connection } => match db.latest_for_connection(connection)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("No live structure for connection {}.", connection),
        },

        Command::Summary => {
            let summary = db.get_summary()?;
            println!("Total:       {}", summary.total);
            println!("Active:      {}", summary.active);
            println!("Deleted:     {}", summary.deleted);
            println!("Connections: {}", summary.connections);
        }

        Command::Serve { port } => {
            structure_store::serve::start(port, db)?;
        }

        Command::Backup { output } => {
            let (path, bytes) = backup(&db, output)?;
            println!("Backup created: {} ({} bytes)", path.display(), bytes);
        }
    }

    Ok(())
}

fn print_table(records: &[StructureRecord]) {
    println!("{:<6} {:<10} {:<8} {}", "ID", "CONN", "DELETED", "STRUCTURE");
    println!("{}", "-".repeat(70));
    for r in records {
        println!(
            "{:<6} {:<10} {:<8} {}",
            r.id,
            r.database_connection_id,
            r.deleted,
            truncate(&first_line(&r.structure), 44)
        );
    }
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or("").to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

fn backup(db: &Database, output: Option<PathBuf>) -> structure_store::Result<(PathBuf, u64)> {
    let backup_path = output.unwrap_or_else(|| {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        PathBuf::from(format!("structure_store_backup_{}.db", timestamp))
    });

    let bytes = db.backup_to(&backup_path)?;
    Ok((backup_path, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_at_width_boundary() {
        assert_eq!(truncate("abcde", 5), "abcde");
        assert_eq!(truncate("abcdef", 5), "ab...");
        assert_eq!(truncate("", 5), "");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("ééééé", 5), "ééééé");
        assert_eq!(truncate("éééééé", 5), "éé...");
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("CREATE TABLE t(\n  x INT\n)"), "CREATE TABLE t(");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn test_backup_copies_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path().join("source.db")).unwrap();
        db.create("CREATE TABLE t(x INT)", 1).unwrap();

        let target = dir.path().join("copy.db");
        let (path, bytes) = backup(&db, Some(target.clone())).unwrap();
        assert_eq!(path, target);
        assert_eq!(std::fs::metadata(&target).unwrap().len(), bytes);

        let copy = Database::open_at(&target).unwrap();
        assert_eq!(copy.list_by_connection(1, false).unwrap().len(), 1);
    }

    #[test]
    fn test_backup_refuses_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path().join("source.db")).unwrap();
        let target = dir.path().join("copy.db");
        std::fs::write(&target, b"occupied").unwrap();

        assert!(backup(&db, Some(target.clone())).is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"occupied");
    }
}
