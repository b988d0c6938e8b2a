//! Project initialization for ctxstore
//!
//! `ctxstore init` creates the `.ctxstore/` directory with a commented
//! config file and an empty database, registers the server for MCP clients
//! in `.mcp.json` and keeps the database out of git.

use crate::config::{PoolConfig, CONFIG_DIR};
use crate::db::Database;
use colored::Colorize;
use std::fs;
use std::path::Path;

const CONFIG_TOML: &str = r#"# ctxstore configuration
# Environment overrides: CTXSTORE_DB_PATH, CTXSTORE_LOG

[database]
# Relative paths resolve against the directory containing .ctxstore/
path = ".ctxstore/ctxstore.db"

[pool]
max_size = 10
connection_timeout_ms = 2000
idle_timeout_ms = 30000
busy_timeout_ms = 5000
connect_retries = 5
retry_backoff_ms = 200

[server]
name = "ctxstore"
drain_timeout_ms = 5000

[logging]
filter = "info"
json = false
"#;

const MCP_JSON: &str = r#"{
  "mcpServers": {
    "ctxstore": {
      "command": "ctxstore",
      "args": ["serve"]
    }
  }
}
"#;

/// Initialize ctxstore in `root`
pub fn init_project(root: &Path) -> Result<(), String> {
    println!("\n{}", "Initializing ctxstore...".cyan().bold());
    println!("   Directory: {}\n", root.display());

    let store_dir = root.join(CONFIG_DIR);
    create_dir_if_missing(&store_dir)?;

    write_file_if_missing(
        &store_dir.join("config.toml"),
        CONFIG_TOML,
        ".ctxstore/config.toml",
    )?;

    let db_path = store_dir.join("ctxstore.db");
    if db_path.exists() {
        println!("   {} .ctxstore/ctxstore.db (already exists)", "Skipping".yellow());
    } else {
        let db = Database::open_with(&db_path, &PoolConfig::default())
            .map_err(|e| format!("Could not create database: {}", e))?;
        db.shutdown(std::time::Duration::from_secs(1));
        println!("   {} .ctxstore/ctxstore.db", "Creating".green());
    }

    write_file_if_missing(&root.join(".mcp.json"), MCP_JSON, ".mcp.json")?;

    add_to_gitignore(root)?;

    println!("\n{}", "ctxstore initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Run {} to check the database", "ctxstore health".cyan());
    println!("  2. Run {} to list the available tools", "ctxstore tools".cyan());
    println!("  3. Restart your MCP client so it picks up {}", ".mcp.json".cyan());
    println!();

    Ok(())
}

fn create_dir_if_missing(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Could not create {}: {}", path.display(), e))?;
        println!("   {} {}", "Creating".green(), path.display());
    }
    Ok(())
}

fn write_file_if_missing(path: &Path, content: &str, display_name: &str) -> Result<(), String> {
    if path.exists() {
        println!("   {} {} (already exists)", "Skipping".yellow(), display_name);
    } else {
        fs::write(path, content)
            .map_err(|e| format!("Could not write {}: {}", display_name, e))?;
        println!("   {} {}", "Creating".green(), display_name);
    }
    Ok(())
}

fn add_to_gitignore(root: &Path) -> Result<(), String> {
    let gitignore_path = root.join(".gitignore");
    let entry = ".ctxstore/*.db*";

    let existing = if gitignore_path.exists() {
        fs::read_to_string(&gitignore_path)
            .map_err(|e| format!("Could not read .gitignore: {}", e))?
    } else {
        String::new()
    };

    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }

    let new_content = if existing.is_empty() {
        format!("# ctxstore database (local)\n{}\n", entry)
    } else {
        format!("{}\n\n# ctxstore database (local)\n{}\n", existing.trim_end(), entry)
    };
    fs::write(&gitignore_path, new_content)
        .map_err(|e| format!("Could not update .gitignore: {}", e))?;
    println!("   {} .gitignore (added {})", "Updated".green(), entry);
    Ok(())
}
