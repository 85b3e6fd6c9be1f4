//! Database initialization and status

use anyhow::{Context, Result};
use monetary_persistence::SqliteStore;
use std::path::Path;
use std::time::Duration;

fn database_url(db_path: &Path) -> String {
    format!("sqlite:{}", db_path.display())
}

/// Open the store, creating the file and schema when missing
pub async fn open(db_path: &Path, acquire_timeout: Duration) -> Result<SqliteStore> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }

    SqliteStore::connect(&database_url(db_path), acquire_timeout)
        .await
        .with_context(|| format!("Failed to open database {:?}", db_path))
}

/// Initialize the database with schema
pub async fn init_database(db_path: &Path, force: bool) -> Result<()> {
    if force && db_path.exists() {
        std::fs::remove_file(db_path).context("Failed to remove existing database")?;
        println!("🗑️  Removed existing database");
    }

    let store = open(db_path, Duration::from_secs(5)).await?;
    store.close().await;
    Ok(())
}

/// Show database status
pub async fn show_status(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        println!("❌ Database not found at {:?}", db_path);
        println!("   Run 'monetary init' to create the database");
        return Ok(());
    }

    let store = open(db_path, Duration::from_secs(5)).await?;
    let counts = store.counts().await.context("Failed to count records")?;

    println!("📊 Database Status");
    println!("   Path: {:?}", db_path);
    println!();
    println!("   Accounts:  {}", counts.accounts);
    println!("   Bindings:  {}", counts.bindings);
    println!("   Balances:  {}", counts.balances);
    println!("   Orders:    {}", counts.orders);
    println!("   Products:  {}", counts.products);

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_nested_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("monetary.db");

        init_database(&path, false).await.unwrap();
        assert!(path.exists());

        // Re-init keeps the file usable
        init_database(&path, true).await.unwrap();
        let store = open(&path, Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.counts().await.unwrap().orders, 0);
    }
}
