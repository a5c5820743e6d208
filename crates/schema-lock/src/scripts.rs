use crate::error::LockError;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

/// Lists the `.sql` files in the migrations directory, sorted by file name.
/// Versioned scripts are applied in lexical order.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, LockError> {
    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("sql") {
            scripts.push(path);
        }
    }
    scripts.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(scripts)
}

/// The script's version is its file name; that is what the history table
/// records.
pub fn version(path: &Path) -> Result<String, LockError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| LockError::InvalidScriptPath(path.to_path_buf()))
}

/// Filters out scripts whose version is already recorded in the history
/// table.
pub fn pending(scripts: Vec<PathBuf>, applied: &HashSet<String>) -> Vec<PathBuf> {
    scripts
        .into_iter()
        .filter(|path| {
            version(path)
                .map(|v| !applied.contains(&v))
                .unwrap_or(false)
        })
        .collect()
}

/// Splits a script into individual statements. The driver executes one
/// statement per round trip; comment-only and empty fragments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|stmt| {
            stmt.lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|stmt| stmt.trim().to_string())
        .filter(|stmt| !stmt.is_empty())
        .collect()
}
