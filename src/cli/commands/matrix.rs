//! Build matrix listing.

use crate::cli::RuntimeConfig;
use crate::error::Result;
use crate::matrix::{BuildMatrix, MatrixEntry, OperatingSystem};

pub(super) fn execute_matrix(
    os: Option<OperatingSystem>,
    json: bool,
    config: &RuntimeConfig,
) -> Result<i32> {
    let matrix = BuildMatrix::standard();
    let entries: Vec<&MatrixEntry> = match os {
        Some(os) => matrix.for_os(os),
        None => matrix.entries().iter().collect(),
    };

    if json {
        let rendered = serde_json::to_string_pretty(&entries)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        config.output().result(&rendered);
        return Ok(0);
    }

    let width = entries
        .iter()
        .map(|e| e.target.as_str().len())
        .max()
        .unwrap_or(0);
    let mut table = String::new();
    for entry in entries {
        table.push_str(&format!(
            "{:<6}  {:<width$}  {}\n",
            entry.os.as_str(),
            entry.target.as_str(),
            entry.image,
            width = width
        ));
    }
    config.output().result(&table);
    Ok(0)
}
