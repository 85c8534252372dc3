//! Version-controlled historical draw table.
//!
//! The file is a JSON array of rows ordered by draw number. It is append-only
//! as draws close, so duplicate or out-of-order rows are rejected at load time.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::models::StaticDrawRow;

pub fn load_static_dataset(path: &Path) -> Result<Vec<StaticDrawRow>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read static draw dataset {}", path.display()))?;
    let rows = parse_static_dataset(&raw)
        .with_context(|| format!("parse static draw dataset {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = rows.len(),
        last_draw = rows.last().map(|r| r.draw_number).unwrap_or(0),
        "static draw dataset loaded"
    );
    Ok(rows)
}

pub fn parse_static_dataset(raw: &str) -> Result<Vec<StaticDrawRow>> {
    let rows: Vec<StaticDrawRow> = serde_json::from_str(raw).context("static dataset json")?;

    let mut prev: Option<u64> = None;
    for row in &rows {
        if row.draw_number == 0 {
            anyhow::bail!("static dataset contains draw number 0");
        }
        if let Some(p) = prev {
            if row.draw_number <= p {
                anyhow::bail!(
                    "static dataset is not strictly increasing: draw {} follows {}",
                    row.draw_number,
                    p
                );
            }
        }
        prev = Some(row.draw_number);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ROWS: &str = r#"[
        {"drawNumber":1,"date":"2024-01-05","prizePool":1000000,"jackpotted":850000,
         "ngrAdded":120000,"singlesAdded":10000,"prizepoolSplit":"30-14-8-9-7-6-5-10-11"},
        {"drawNumber":2,"date":"2024-01-12","prizePool":"1100000","jackpotted":null,
         "ngrAdded":"","singlesAdded":null}
    ]"#;

    #[test]
    fn test_parse_static_dataset() {
        let rows = parse_static_dataset(ROWS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ngr_added, Some(120_000.0));
        assert_eq!(rows[1].ngr_added, None);
        assert_eq!(rows[1].jackpotted, None);
    }

    #[test]
    fn test_rejects_out_of_order_rows() {
        let raw = r#"[
            {"drawNumber":3,"date":"2024-01-19","prizePool":1},
            {"drawNumber":2,"date":"2024-01-12","prizePool":1}
        ]"#;
        let err = parse_static_dataset(raw).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ROWS.as_bytes()).unwrap();
        let rows = load_static_dataset(file.path()).unwrap();
        assert_eq!(rows.last().unwrap().draw_number, 2);
    }
}
