use crate::models::RawBar;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const MARKET_DATA_SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct MarketDataSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    bars: Vec<RawBar>,
}

/// Loads raw bars from a `.json` array or a `.bin` snapshot, sorted by
/// timestamp.
pub fn load_bars<P: AsRef<Path>>(path: P) -> Result<Vec<RawBar>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open market data at {}", path.display()))?;
    let reader = BufReader::new(file);

    let bars: Vec<RawBar> = match extension(path).as_deref() {
        Some("json") => serde_json::from_reader(reader)
            .with_context(|| format!("Invalid market data JSON in {}", path.display()))?,
        Some("bin") => {
            let snapshot: MarketDataSnapshot =
                bincode::deserialize_from(reader).context("Snapshot decode failed")?;
            if snapshot.version != MARKET_DATA_SNAPSHOT_VERSION {
                return Err(anyhow!(
                    "Market data snapshot version mismatch (found {}, expected {})",
                    snapshot.version,
                    MARKET_DATA_SNAPSHOT_VERSION
                ));
            }
            snapshot.bars
        }
        _ => {
            return Err(anyhow!(
                "Unsupported market data format for {} (expected .json or .bin)",
                path.display()
            ))
        }
    };

    let bars = normalize_bars(bars)
        .with_context(|| format!("Market data in {} rejected", path.display()))?;
    info!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}

/// Writes `bars` as a versioned bincode snapshot.
pub fn save_snapshot<P: AsRef<Path>>(path: P, bars: &[RawBar]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create snapshot directory {}", parent.display())
            })?;
        }
    }

    let file = File::create(path).with_context(|| {
        format!(
            "Unable to create market data snapshot at {}",
            path.display()
        )
    })?;
    let mut writer = BufWriter::new(file);
    let snapshot = MarketDataSnapshot {
        version: MARKET_DATA_SNAPSHOT_VERSION,
        generated_at: Utc::now(),
        bars: bars.to_vec(),
    };
    bincode::serialize_into(&mut writer, &snapshot)
        .context("Failed to serialize market data snapshot")?;
    writer
        .flush()
        .context("Failed to flush market data snapshot to disk")?;
    Ok(())
}

pub fn ensure_market_data_file(path: &Path) -> Result<()> {
    if fs::metadata(path).is_ok() {
        return Ok(());
    }

    Err(anyhow!(
        "Market data not found at {}. Provide a JSON bar file or generate a snapshot with `export-market-data`.",
        path.display()
    ))
}

/// Sorts bars ascending and rejects duplicate timestamps.
pub fn normalize_bars(mut bars: Vec<RawBar>) -> Result<Vec<RawBar>> {
    bars.sort_by_key(|bar| bar.timestamp);
    if let Some(pair) = bars
        .windows(2)
        .find(|pair| pair[0].timestamp == pair[1].timestamp)
    {
        return Err(anyhow!("Duplicate bar timestamp {}", pair[1].timestamp));
    }
    Ok(bars)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("replay-market-data-{}", uuid::Uuid::new_v4()))
    }

    fn sample_bars() -> Vec<RawBar> {
        (0..5)
            .map(|i| RawBar {
                timestamp: Utc.with_ymd_and_hms(2024, 12, 11, 14, 30, 0).unwrap()
                    + Duration::minutes(15 * i),
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 1_000.0,
            })
            .collect()
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = temp_dir();
        let path = dir.join("bars.bin");
        let bars = sample_bars();

        save_snapshot(&path, &bars).unwrap();
        let loaded = load_bars(&path).unwrap();
        assert_eq!(loaded, bars);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_bars_are_sorted_on_load() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bars.json");
        let mut bars = sample_bars();
        bars.reverse();
        fs::write(&path, serde_json::to_string(&bars).unwrap()).unwrap();

        let loaded = load_bars(&path).unwrap();
        assert_eq!(loaded, sample_bars());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn duplicate_timestamps_are_rejected() {
        let mut bars = sample_bars();
        bars[3].timestamp = bars[2].timestamp;
        assert!(normalize_bars(bars).is_err());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bars.csv");
        fs::write(&path, "timestamp,open").unwrap();
        assert!(load_bars(&path).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
