use crate::market_data::{ensure_market_data_file, load_bars, save_snapshot};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(input_path: &Path, output_path: &Path) -> Result<()> {
    ensure_market_data_file(input_path)?;
    info!(
        "Generating market data snapshot at {} from {}",
        output_path.display(),
        input_path.display()
    );

    let bars = load_bars(input_path)?;
    save_snapshot(output_path, &bars)?;
    info!(
        "Market data snapshot with {} bars successfully written to {}",
        bars.len(),
        output_path.display()
    );

    Ok(())
}
