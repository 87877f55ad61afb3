//! Result output formatting and writing.

use crate::runner::RunResults;
use crate::OutputFormat;
use anyhow::Result;
use std::io::Write;
use std::path::Path;

fn join(values: &[f64], sep: &str) -> String {
    values
        .iter()
        .map(|v| format!("{v:.6}"))
        .collect::<Vec<_>>()
        .join(sep)
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.6}"))
}

/// Render results in the chosen format.
pub fn render(results: &RunResults, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(out, "Run: {}", results.name)?;
            writeln!(out, "Data rate: {} Gb/s, {} samples/UI", results.data_rate_gbps, results.samples_per_ui)?;
            for lane in &results.lanes {
                writeln!(out)?;
                writeln!(out, "Lane {}", lane.lane)?;
                writeln!(out, "  Model:       {}", lane.message)?;
                writeln!(out, "  Cursors:     {}", join(&lane.cursors, " "))?;
                writeln!(out, "  Boost:       {} dB", opt(lane.boost_db))?;
                if !lane.dfe_taps.is_empty() {
                    writeln!(out, "  DFE taps:    {}", join(&lane.dfe_taps, " "))?;
                    writeln!(out, "  DFE MSE:     {}", opt(lane.dfe_mse))?;
                }
                writeln!(out, "  CDR locked:  {} ({} edges)", lane.cdr_locked, lane.edges)?;
                writeln!(out, "  Bit errors:  {}", lane.bit_errors)?;
                writeln!(out, "  Eye opening: {:.6}", lane.eye_opening)?;
            }
        }
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(results)?)?;
        }
        OutputFormat::Csv => {
            writeln!(out, "lane,boost_db,dfe_taps,dfe_mse,cdr_locked,edges,bit_errors,eye_opening,cursors")?;
            for lane in &results.lanes {
                writeln!(
                    out,
                    "{},{},{},{},{},{},{},{},{}",
                    lane.lane,
                    lane.boost_db.map_or(String::new(), |v| v.to_string()),
                    join(&lane.dfe_taps, ";"),
                    lane.dfe_mse.map_or(String::new(), |v| v.to_string()),
                    lane.cdr_locked,
                    lane.edges,
                    lane.bit_errors,
                    lane.eye_opening,
                    join(&lane.cursors, ";"),
                )?;
            }
        }
    }
    Ok(())
}

/// Write results to `output_dir` as `results.{txt,json,csv}`.
pub fn write_results(results: &RunResults, output_dir: &Path, format: OutputFormat) -> Result<()> {
    let name = match format {
        OutputFormat::Text => "results.txt",
        OutputFormat::Json => "results.json",
        OutputFormat::Csv => "results.csv",
    };
    let path = output_dir.join(name);
    let mut f = std::fs::File::create(&path)?;
    render(results, format, &mut f)?;
    tracing::info!("Wrote results to {:?}", path);
    Ok(())
}
