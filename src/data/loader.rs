use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray,
    ListArray, StringArray,
};
use arrow::datatypes::{DataType, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{RawHistogram, RawTable};

/// Accepted spellings of the run-number column.
const RUN_COLUMNS: &[&str] = &["run", "fromrun"];
/// Accepted spellings of the lumisection-number column.
const LS_COLUMNS: &[&str] = &["ls", "fromlumi"];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a raw histogram table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – Parquet file with a `histo` list column (recommended)
/// * `.json`    – `[{ "hname": ..., "run": ..., "ls": ..., "entries": ..., "histo": [...] }, ...]`
/// * `.csv`     – column `histo` containing semicolon-separated floats
///
/// Every format may carry optional `xbins` / `ybins` columns describing the
/// bin layout; without them a histogram is 1D with `len(histo)` bins.
pub fn load_file(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }?;
    log::info!(
        "loaded {} raw histograms ({} types) from {}",
        table.len(),
        table.hist_names().len(),
        path.display()
    );
    Ok(table)
}

/// Build the bin layout from the optional `xbins` / `ybins` columns.
fn resolve_shape(nbins: usize, xbins: Option<i64>, ybins: Option<i64>, row: usize) -> Result<Vec<usize>> {
    let shape = match (xbins, ybins) {
        (Some(x), Some(y)) if y > 1 => vec![y as usize, x as usize],
        (Some(x), _) => vec![x as usize],
        (None, _) => vec![nbins],
    };
    if shape.iter().product::<usize>() != nbins {
        bail!("Row {row}: bin layout {shape:?} does not match {nbins} bin values");
    }
    Ok(shape)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   {
///     "hname": "chargeInner_PXLayer_1",
///     "run": 297050,
///     "ls": 12,
///     "entries": 5321,
///     "histo": [0.0, 12.0, 40.0, ...]
///   },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let hname = obj
            .get("hname")
            .and_then(|v| v.as_str())
            .with_context(|| format!("Row {i}: missing or invalid 'hname'"))?
            .to_string();
        let run = json_first_integer(obj, RUN_COLUMNS)
            .with_context(|| format!("Row {i}: missing or invalid run number"))?;
        let ls = json_first_integer(obj, LS_COLUMNS)
            .with_context(|| format!("Row {i}: missing or invalid lumisection number"))?;
        let entries = obj
            .get("entries")
            .and_then(|v| v.as_f64())
            .with_context(|| format!("Row {i}: missing or invalid 'entries'"))?;
        let bins = json_array_to_f64(obj.get("histo"), i, "histo")?;
        let xbins = obj.get("xbins").and_then(|v| v.as_i64());
        let ybins = obj.get("ybins").and_then(|v| v.as_i64());
        let shape = resolve_shape(bins.len(), xbins, ybins, i)?;

        rows.push(RawHistogram { hname, run, ls, entries, bins, shape });
    }

    Ok(RawTable::from_rows(rows))
}

fn json_first_integer(obj: &serde_json::Map<String, JsonValue>, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// The `histo` column contains semicolon-separated floats: `"0.0;12.0;40.0"`.
fn load_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));
    let hname_idx = find(&["hname"]).context("CSV missing 'hname' column")?;
    let run_idx = find(RUN_COLUMNS).context("CSV missing run number column")?;
    let ls_idx = find(LS_COLUMNS).context("CSV missing lumisection number column")?;
    let entries_idx = find(&["entries"]).context("CSV missing 'entries' column")?;
    let histo_idx = find(&["histo"]).context("CSV missing 'histo' column")?;
    let xbins_idx = find(&["xbins"]);
    let ybins_idx = find(&["ybins"]);

    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let run = parse_integer(field(run_idx))
            .with_context(|| format!("CSV row {row_no}: invalid run number"))?;
        let ls = parse_integer(field(ls_idx))
            .with_context(|| format!("CSV row {row_no}: invalid lumisection number"))?;
        let entries = field(entries_idx)
            .parse::<f64>()
            .with_context(|| format!("CSV row {row_no}: invalid entries"))?;
        let bins = parse_semicolon_floats(field(histo_idx), row_no, "histo")?;
        let xbins = xbins_idx.and_then(|i| parse_integer(field(i)).ok());
        let ybins = ybins_idx.and_then(|i| parse_integer(field(i)).ok());
        let shape = resolve_shape(bins.len(), xbins, ybins, row_no)?;

        rows.push(RawHistogram {
            hname: field(hname_idx).to_string(),
            run,
            ls,
            entries,
            bins,
            shape,
        });
    }

    Ok(RawTable::from_rows(rows))
}

/// Integers may have been written as floats (`297050.0`) by the producer.
fn parse_integer(s: &str) -> Result<i64> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok(i);
    }
    let f = s
        .parse::<f64>()
        .with_context(|| format!("'{s}' is not a number"))?;
    Ok(f as i64)
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing raw histograms.
///
/// Expected schema:
/// - `hname`: Utf8
/// - `run` / `fromrun`, `ls` / `fromlumi`: Int32 or Int64
/// - `entries`: any numeric type
/// - `histo`: List<Float64> or LargeList<Float64>
/// - `xbins`, `ybins`: optional integer columns
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let n_rows = batch.num_rows();

        let hname_col = batch.column(required_column(&schema, &["hname"])?);
        let run_col = batch.column(required_column(&schema, RUN_COLUMNS)?);
        let ls_col = batch.column(required_column(&schema, LS_COLUMNS)?);
        let entries_col = batch.column(required_column(&schema, &["entries"])?);
        let histo_col = batch.column(required_column(&schema, &["histo"])?);
        let xbins_col = schema.index_of("xbins").ok().map(|i| batch.column(i));
        let ybins_col = schema.index_of("ybins").ok().map(|i| batch.column(i));

        for row in 0..n_rows {
            let hname = extract_string(hname_col, row)
                .with_context(|| format!("Row {row}: failed to read 'hname'"))?;
            let run = extract_number(run_col, row)
                .with_context(|| format!("Row {row}: failed to read run number"))? as i64;
            let ls = extract_number(ls_col, row)
                .with_context(|| format!("Row {row}: failed to read lumisection number"))? as i64;
            let entries = extract_number(entries_col, row)
                .with_context(|| format!("Row {row}: failed to read 'entries'"))?;
            let bins = extract_f64_list(histo_col, row)
                .with_context(|| format!("Row {row}: failed to read 'histo'"))?;
            let xbins = xbins_col.and_then(|c| extract_number(c, row).ok()).map(|v| v as i64);
            let ybins = ybins_col.and_then(|c| extract_number(c, row).ok()).map(|v| v as i64);
            let shape = resolve_shape(bins.len(), xbins, ybins, row)?;

            rows.push(RawHistogram { hname, run, ls, entries, bins, shape });
        }
    }

    Ok(RawTable::from_rows(rows))
}

// -- Parquet / Arrow helpers --

fn required_column(schema: &Schema, names: &[&str]) -> Result<usize> {
    names
        .iter()
        .find_map(|n| schema.index_of(n).ok())
        .with_context(|| format!("Parquet file missing '{}' column", names[0]))
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(0.0)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(0.0) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a numeric cell as `f64`, whatever its integer or float width.
fn extract_number(col: &Arc<dyn Array>, row: usize) -> Result<f64> {
    if col.is_null(row) {
        bail!("null value in numeric column");
    }
    let value = match col.data_type() {
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .map(|a| a.value(row) as f64),
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| a.value(row) as f64),
        DataType::Float32 => col
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.value(row) as f64),
        DataType::Float64 => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.value(row)),
        other => bail!("Expected a numeric column, got {other:?}"),
    };
    value.context("unexpected array layout for numeric column")
}

fn extract_string(col: &Arc<dyn Array>, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null value in string column");
    }
    match col.data_type() {
        DataType::Utf8 => {
            let s = col
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected StringArray")?;
            Ok(s.value(row).to_string())
        }
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("Expected a string column, got {other:?}"),
    }
}
