use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;

/// Write a synthetic raw histogram table to a parquet file
#[derive(Parser)]
struct Args {
    #[arg(short, long, default_value = "sample_histograms.parquet")]
    output: PathBuf,
    #[arg(long, default_value_t = 3)]
    runs: i64,
    #[arg(long, default_value_t = 50)]
    lumisections: i64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Shape of one synthetic monitoring element.
struct HistogramKind {
    name: &'static str,
    xbins: usize,
    ybins: usize,
    mu: f64,
    sigma: f64,
}

const KINDS: &[HistogramKind] = &[
    HistogramKind { name: "chargeInner_PXLayer_1", xbins: 102, ybins: 1, mu: 40.0, sigma: 9.0 },
    HistogramKind { name: "chargeInner_PXLayer_2", xbins: 102, ybins: 1, mu: 45.0, sigma: 11.0 },
    HistogramKind { name: "clusterposition_zphi_ring_1", xbins: 20, ybins: 10, mu: 10.0, sigma: 4.0 },
];

/// Noisy gaussian bin counts scaled to roughly `entries` in total.
/// 2D kinds are the outer product of the same profile along both axes.
fn fill(kind: &HistogramKind, entries: f64, shift: f64, rng: &mut SimpleRng) -> Vec<f64> {
    let profile = |i: usize, n: usize| {
        let x = i as f64 * kind.xbins as f64 / n as f64;
        gaussian(x, kind.mu + shift, kind.sigma, 1.0)
    };
    let shape: Vec<f64> = (0..kind.ybins)
        .flat_map(|y| (0..kind.xbins).map(move |x| (x, y)))
        .map(|(x, y)| {
            let along_y = if kind.ybins > 1 { profile(y, kind.ybins) } else { 1.0 };
            profile(x, kind.xbins) * along_y
        })
        .collect();
    let total: f64 = shape.iter().sum();
    shape
        .iter()
        .map(|s| {
            let expected = entries * s / total;
            (expected + rng.gauss(0.0, expected.sqrt())).round().max(0.0)
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    let mut hnames: Vec<&str> = Vec::new();
    let mut runs: Vec<i64> = Vec::new();
    let mut lss: Vec<i64> = Vec::new();
    let mut entries: Vec<f64> = Vec::new();
    let mut xbins: Vec<i64> = Vec::new();
    let mut ybins: Vec<i64> = Vec::new();
    let mut histo = ListBuilder::new(Float64Builder::new());

    for run_offset in 0..args.runs {
        let run = 297050 + run_offset;
        for ls in 1..=args.lumisections {
            // Every tenth lumisection is a low-statistics one, every
            // seventeenth is shifted to give the classifiers something to find.
            let nominal = if ls % 10 == 0 { 500.0 } else { 50_000.0 };
            let shift = if ls % 17 == 0 { 15.0 } else { 0.0 };
            for kind in KINDS {
                let bins = fill(kind, nominal * rng.next_f64().mul_add(0.2, 0.9), shift, &mut rng);
                hnames.push(kind.name);
                runs.push(run);
                lss.push(ls);
                entries.push(bins.iter().sum());
                xbins.push(kind.xbins as i64);
                ybins.push(kind.ybins as i64);
                histo.values().append_slice(&bins);
                histo.append(true);
            }
        }
    }
    let n_rows = runs.len();

    let schema = Arc::new(Schema::new(vec![
        Field::new("hname", DataType::Utf8, false),
        Field::new("run", DataType::Int64, false),
        Field::new("ls", DataType::Int64, false),
        Field::new("entries", DataType::Float64, false),
        Field::new("histo", DataType::List(Arc::new(Field::new("item", DataType::Float64, true))), false),
        Field::new("xbins", DataType::Int64, false),
        Field::new("ybins", DataType::Int64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(hnames)),
            Arc::new(Int64Array::from(runs)),
            Arc::new(Int64Array::from(lss)),
            Arc::new(Float64Array::from(entries)),
            Arc::new(histo.finish()),
            Arc::new(Int64Array::from(xbins)),
            Arc::new(Int64Array::from(ybins)),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;

    println!(
        "Wrote {n_rows} histograms ({} types, {} runs x {} lumisections) to {}",
        KINDS.len(),
        args.runs,
        args.lumisections,
        args.output.display()
    );
    Ok(())
}
