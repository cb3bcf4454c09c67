use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use histstruct::classifier::{HistogramClassifier, MaxPullClassifier, TemplateClassifier};
use histstruct::data::loader::load_file;
use histstruct::data::selection::Certification;
use histstruct::figure::{FigureSink, JsonFigureSink, LumisectionPlot, Reco};
use histstruct::{Config, HistStruct, PrepareOptions};

/// Build, inspect and evaluate aligned histogram structures
#[derive(Parser)]
#[command(name = "histstruct")]
#[command(version)]
#[command(about = "Build, inspect and evaluate aligned per-lumisection histogram structures")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON configuration file (certification files, thresholds)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a structure from a raw histogram table
    Build {
        /// Raw table (.parquet, .json or .csv)
        input: PathBuf,
        /// Output file; the .hstruct extension is enforced
        #[arg(short, long)]
        output: PathBuf,
        /// Keep raw bin contents instead of normalizing to unit sum
        #[arg(long)]
        no_normalize: bool,
        /// Rebinning factor per histogram dimension, e.g. `2` or `2,2`
        #[arg(long, value_delimiter = ',')]
        rebin: Option<Vec<usize>>,
        /// Add a "golden" mask from the golden certification file
        #[arg(long)]
        golden: bool,
        /// Add a "dcson" mask from the DCS-on certification file
        #[arg(long)]
        dcson: bool,
        /// Add a "highstat" mask; uses the configured threshold unless `--min-entries-per-bin` is set
        #[arg(long)]
        highstat: bool,
        #[arg(long)]
        min_entries_per_bin: Option<f64>,
    },
    /// Summarize a saved structure
    Inspect { file: PathBuf },
    /// Fit a built-in classifier on masked rows, evaluate it on all rows and save
    Evaluate {
        file: PathBuf,
        /// Histogram type to evaluate
        #[arg(long = "type")]
        type_name: String,
        #[arg(long, value_enum, default_value_t = ClassifierKind::Template)]
        classifier: ClassifierKind,
        /// Masks selecting the reference rows the classifier is fitted on
        #[arg(long, value_delimiter = ',')]
        train_masks: Vec<String>,
    },
    /// Print the scores of one lumisection
    Scores {
        file: PathBuf,
        #[arg(long)]
        run: i64,
        #[arg(long)]
        ls: i64,
        /// Restrict to these histogram types
        #[arg(long = "type", value_delimiter = ',')]
        types: Vec<String>,
    },
    /// Write figure descriptions for every lumisection of a run as JSON
    Plot {
        file: PathBuf,
        #[arg(long)]
        run: i64,
        #[arg(long, value_delimiter = ',')]
        masks: Vec<String>,
        /// Overlay the reconstruction of the bound classifiers
        #[arg(long)]
        reco: bool,
        /// Output directory
        #[arg(short, long, default_value = "figures")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassifierKind {
    Template,
    Maxpull,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("reading config {}", path.display()))?,
        None => Config::from_env(),
    };

    match cli.command {
        Commands::Build {
            input,
            output,
            no_normalize,
            rebin,
            golden,
            dcson,
            highstat,
            min_entries_per_bin,
        } => {
            let raw = load_file(&input).with_context(|| format!("loading {}", input.display()))?;
            let options = PrepareOptions {
                crop: None,
                normalize: !no_normalize,
                rebin,
            };
            let mut hs = HistStruct::new();
            hs.add_raw_table(&raw, &options)?;
            if golden {
                hs.add_certification_mask("golden", Certification::Golden, &config)?;
            }
            if dcson {
                hs.add_certification_mask("dcson", Certification::DcsOn, &config)?;
            }
            if highstat || min_entries_per_bin.is_some() {
                let threshold = min_entries_per_bin.unwrap_or(config.min_entries_per_bin);
                hs.add_statistics_mask("highstat", None, threshold)?;
            }
            let written = hs.save(&output)?;
            println!("wrote {} ({} lumisections)", written.display(), hs.len());
        }
        Commands::Inspect { file } => {
            let hs = open(&file)?;
            print_summary(&hs)?;
        }
        Commands::Evaluate {
            file,
            type_name,
            classifier,
            train_masks,
        } => {
            let mut hs = open(&file)?;
            let masks: Vec<&str> = train_masks.iter().map(String::as_str).collect();
            let selected = (!masks.is_empty()).then_some(masks.as_slice());
            let reference = hs.get_array(&type_name, selected)?;
            let model: Box<dyn HistogramClassifier> = match classifier {
                ClassifierKind::Template => Box::new(TemplateClassifier::fit(reference.view())?),
                ClassifierKind::Maxpull => Box::new(MaxPullClassifier::fit(reference.view())?),
            };
            let scores = hs
                .bind_classifier(&type_name, model, true)?
                .context("classifier produced no scores")?;
            let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            println!("evaluated {} lumisections of '{type_name}', max score {max:.4}", scores.len());
            hs.save(&file)?;
        }
        Commands::Scores { file, run, ls, types } => {
            let hs = open(&file)?;
            let names: Vec<&str> = types.iter().map(String::as_str).collect();
            let selected = (!names.is_empty()).then_some(names.as_slice());
            for (name, score) in hs.get_scores_at(run, ls, selected, false)? {
                match score {
                    Some(s) => println!("{name}\t{s:.6}"),
                    None => println!("{name}\t-"),
                }
            }
        }
        Commands::Plot {
            file,
            run,
            masks,
            reco,
            output,
        } => {
            let hs = open(&file)?;
            let masks: Vec<&str> = masks.iter().map(String::as_str).collect();
            let plot = LumisectionPlot {
                reco: if reco { Reco::Auto } else { Reco::None },
                ..Default::default()
            };
            let selected = (!masks.is_empty()).then_some(masks.as_slice());
            let figures = hs.run_figures(run, selected, &plot)?;
            let mut sink = JsonFigureSink::new(&output)?;
            for figure in &figures {
                sink.render(figure)?;
            }
            println!("wrote {} figures to {}", sink.written(), output.display());
        }
    }
    Ok(())
}

fn open(path: &Path) -> Result<HistStruct> {
    HistStruct::load(path).with_context(|| format!("loading {}", path.display()))
}

fn print_summary(hs: &HistStruct) -> Result<()> {
    let runs: std::collections::BTreeSet<i64> = hs.get_run_ids(None)?.into_iter().collect();
    println!("{} lumisections in {} runs", hs.len(), runs.len());
    println!("histogram types:");
    for name in hs.type_names() {
        let shape = hs.get_array(name, None)?.shape().to_vec();
        let classifier = hs.classifier(name).map(|c| c.kind()).unwrap_or("-");
        let scored = if hs.has_scores(name) { "scored" } else { "no scores" };
        println!("  {name}  shape {shape:?}  classifier {classifier}  {scored}");
    }
    println!("masks:");
    for name in hs.mask_names() {
        let selected = hs.get_mask(&name)?.iter().filter(|&&keep| keep).count();
        println!("  {name}  {selected}/{}", hs.len());
    }
    Ok(())
}
