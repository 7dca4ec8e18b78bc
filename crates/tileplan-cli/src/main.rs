//! tileplan CLI: a thin, library-fronting binary. Reads an operator's
//! canonical parameters and options as JSON, runs the planner, and prints
//! the resulting plan and cost as JSON to stdout or a file.
//!
//! This is the one piece of I/O the planner core allows itself: reading
//! plan-constraints/parameters documents and printing a plan. It does not
//! implement code generation, a runtime, or dataset I/O.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use tileplan_core::prelude::{ConvOptions, ConvParams, CtcOptions, CtcParams, EmbeddingParams, PoolParams, SparseMatMulParams, SparseOptions};
use tileplan_core::target::TargetDescriptor;
use tileplan_planner::{plan_convolution, plan_ctc, plan_embedding, plan_pool, plan_sparse};

#[derive(Parser)]
#[command(name = "tileplan")]
#[command(about = "Planning core for decomposing tensor operators across a tiled accelerator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a convolution.
    Conv(OperatorArgs),
    /// Plan a sparse-dense matrix multiply.
    Sparse(OperatorArgs),
    /// Plan a CTC-loss computation.
    Ctc(OperatorArgs),
    /// Plan a pooling operator.
    Pool(OperatorArgs),
    /// Plan an embedding slice/update.
    Embedding(OperatorArgs),
}

#[derive(Parser)]
struct OperatorArgs {
    /// Path to a JSON document with a `params` field (and, for
    /// convolution/sparse/CTC, an `options` field).
    #[arg(short, long)]
    input: PathBuf,

    /// Path to a JSON `TargetDescriptor`. Defaults to a representative
    /// 1216-tile, single-IPU target when omitted.
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Write the plan+cost JSON here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn load_target(path: &Option<PathBuf>) -> Result<TargetDescriptor, Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            let text = fs::read_to_string(p)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(TargetDescriptor::reference_ipu(1216, 1)),
    }
}

fn emit<T: Serialize>(value: &T, output: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(p) => fs::write(p, text)?,
        None => println!("{text}"),
    }
    Ok(())
}

#[derive(serde::Deserialize)]
struct ConvDoc {
    params: ConvParams,
    #[serde(default)]
    options: ConvOptions,
}

#[derive(serde::Deserialize)]
struct SparseDoc {
    params: SparseMatMulParams,
    #[serde(default)]
    options: SparseOptions,
}

#[derive(serde::Deserialize)]
struct CtcDoc {
    params: CtcParams,
    #[serde(default)]
    options: CtcOptions,
}

#[derive(serde::Deserialize)]
struct PoolDoc {
    params: PoolParams,
    #[serde(default)]
    available_memory_proportion: f64,
}

#[derive(serde::Deserialize)]
struct EmbeddingDoc {
    params: EmbeddingParams,
    #[serde(default)]
    available_memory_proportion: f64,
}

fn run_conv(args: &OperatorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let doc: ConvDoc = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let target = load_target(&args.target)?;
    let (plan, cost) = plan_convolution(&doc.params, &target, &doc.options, None)?;
    emit(&(plan, cost), &args.output)
}

fn run_sparse(args: &OperatorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let doc: SparseDoc = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let target = load_target(&args.target)?;
    let (plan, cost) = plan_sparse(&doc.params, &target, &doc.options)?;
    emit(&(plan, cost), &args.output)
}

fn run_ctc(args: &OperatorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let doc: CtcDoc = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let target = load_target(&args.target)?;
    let (plan, cost) = plan_ctc(&doc.params, &target, &doc.options)?;
    emit(&(plan, cost), &args.output)
}

fn run_pool(args: &OperatorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let doc: PoolDoc = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let target = load_target(&args.target)?;
    let (plan, cost) = plan_pool(&doc.params, &target, doc.available_memory_proportion)?;
    emit(&(plan, cost), &args.output)
}

fn run_embedding(args: &OperatorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let doc: EmbeddingDoc = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let target = load_target(&args.target)?;
    let (plan, cost) = plan_embedding(&doc.params, &target, doc.available_memory_proportion)?;
    emit(&(plan, cost), &args.output)
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("TILEPLAN_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Conv(args) => run_conv(args),
        Commands::Sparse(args) => run_sparse(args),
        Commands::Ctc(args) => run_ctc(args),
        Commands::Pool(args) => run_pool(args),
        Commands::Embedding(args) => run_embedding(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv_doc_defaults_options_when_absent() {
        let json = r#"{
            "params": {
                "input_type": "Half",
                "output_type": "Half",
                "batch_size": 1,
                "num_conv_groups": 1,
                "in_chans_per_group": 16,
                "out_chans_per_group": 16,
                "field_shape": [4, 4],
                "kernel_shape": [3, 3],
                "input_transform": [
                    {"truncation_lower": 0, "truncation_upper": 0, "dilation": 1, "padding_lower": 0, "padding_upper": 0, "flip": false},
                    {"truncation_lower": 0, "truncation_upper": 0, "dilation": 1, "padding_lower": 0, "padding_upper": 0, "flip": false}
                ],
                "output_transform": [
                    {"truncation_lower": 0, "truncation_upper": 0, "dilation": 1, "padding_lower": 0, "padding_upper": 0, "flip": false},
                    {"truncation_lower": 0, "truncation_upper": 0, "dilation": 1, "padding_lower": 0, "padding_upper": 0, "flip": false}
                ],
                "kernel_transform": [
                    {"truncation_lower": 0, "truncation_upper": 0, "dilation": 1, "padding_lower": 0, "padding_upper": 0, "flip": false},
                    {"truncation_lower": 0, "truncation_upper": 0, "dilation": 1, "padding_lower": 0, "padding_upper": 0, "flip": false}
                ]
            }
        }"#;
        let doc: ConvDoc = serde_json::from_str(json).unwrap();
        assert_eq!(doc.params.batch_size, 1);
        assert_eq!(doc.options.tiles_per_ipu, ConvOptions::default().tiles_per_ipu);
    }
}
