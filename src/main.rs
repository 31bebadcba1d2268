use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fallstream::cli::{Cli, Commands};
use fallstream::ctx::Ctx;
use fallstream::io;
use fallstream::pipeline::stage0_scaffold::Stage0Scaffold;
use fallstream::pipeline::stage1_discover::Stage1Discover;
use fallstream::pipeline::stage2_transplant::Stage2Transplant;
use fallstream::pipeline::stage3_extract::Stage3Extract;
use fallstream::pipeline::stage4_load::Stage4Load;
use fallstream::pipeline::stage5_holdout::Stage5Holdout;
use fallstream::pipeline::stage6_cross_validate::Stage6CrossValidate;
use fallstream::pipeline::stage7_predict::Stage7Predict;
use fallstream::pipeline::stage8_fusion::Stage8Fusion;
use fallstream::pipeline::stage9_videos::Stage9Videos;
use fallstream::pipeline::stage10_output::Stage10Output;
use fallstream::pipeline::{Pipeline, Stage};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (config, stages) = match cli.command {
        Commands::Transplant(args) => (args.to_config(), transplant_stages()),
        Commands::Extract(args) => (args.to_config(), extract_stages()),
        Commands::Train(args) => (args.to_config(), train_stages()),
        Commands::CrossTrain(args) => (args.to_config(), cross_train_stages()),
        Commands::Result(args) => (args.to_config(), result_stages()),
    };

    config.validate().context("invalid configuration")?;
    let mut ctx = Ctx::new(config, env!("CARGO_PKG_VERSION"));
    Pipeline::new(stages).run(&mut ctx)?;

    print_summary(&ctx)
}

fn print_summary(ctx: &Ctx) -> Result<()> {
    let summary = io::summary::format_summary(ctx)?;
    print!("{}", summary);
    if !ctx.warnings.is_empty() {
        println!("warnings:");
        for warning in &ctx.warnings {
            println!("- {}", warning);
        }
    }
    Ok(())
}

fn transplant_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(Stage0Scaffold::new()),
        Box::new(Stage2Transplant::new()),
        Box::new(Stage10Output::new()),
    ]
}

fn extract_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(Stage0Scaffold::new()),
        Box::new(Stage1Discover::new()),
        Box::new(Stage2Transplant::new()),
        Box::new(Stage3Extract::new()),
        Box::new(Stage10Output::new()),
    ]
}

fn train_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(Stage0Scaffold::new()),
        Box::new(Stage4Load::new()),
        Box::new(Stage5Holdout::new()),
        Box::new(Stage8Fusion::new()),
        Box::new(Stage10Output::new()),
    ]
}

fn cross_train_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(Stage0Scaffold::new()),
        Box::new(Stage4Load::new()),
        Box::new(Stage6CrossValidate::new()),
        Box::new(Stage10Output::new()),
    ]
}

fn result_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(Stage0Scaffold::new()),
        Box::new(Stage4Load::new()),
        Box::new(Stage7Predict::new()),
        Box::new(Stage8Fusion::new()),
        Box::new(Stage9Videos::new()),
        Box::new(Stage10Output::new()),
    ]
}
