use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use delogo::{clean_logo, field, LogoModel, MaskedModel, Result};

#[derive(Parser)]
#[command(
    name = "delogo",
    about = "Inspect and transform station-logo model files",
    version,
    after_help = "Model files hold per-pixel blend coefficients estimated from video.\n\
                  Scanning and frame scoring are library operations; this tool works\n\
                  on the serialized models themselves."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print a model's geometry and placement
    Info {
        /// Model file to inspect
        model: PathBuf,

        /// Also build the correlation mask and report feature statistics
        #[arg(long)]
        mask: bool,

        /// Fraction of region pixels kept as mask features
        #[arg(long, default_value = "0.1")]
        mask_ratio: f32,
    },
    /// Write a progressive-equivalent model (3-tap vertical luma filter)
    Deint {
        /// Source model file
        model: PathBuf,

        /// Output model file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write a half-height single-field model
    Field {
        /// Source model file
        model: PathBuf,

        /// Output model file
        #[arg(short, long)]
        output: PathBuf,

        /// Take the bottom field instead of the top
        #[arg(long)]
        bottom: bool,
    },
    /// Reset pixels with no credible logo signal back to identity
    Clean {
        /// Source model file
        model: PathBuf,

        /// Output model file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(&cli.command) {
        eprintln!("[FAIL] {e}");
        process::exit(1);
    }
}

fn run(command: &Command) -> Result<()> {
    match command {
        Command::Info {
            model,
            mask,
            mask_ratio,
        } => {
            let loaded = LogoModel::load(model)?;
            print_info(&loaded);
            if *mask {
                print_mask_info(loaded, *mask_ratio)?;
            }
        }
        Command::Deint { model, output } => {
            let loaded = LogoModel::load(model)?;
            field::deint(&loaded).save(output)?;
            eprintln!("[OK] {}", output.display());
        }
        Command::Field {
            model,
            output,
            bottom,
        } => {
            let loaded = LogoModel::load(model)?;
            field::make_field(&loaded, *bottom)?.save(output)?;
            eprintln!("[OK] {}", output.display());
        }
        Command::Clean { model, output } => {
            let loaded = LogoModel::load(model)?;
            clean_logo(&loaded).save(output)?;
            eprintln!("[OK] {}", output.display());
        }
    }
    Ok(())
}

fn print_info(model: &LogoModel) {
    let hd = model.header();
    let name = if hd.name.is_empty() { "(unnamed)" } else { &hd.name };
    println!("name:       {name}");
    println!("region:     {}x{} at ({}, {})", hd.w, hd.h, hd.imgx, hd.imgy);
    println!("frame:      {}x{}", hd.imgw, hd.imgh);
    println!("chroma:     1/{} x 1/{}", 1 << hd.log_uvx, 1 << hd.log_uvy);
    println!("service id: {}", hd.service_id);
    for (label, a, b) in [
        ("Y", model.a_y(), model.b_y()),
        ("U", model.a_u(), model.b_u()),
        ("V", model.a_v(), model.b_v()),
    ] {
        let (a_lo, a_hi) = min_max(a);
        let (b_lo, b_hi) = min_max(b);
        println!("{label}:          A [{a_lo:.3}, {a_hi:.3}]  B [{b_lo:.3}, {b_hi:.3}]");
    }
}

fn min_max(values: &[f32]) -> (f32, f32) {
    values.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

fn print_mask_info(model: LogoModel, mask_ratio: f32) -> Result<()> {
    let masked = MaskedModel::prepare(model, mask_ratio, None)?
        .unwrap_or_else(|| unreachable!("no cancellation callback installed"));
    println!("kernel:     {:?}", masked.kernel_kind());
    println!("features:   {}", masked.feature_count());
    Ok(())
}
