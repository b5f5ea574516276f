use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use prefix_sift::partition::constants::DEFAULT_MAX_DEPTH;
use prefix_sift::utils::{discover_input_files, format_bytes, format_duration, setup_logging};
use prefix_sift::{verify_tree, PartitionConfig, PartitionEngine};

#[derive(Parser)]
#[command(name = "prefix-sift")]
#[command(about = "🌳 Prefix Sift: sorts line records into a prefix-named directory tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Partition every input file into a sorted prefix tree
    Partition(PartitionArgs),
    /// Check an existing output tree for ordering, prefix and size violations
    Verify(VerifyArgs),
}

#[derive(Args)]
struct PartitionArgs {
    #[arg(short, long, help = "Input directory containing text files")]
    input: PathBuf,

    #[arg(short, long, help = "Root of the output tree")]
    output: PathBuf,

    #[arg(short, long, help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Maximum records per leaf file (exclusive)")]
    threshold: Option<usize>,

    #[arg(short, long, help = "Number of concurrent workers")]
    workers: Option<usize>,

    #[arg(long, help = "Deepest prefix level before leaves are flushed regardless of size")]
    max_depth: Option<usize>,

    #[arg(long, help = "Also split subtrees across the worker threads")]
    parallel_subtrees: bool,

    #[arg(long, help = "Stop dispatching work after the first failed subtree")]
    stop_on_error: bool,

    #[arg(long, help = "Report unreadable input files instead of aborting")]
    skip_unreadable: bool,

    #[arg(long, help = "Remove an existing output tree before writing")]
    clean: bool,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(short, long, help = "Root of the output tree")]
    output: PathBuf,

    #[arg(short, long, help = "Threshold the tree was built with")]
    threshold: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH, help = "Max depth the tree was built with")]
    max_depth: usize,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Partition(args) => run_partition(args).await,
        Command::Verify(args) => run_verify(args),
    }
}

async fn run_partition(args: PartitionArgs) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => {
            println!("📚 Loading configuration from {}", path.display());
            PartitionConfig::from_file(path)?
        }
        None => PartitionConfig::default(),
    };

    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    if let Some(max_depth) = args.max_depth {
        config.max_depth = max_depth;
    }
    config.parallel_subtrees |= args.parallel_subtrees;
    config.stop_on_error |= args.stop_on_error;
    config.skip_unreadable_inputs |= args.skip_unreadable;
    config.clear_output |= args.clean;
    config.verbose |= args.verbose;

    setup_logging(if config.verbose { "verbose" } else { "normal" })?;

    if !args.input.exists() {
        anyhow::bail!("Input directory does not exist: {}", args.input.display());
    }

    let input_files = discover_input_files(&args.input, &config.input_extension)?;
    if input_files.is_empty() {
        println!("😱 No .{} files found in {}", config.input_extension, args.input.display());
        return Ok(ExitCode::SUCCESS);
    }

    let total_size: u64 = input_files
        .iter()
        .filter_map(|f| std::fs::metadata(f).ok())
        .map(|m| m.len())
        .sum();

    println!("🌳 Prefix Sift");
    println!("🔍 Input: {} ({} files, {})", args.input.display(), input_files.len(), format_bytes(total_size));
    println!("📝 Output: {}", args.output.display());
    println!("📏 Threshold: {} records per leaf, {} workers", config.threshold, config.worker_count);

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n🛑 Shutdown signal received. Finishing in-flight leaves...");
            shutdown_flag_clone.store(true, Ordering::Relaxed);
        }
    });

    let start_time = Instant::now();
    let engine = PartitionEngine::new(config)?.with_shutdown_signal(shutdown_flag);
    let report = engine.process(&input_files, &args.output).await?;
    let elapsed = start_time.elapsed();

    println!();
    for file in &report.files {
        let verdict = if file.already_sorted { "yes" } else { "no" };
        println!("📄 {:<54} already sorted? {}", file.path.display(), verdict);
    }

    println!("\n=======================================");
    println!("📊 Records: {}", report.total_records);
    println!("🍃 Leaves written: {}", report.stats.leaves_written);
    println!("📁 Directories created: {}", report.stats.directories_created);
    println!("🔢 Deepest level: {}", report.stats.deepest_level);
    if report.stats.oversized_leaves > 0 {
        println!("⚠️ Leaves kept above threshold (unsplittable): {}", report.stats.oversized_leaves);
    }
    println!(
        "✔️ Inputs already sorted: {}/{}",
        report.already_sorted_files(),
        report.files.len()
    );
    println!("⏱️ Processing time: {}", format_duration(elapsed));

    if report.is_success() {
        println!("\n🎉 Partitioning completed successfully! 🎉");
        return Ok(ExitCode::SUCCESS);
    }

    if report.cancelled {
        println!("\n🛑 Run cancelled: {} buckets skipped", report.stats.cancelled_buckets);
    }
    if !report.failures.is_empty() {
        println!("\n💥 {} subtrees failed:", report.failures.len());
        for failure in &report.failures {
            println!("   {}", failure);
        }
    }

    Ok(ExitCode::FAILURE)
}

fn run_verify(args: VerifyArgs) -> Result<ExitCode> {
    setup_logging(if args.verbose { "verbose" } else { "normal" })?;

    println!("🔎 Verifying {} (threshold {})", args.output.display(), args.threshold);
    let report = verify_tree(&args.output, args.threshold, args.max_depth)?;

    println!("🍃 Leaves: {}", report.leaves);
    println!("📁 Directories: {}", report.directories);
    println!("📊 Records: {}", report.records);

    if report.is_valid() {
        println!("✅ Tree is valid");
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n💥 {} violations:", report.violations.len());
    for violation in &report.violations {
        println!("   {}", violation);
    }
    Ok(ExitCode::FAILURE)
}
