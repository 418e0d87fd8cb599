use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use pipeline_merge_sort::{Pipeline, PipelineConfig, source, verify};
use rayon::slice::ParallelSliceMut;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipesort", about = "Pipelined merge sort of byte values")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sort the bytes of a file through the stage chain.
    Sort(SortArgs),
    /// Write random bytes to a file.
    Generate(GenerateArgs),
    /// Time the pipeline against in-memory sorts.
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
struct SortArgs {
    /// Binary input, one element per byte.
    #[arg(default_value = "numbers")]
    input: PathBuf,

    /// Chain length including the source [default: minimum for the input]
    #[arg(short = 'n', long)]
    stages: Option<usize>,

    /// Per-tag capacity of each link [default: unbounded]
    #[arg(long)]
    link_capacity: Option<usize>,

    /// Check that the output is a sorted permutation of the input.
    #[arg(long)]
    verify: bool,
}

impl Default for SortArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::from("numbers"),
            stages: None,
            link_capacity: None,
            verify: false,
        }
    }
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// How many numbers to write.
    count: usize,

    #[arg(short, long, default_value = "numbers")]
    output: PathBuf,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Args, Debug)]
struct BenchArgs {
    /// Largest input as a power of two.
    #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u32).range(4..=32))]
    max_lg_size: u32,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or_else(|| Command::Sort(SortArgs::default())) {
        Command::Sort(args) => sort(args),
        Command::Generate(args) => generate(args),
        Command::Bench(args) => bench(args),
    }
}

fn sort(args: SortArgs) -> Result<()> {
    let numbers = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let pipeline = Pipeline::new(PipelineConfig {
        stages: args.stages,
        link_capacity: args.link_capacity,
    });

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    // Admission control happens before anything is printed.
    pipeline.admit(&numbers)?;
    writeln!(out, "{}", source::echo(&numbers))?;
    out.flush()?;

    let sorted = pipeline.sort(&numbers)?;
    if args.verify {
        verify::check(&numbers, &sorted).context("pipeline output failed verification")?;
    }
    for number in &sorted {
        writeln!(out, "{}", number)?;
    }
    out.flush()?;
    Ok(())
}

fn generate(args: GenerateArgs) -> Result<()> {
    if args.count == 0 {
        bail!("refusing to write an empty input file");
    }
    let mut rng = fastrand::Rng::with_seed(args.seed);
    let mut numbers = vec![0u8; args.count];
    rng.fill(&mut numbers);
    std::fs::write(&args.output, &numbers)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!(
        "wrote {} to {}",
        human_size(numbers.len()),
        args.output.display()
    );
    Ok(())
}

fn bench(args: BenchArgs) -> Result<()> {
    let mut rng = fastrand::Rng::with_seed(args.seed);
    for lg_size in (4..=args.max_lg_size).step_by(4) {
        let mut data = vec![0u8; 1 << lg_size];
        rng.fill(&mut data);
        let repeats = 1usize << 16u32.saturating_sub(lg_size).min(8);
        let pipeline = Pipeline::default();
        println!(
            "size: {} ({} stages)",
            human_size(data.len()),
            source::required_stages(data.len())
        );

        // Fail before timing if the pipeline is wrong.
        verify::check(&data, &pipeline.sort(&data)?)?;
        benchmark("pipeline", repeats, || {
            pipeline.sort(&data)?;
            Ok(())
        })?;
        benchmark("sort_unstable", repeats, || {
            let mut copy = data.clone();
            copy.sort_unstable();
            Ok(())
        })?;
        benchmark("rayon par_sort_unstable", repeats, || {
            let mut copy = data.clone();
            copy.par_sort_unstable();
            Ok(())
        })?;
    }
    Ok(())
}

fn benchmark(name: &str, repeats: usize, mut f: impl FnMut() -> Result<()>) -> Result<()> {
    // Warmup.
    for _ in 0..repeats {
        f()?;
    }
    let start = Instant::now();
    for _ in 0..repeats {
        f()?;
    }
    let duration = start.elapsed();
    println!("  {}: {}", name, human_time(repeats, duration));
    Ok(())
}

fn human_time(repeats: usize, duration: Duration) -> String {
    let mut duration = duration.as_nanos() as f64 / repeats as f64;
    if duration < 1000.0 {
        return format!("{:.1}ns", duration);
    }
    duration /= 1000.0;
    if duration < 1000.0 {
        return format!("{:.1}us", duration);
    }
    duration /= 1000.0;
    if duration < 1000.0 {
        return format!("{:.1}ms", duration);
    }
    duration /= 1000.0;
    format!("{:.1}s", duration)
}

fn human_size(size: usize) -> String {
    if size < 1024 {
        return format!("{}B", size);
    }
    let mut size = size as f64;
    size /= 1024.0;
    if size < 1024.0 {
        return format!("{}KiB", size);
    }
    size /= 1024.0;
    format!("{}MiB", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bench_size_is_bounded() {
        assert!(Cli::try_parse_from(["pipesort", "bench", "--max-lg-size", "64"]).is_err());
        assert!(Cli::try_parse_from(["pipesort", "bench", "--max-lg-size", "3"]).is_err());
        let cli = Cli::try_parse_from(["pipesort", "bench", "--max-lg-size", "32"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Bench(BenchArgs { max_lg_size: 32, .. }))));
    }

    #[test]
    fn sort_is_the_default_command() {
        let cli = Cli::try_parse_from(["pipesort"]).unwrap();
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from(["pipesort", "sort", "in.bin", "-n", "5"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Sort(SortArgs { stages: Some(5), .. }))));
    }
}
