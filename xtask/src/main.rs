use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for lightsim")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fmt, clippy, tests, doc and the smoke render
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Build rustdoc for the workspace
    Doc,
    /// Render a tiny scene through the CLI, in-thread and out-of-process
    Smoke,
}

const FMT: &[&str] = &["fmt", "--all", "--", "--check"];
const CLIPPY: &[&str] = &[
    "clippy",
    "--workspace",
    "--all-targets",
    "--",
    "-D",
    "warnings",
];
const TEST: &[&str] = &["test", "--workspace"];
const DOC: &[&str] = &["doc", "--workspace", "--no-deps"];

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            for args in [FMT, CLIPPY, TEST, DOC] {
                cargo(args)?;
            }
            smoke()?;
        }
        Commands::Fmt => cargo(FMT)?,
        Commands::Clippy => cargo(CLIPPY)?,
        Commands::Test => cargo(TEST)?,
        Commands::Doc => cargo(DOC)?,
        Commands::Smoke => smoke()?,
    }

    Ok(())
}

fn cargo(args: &[&str]) -> Result<()> {
    println!("==> cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        bail!("cargo {} failed", args[0]);
    }
    Ok(())
}

/// Drive `lightsim-cli` against a scratch data dir under `target/`.
fn smoke() -> Result<()> {
    let data_dir = Path::new("target").join("smoke");
    if data_dir.exists() {
        std::fs::remove_dir_all(&data_dir)?;
    }
    let data = data_dir.to_string_lossy().into_owned();
    let image = data_dir.join("smoke.ppm").to_string_lossy().into_owned();

    let steps: [&[&str]; 6] = [
        &["scene", "reset"],
        &["settings", "set", "width", "32"],
        &["settings", "set", "height", "18"],
        &["settings", "set", "samplesPerPixel", "3"],
        &["render", "--output", image.as_str()],
        &["render", "--process"],
    ];
    for step in steps {
        let mut args = vec![
            "run",
            "--quiet",
            "-p",
            "lightsim-cli",
            "--",
            "--data-dir",
            data.as_str(),
        ];
        args.extend_from_slice(step);
        cargo(&args)?;
    }

    let bytes = std::fs::read(&image)?;
    if !bytes.starts_with(b"P6\n32 18\n255\n") {
        bail!("smoke render wrote an unexpected image header");
    }
    println!("==> smoke render ok ({} bytes)", bytes.len());
    Ok(())
}
