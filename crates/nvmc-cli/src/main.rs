//! Thin driver: read a typed-AST fixture, run the codegen pipeline, write
//! the resulting artifact to disk. No package loading, parsing, or type
//! checking happens here (SPEC_FULL §0's non-goals) — the input file is
//! already a serialized `nvmc_core::ast::Program`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Lower a typed AST into Neo-style bytecode and debug metadata.
#[derive(Debug, Parser)]
#[command(name = "nvmc", version, about)]
struct Cli {
    /// Path to a JSON-serialized `nvmc_core::ast::Program` fixture.
    input: PathBuf,

    /// Directory to write the artifact into (created if missing).
    #[arg(short = 'o', long = "out-dir", default_value = "out")]
    out_dir: PathBuf,

    /// Skip C10 debug-info emission.
    #[arg(long)]
    no_debug_info: bool,

    /// Skip C9 peephole long-to-short jump compression.
    #[arg(long)]
    no_peephole: bool,

    /// Compile packages in input order instead of sorting by path.
    #[arg(long)]
    no_deterministic_order: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let input = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let program: nvmc_core::ast::Program = serde_json::from_str(&input)
        .with_context(|| format!("parsing {} as an ast::Program", cli.input.display()))?;

    let options = nvmc_core::CodegenOptions {
        peephole_compression: !cli.no_peephole,
        emit_debug_info: !cli.no_debug_info,
        deterministic_package_order: !cli.no_deterministic_order,
    };

    log::info!("compiling {}", cli.input.display());
    let artifact = nvmc_core::compile_program(&program, options)
        .map_err(|err| anyhow::anyhow!("{err}"))
        .context("compilation failed")?;

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;

    write_file(&cli.out_dir, "bytecode.bin", &artifact.bytecode)?;
    write_json(&cli.out_dir, "call_tokens.json", &artifact.call_tokens)?;
    write_json(&cli.out_dir, "manifest.json", &artifact.manifest)?;
    if let Some(debug_info) = &artifact.debug_info {
        write_json(&cli.out_dir, "debug_info.json", debug_info)?;
    }

    log::info!(
        "wrote {} bytes of bytecode, {} call tokens to {}",
        artifact.bytecode.len(),
        artifact.call_tokens.len(),
        cli.out_dir.display()
    );
    Ok(())
}

fn write_file(out_dir: &std::path::Path, name: &str, bytes: &[u8]) -> Result<()> {
    let path = out_dir.join(name);
    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn write_json(out_dir: &std::path::Path, name: &str, value: &impl serde::Serialize) -> Result<()> {
    let path = out_dir.join(name);
    let json = serde_json::to_vec_pretty(value).with_context(|| format!("serializing {name}"))?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
}
