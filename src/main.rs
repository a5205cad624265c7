//! mdoc — filter MATLAB class definitions into doxygen-ready declarations.
//!
//! Two modes:
//!
//! - **stdin mode**: `mdoc < classA.m` writes the filtered unit to stdout
//! - **file mode**: `mdoc -o build/docs --group models models/*.m`

mod accessors;
mod balance;
mod comments;
mod emit;
mod filter;
mod lexer;
mod model;
mod parse;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "mdoc",
    about = "Filter MATLAB class definitions into declarations the doxygen documentation tool can process"
)]
struct Cli {
    /// Input .m files (glob patterns supported). If omitted, reads from stdin.
    files: Vec<String>,

    /// Output directory (required when files are given)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Doxygen group added to each class doc block (@ingroup)
    #[arg(long)]
    group: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.files.is_empty() {
        return stdin_mode(&cli);
    }

    file_mode(&cli)
}

fn emit_options(cli: &Cli) -> emit::EmitOptions {
    emit::EmitOptions {
        group: cli.group.clone(),
    }
}

/// stdin mode: read one unit from stdin, write the filtered unit to stdout,
/// diagnostics to stderr.
fn stdin_mode(cli: &Cli) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;

    let out = filter::filter(&input, &emit_options(cli));
    for d in &out.diagnostics {
        eprintln!("<stdin>:{}", d);
    }
    if out.is_fatal() {
        anyhow::bail!("unparseable class definition on stdin");
    }
    print!("{}", out.text);
    Ok(())
}

/// file mode: process multiple files, write one `.cc` unit per input into
/// the output directory. Unparseable units are skipped with a warning.
fn file_mode(cli: &Cli) -> Result<()> {
    let output_dir = cli
        .output
        .as_deref()
        .context("--output is required when files are given")?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory: {}", output_dir.display()))?;

    let input_files = expand_globs(&cli.files)?;
    let opts = emit_options(cli);

    for path in &input_files {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let out = filter::filter(&content, &opts);
        for d in &out.diagnostics {
            eprintln!("{}:{}", path.display(), d);
        }
        if out.is_fatal() {
            eprintln!(
                "warning: skipping {}: unparseable class definition",
                path.display()
            );
            continue;
        }
        let name = derive_output_name(&path.to_string_lossy());
        let out_path = output_dir.join(format!("{}.cc", name));
        fs::write(&out_path, &out.text)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
    }

    Ok(())
}

/// File extensions recognized as class-definition sources.
const SUPPORTED_EXTENSIONS: &[&str] = &["m"];

/// Expand glob patterns into a sorted, deduplicated list of real files.
/// Bare directories are scanned (non-recursive) for supported extensions.
fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        if path.is_dir() {
            let entries = fs::read_dir(path)
                .with_context(|| format!("failed to read directory: {}", path.display()))?;
            for entry in entries.flatten() {
                let p = entry.path();
                if p.is_file() {
                    if let Some(ext) = p.extension().and_then(|e| e.to_str()) {
                        if SUPPORTED_EXTENSIONS.contains(&ext) {
                            files.push(p);
                        }
                    }
                }
            }
            continue;
        }
        let matches: Vec<_> = glob::glob(pattern)
            .with_context(|| format!("invalid glob pattern: {}", pattern))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        if matches.is_empty() {
            eprintln!("warning: no files matched: {}", pattern);
        }
        files.extend(matches);
    }
    // deterministic output order
    files.sort();
    files.dedup();
    Ok(files)
}

/// "models/classA.m" → "classA"
fn derive_output_name(source: &str) -> String {
    let filename = source.rsplit('/').next().unwrap_or(source);
    filename
        .strip_suffix(".m")
        .unwrap_or(filename)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_from_m_file() {
        assert_eq!(derive_output_name("models/classA.m"), "classA");
        assert_eq!(derive_output_name("classA.m"), "classA");
    }

    #[test]
    fn output_name_no_extension() {
        assert_eq!(derive_output_name("Makefile"), "Makefile");
    }
}
