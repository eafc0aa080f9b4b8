use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use crc_patcher::config::{
    apply_plan, load_from_path, parse_number, PlanOutcome, RegionDefinition,
};
use crc_patcher::output::{atomic_write, write_preserving_mtime};
use crc_patcher::{crc, forge, OverwriteSpec};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crc-patcher")]
#[command(about = "Forge CRC-32 checksums by editing permitted bits", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine progress to stderr (-v debug, -vv trace; RUST_LOG overrides)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CRC-32 of each file
    Checksum {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Emit a JSON report
        #[arg(long)]
        json: bool,
    },

    /// Rewrite allowed regions of a file so it has the target CRC-32
    Hack {
        file: PathBuf,

        /// Target CRC-32, hex (0x...) or decimal
        #[arg(short, long, value_parser = parse_crc)]
        target: u32,

        /// Editable region: OFFSET:LENGTH[:mask=HEX][:data=HEX]
        #[arg(short, long = "region", value_name = "SPEC")]
        regions: Vec<RegionDefinition>,

        /// Write the forged file here
        #[arg(short, long, conflicts_with = "in_place")]
        output: Option<PathBuf>,

        /// Overwrite the input file
        #[arg(long)]
        in_place: bool,

        /// Solve and report without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show a hex-dump diff of the changes
        #[arg(short, long)]
        diff: bool,

        /// Emit a JSON report
        #[arg(long)]
        json: bool,

        /// Give the written file the input's modification time
        #[arg(long)]
        preserve_mtime: bool,
    },

    /// Find a nonzero patch that leaves every CRC-32 unchanged
    Zero {
        /// Patch length in bytes
        #[arg(short, long, required_unless_present = "like", conflicts_with = "like")]
        length: Option<usize>,

        /// Take the length from FILE; the output becomes FILE with the patch applied
        #[arg(long, value_name = "FILE")]
        like: Option<PathBuf>,

        /// Region the patch may touch: OFFSET:LENGTH[:mask=HEX][:data=HEX]
        #[arg(short, long = "region", value_name = "SPEC")]
        regions: Vec<RegionDefinition>,

        /// Write the patch (or patched copy with --like) here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit a JSON report
        #[arg(long)]
        json: bool,
    },

    /// Run a TOML forge plan against a file
    Apply {
        plan: PathBuf,

        file: PathBuf,

        /// Write the result here instead of overwriting FILE (required to
        /// save a zero-mode patch whose forge.length differs from FILE)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Solve and report without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show a hex-dump diff of the changes
        #[arg(short, long)]
        diff: bool,

        /// Emit a JSON report
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let solved = match cli.command {
        Commands::Checksum { files, json } => cmd_checksum(&files, json)?,

        Commands::Hack {
            file,
            target,
            regions,
            output,
            in_place,
            dry_run,
            diff,
            json,
            preserve_mtime,
        } => {
            let destination = output.or_else(|| in_place.then(|| file.clone()));
            cmd_hack(HackArgs {
                file: &file,
                target,
                regions: &regions,
                destination: destination.as_deref(),
                dry_run,
                show_diff: diff,
                json,
                preserve_mtime,
            })?
        }

        Commands::Zero {
            length,
            like,
            regions,
            output,
            json,
        } => cmd_zero(length, like.as_deref(), &regions, output.as_deref(), json)?,

        Commands::Apply {
            plan,
            file,
            output,
            dry_run,
            diff,
            json,
        } => cmd_apply(&plan, &file, output.as_deref(), dry_run, diff, json)?,
    };

    if !solved {
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "crc_patcher=debug",
        _ => "crc_patcher=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_crc(text: &str) -> Result<u32, String> {
    let value = parse_number(text)?;
    u32::try_from(value).map_err(|_| format!("{text} does not fit in 32 bits"))
}

fn build_specs(regions: &[RegionDefinition]) -> Result<Vec<OverwriteSpec>> {
    regions
        .iter()
        .enumerate()
        .map(|(idx, region)| {
            region
                .to_spec()
                .map_err(|issue| anyhow::anyhow!("--region #{}: {}", idx + 1, issue))
        })
        .collect()
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Helper: 16 bytes per line, offset first, so line diffs line up with file offsets
fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for (row, chunk) in bytes.chunks(16).enumerate() {
        out.push_str(&format!("{:08x} ", row * 16));
        for byte in chunk {
            out.push_str(&format!(" {:02x}", byte));
        }
        out.push('\n');
    }
    out
}

/// Helper: Show a hex-dump diff between original and forged content
fn display_diff(file: &Path, original: &[u8], modified: &[u8]) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (forged)", file.display()).dimmed());

    let before = hex_dump(original);
    let after = hex_dump(modified);
    let diff = TextDiff::from_lines(&before, &after);

    for (idx, group) in diff.grouped_ops(1).iter().enumerate() {
        if idx > 0 {
            println!("{}", "...".dimmed());
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{}", change).red(),
                    ChangeTag::Insert => format!("+{}", change).green(),
                    ChangeTag::Equal => format!(" {}", change).normal(),
                };
                print!("{}", line);
            }
        }
    }
}

fn write_output(path: &Path, content: &[u8], mtime_from: Option<&Path>) -> Result<()> {
    match mtime_from {
        Some(like) => write_preserving_mtime(path, content, like)?,
        None => atomic_write(path, content)?,
    }
    Ok(())
}

#[derive(Serialize)]
struct ChecksumEntry {
    file: String,
    crc32: String,
}

fn cmd_checksum(files: &[PathBuf], json: bool) -> Result<bool> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let data = read_file(file)?;
        entries.push(ChecksumEntry {
            file: file.display().to_string(),
            crc32: format!("{:08x}", crc::checksum(&data)),
        });
    }

    if json {
        print_json(&entries)?;
    } else {
        for entry in &entries {
            println!("{}  {}", entry.crc32, entry.file);
        }
    }
    Ok(true)
}

#[derive(Serialize)]
struct ByteChange {
    offset: usize,
    before: String,
    after: String,
}

fn byte_changes(before: &[u8], after: &[u8]) -> Vec<ByteChange> {
    before
        .iter()
        .zip(after)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(offset, (a, b))| ByteChange {
            offset,
            before: format!("{:02x}", a),
            after: format!("{:02x}", b),
        })
        .collect()
}

#[derive(Serialize)]
struct ForgeReport {
    file: String,
    status: &'static str,
    original_crc32: String,
    target_crc32: Option<String>,
    output: Option<String>,
    changes: Vec<ByteChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    patch: Option<String>,
}

struct HackArgs<'a> {
    file: &'a Path,
    target: u32,
    regions: &'a [RegionDefinition],
    destination: Option<&'a Path>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
    preserve_mtime: bool,
}

fn cmd_hack(args: HackArgs<'_>) -> Result<bool> {
    let source = read_file(args.file)?;
    let specs = build_specs(args.regions)?;
    let original = crc::checksum(&source);

    let forged = forge::hack(&source, args.target, &specs)?;
    let written = match (&forged, args.destination) {
        (Some(output), Some(dest)) if !args.dry_run && *output != source => {
            let like = args.preserve_mtime.then_some(args.file);
            write_output(dest, output, like)?;
            Some(dest)
        }
        _ => None,
    };

    if args.json {
        let status = match &forged {
            Some(output) if *output == source => "already-matching",
            Some(_) => "forged",
            None => "unsatisfiable",
        };
        print_json(&ForgeReport {
            file: args.file.display().to_string(),
            status,
            original_crc32: format!("{:08x}", original),
            target_crc32: Some(format!("{:08x}", args.target)),
            output: written.map(|p| p.display().to_string()),
            changes: forged
                .as_deref()
                .map(|output| byte_changes(&source, output))
                .unwrap_or_default(),
            patch: None,
        })?;
        return Ok(forged.is_some());
    }

    println!("File: {}", args.file.display());
    println!("CRC-32: {:08x} -> {:08x}", original, args.target);

    let Some(output) = forged else {
        eprintln!(
            "{} No solution: the allowed regions cannot reach {:08x}",
            "✗".red(),
            args.target
        );
        return Ok(false);
    };

    if output == source {
        println!("{} Already at {:08x}", "⊙".yellow(), args.target);
        return Ok(true);
    }

    let changed = byte_changes(&source, &output).len();
    match written {
        Some(dest) => println!(
            "{} Forged {} byte(s), wrote {}",
            "✓".green(),
            changed,
            dest.display()
        ),
        None if args.dry_run => println!(
            "{} Would change {} byte(s) [DRY RUN]",
            "✓".green(),
            changed
        ),
        None => {
            println!("{} Forged {} byte(s)", "✓".green(), changed);
            println!(
                "{}",
                "  Nothing written: pass --output or --in-place to save".dimmed()
            );
        }
    }

    if args.show_diff {
        display_diff(args.file, &source, &output);
    }

    Ok(true)
}

#[derive(Serialize)]
struct ZeroReport {
    length: usize,
    status: &'static str,
    patch: Option<String>,
    changed_bytes: usize,
    like: Option<String>,
    crc32: Option<String>,
    output: Option<String>,
}

fn cmd_zero(
    length: Option<usize>,
    like: Option<&Path>,
    regions: &[RegionDefinition],
    output: Option<&Path>,
    json: bool,
) -> Result<bool> {
    let base = like.map(read_file).transpose()?;
    let length = match (&base, length) {
        (Some(base), _) => base.len(),
        (None, Some(length)) => length,
        (None, None) => anyhow::bail!("either --length or --like is required"),
    };
    let specs = build_specs(regions)?;

    let patch = forge::zero(length, &specs)?;
    let twin = match (&patch, &base) {
        (Some(patch), Some(base)) => Some(
            base.iter()
                .zip(patch)
                .map(|(a, b)| a ^ b)
                .collect::<Vec<u8>>(),
        ),
        _ => None,
    };

    let written = match (&patch, output) {
        (Some(patch), Some(dest)) => {
            write_output(dest, twin.as_deref().unwrap_or(patch.as_slice()), None)?;
            Some(dest)
        }
        _ => None,
    };

    if json {
        print_json(&ZeroReport {
            length,
            status: if patch.is_some() { "found" } else { "unsatisfiable" },
            patch: patch.as_deref().map(hex::encode),
            changed_bytes: patch
                .as_deref()
                .map_or(0, |p| p.iter().filter(|&&b| b != 0).count()),
            like: like.map(|p| p.display().to_string()),
            crc32: base.as_deref().map(|b| format!("{:08x}", crc::checksum(b))),
            output: written.map(|p| p.display().to_string()),
        })?;
        return Ok(patch.is_some());
    }

    let Some(patch) = patch else {
        eprintln!(
            "{} No neutral patch of {} byte(s) fits the allowed regions",
            "✗".red(),
            length
        );
        return Ok(false);
    };

    let changed = patch.iter().filter(|&&b| b != 0).count();
    println!(
        "{} Neutral patch touching {} of {} byte(s)",
        "✓".green(),
        changed,
        length
    );
    if let (Some(base), Some(twin)) = (&base, &twin) {
        println!(
            "  CRC-32 {:08x} kept, {} byte(s) differ",
            crc::checksum(base),
            byte_changes(base, twin).len()
        );
    }
    match written {
        Some(dest) => println!("  Wrote {}", dest.display()),
        None => println!("{}", hex::encode(&patch)),
    }

    Ok(true)
}

fn cmd_apply(
    plan_path: &Path,
    file: &Path,
    output: Option<&Path>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
) -> Result<bool> {
    let plan = load_from_path(plan_path)?;
    let source = read_file(file)?;
    let original = crc::checksum(&source);

    let outcome = apply_plan(&plan, Some(&source))?;
    let result = match &outcome {
        PlanOutcome::Forged { output, .. } => Some(output.as_slice()),
        PlanOutcome::Neutral { twin, .. } => twin.as_deref(),
        PlanOutcome::AlreadyMatching { .. } | PlanOutcome::Unsatisfiable => None,
    };

    // A patch sized by forge.length rather than FILE stands on its own and
    // only ever goes to --output.
    let standalone_patch = match &outcome {
        PlanOutcome::Neutral { patch, twin: None } => Some(patch.as_slice()),
        _ => None,
    };

    let written = match (result, standalone_patch, output) {
        _ if dry_run => None,
        (Some(content), _, dest) => {
            let dest = dest.unwrap_or(file);
            write_output(dest, content, None)?;
            Some(dest)
        }
        (None, Some(patch), Some(dest)) => {
            write_output(dest, patch, None)?;
            Some(dest)
        }
        _ => None,
    };

    if json {
        let status = match &outcome {
            PlanOutcome::Forged { .. } => "forged",
            PlanOutcome::AlreadyMatching { .. } => "already-matching",
            PlanOutcome::Neutral { .. } => "neutral",
            PlanOutcome::Unsatisfiable => "unsatisfiable",
        };
        print_json(&ForgeReport {
            file: file.display().to_string(),
            status,
            original_crc32: format!("{:08x}", original),
            target_crc32: plan.target().map(|t| format!("{:08x}", t)),
            output: written.map(|p| p.display().to_string()),
            changes: result
                .map(|content| byte_changes(&source, content))
                .unwrap_or_default(),
            patch: standalone_patch.map(hex::encode),
        })?;
        return Ok(!matches!(outcome, PlanOutcome::Unsatisfiable));
    }

    let name = if plan.meta.name.is_empty() {
        plan_path.display().to_string()
    } else {
        plan.meta.name.clone()
    };
    println!("Plan: {} ({} mode)", name, plan.forge.mode);
    println!("File: {}", file.display());

    match (&outcome, written) {
        (PlanOutcome::Unsatisfiable, _) => {
            eprintln!("{} {}", "✗".red(), outcome);
            return Ok(false);
        }
        (PlanOutcome::AlreadyMatching { .. }, _) => println!("{} {}", "⊙".yellow(), outcome),
        (_, Some(dest)) => println!("{} {}, wrote {}", "✓".green(), outcome, dest.display()),
        (_, None) if dry_run => println!("{} {} [DRY RUN]", "✓".green(), outcome),
        (_, None) => println!("{} {}", "✓".green(), outcome),
    }

    if let (Some(patch), None) = (standalone_patch, written) {
        let note = format!(
            "  Patch is {} bytes, FILE is {}; pass --output to save it",
            patch.len(),
            source.len()
        );
        println!("{}", note.dimmed());
        println!("{}", hex::encode(patch));
    }

    if show_diff {
        if let Some(content) = result {
            display_diff(file, &source, content);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_rows() {
        let dump = hex_dump(&(0u8..18).collect::<Vec<_>>());
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000000  00 01 02"));
        assert_eq!(lines[1], "00000010  10 11");
    }

    #[test]
    fn test_parse_crc() {
        assert_eq!(parse_crc("0xdeadbeef"), Ok(0xDEAD_BEEF));
        assert_eq!(parse_crc("42"), Ok(42));
        assert!(parse_crc("0x1_0000_0000").is_err());
        assert!(parse_crc("nope").is_err());
    }

    #[test]
    fn test_byte_changes() {
        let changes = byte_changes(b"abcd", b"abXd");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].offset, 2);
        assert_eq!(changes[0].before, "63");
        assert_eq!(changes[0].after, "58");
    }
}
