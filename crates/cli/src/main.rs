//! CLI tool for inspecting and editing PowerPoint packages.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use slidekit_core::{PackageSummary, SeriesSummary, ValidationIssue};
use slidekit_pptx::Presentation;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Inspect, rearrange and copy slides between .pptx files.
#[derive(Parser, Debug)]
#[command(name = "slidekit")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show slides, layouts and sections of a presentation
    Info {
        input: PathBuf,
    },

    /// Create a blank presentation
    New {
        output: PathBuf,

        /// Number of slides to create
        #[arg(short, long, default_value = "0")]
        slides: usize,

        /// Layout used for the created slides
        #[arg(short, long, default_value = "Blank")]
        layout: String,
    },

    /// Copy a slide from one presentation into another
    Copy {
        source: PathBuf,

        /// 1-based number of the slide to copy
        #[arg(short, long)]
        slide: usize,

        destination: PathBuf,

        /// 1-based position in the destination (default: append)
        #[arg(short, long)]
        position: Option<usize>,

        /// Write the result here instead of overwriting the destination
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add an empty slide using a named layout
    Add {
        input: PathBuf,

        #[arg(short, long)]
        layout: String,

        /// 1-based position (default: append)
        #[arg(short, long)]
        position: Option<usize>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Move a slide to another position
    Move {
        input: PathBuf,

        /// 1-based number of the slide to move
        #[arg(long)]
        from: usize,

        /// 1-based target position
        #[arg(long)]
        to: usize,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove a slide
    Remove {
        input: PathBuf,

        /// 1-based number of the slide to remove
        #[arg(short, long)]
        slide: usize,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show or rename the series of a chart
    Series {
        input: PathBuf,

        /// 1-based slide number
        #[arg(short, long)]
        slide: usize,

        /// 0-based chart index on the slide
        #[arg(short, long, default_value = "0")]
        chart: usize,

        /// Rename this 0-based series (requires --name)
        #[arg(long, requires = "name")]
        rename: Option<usize>,

        /// New series name
        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the package structure
    Validate {
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let clean = run(&args, &mut out)?;
    out.flush()?;
    if !clean {
        std::process::exit(1);
    }
    Ok(())
}

/// Execute one command. Returns false when validation found issues.
fn run<W: Write>(args: &Args, out: &mut W) -> Result<bool> {
    match &args.command {
        Command::Info { input } => {
            let pres = open(input)?;
            print_summary(out, &pres.summary(), args.json)?;
        }

        Command::New {
            output,
            slides,
            layout,
        } => {
            let mut pres = Presentation::new().context("Failed to create presentation")?;
            for _ in 0..*slides {
                pres.add_slide(layout, None)
                    .with_context(|| format!("Failed to add a '{}' slide", layout))?;
            }
            save(&pres, output)?;
        }

        Command::Copy {
            source,
            slide,
            destination,
            position,
            output,
        } => {
            let source_pres = open(source)?;
            let mut dest = open(destination)?;
            let copied = dest
                .copy_slide_from(&source_pres, *slide, *position)
                .with_context(|| {
                    format!(
                        "Failed to copy slide {} of {} into {}",
                        slide,
                        source.display(),
                        destination.display()
                    )
                })?;
            log::debug!("Copied slide as {}", copied.part);
            save(&dest, output.as_ref().unwrap_or(destination))?;
        }

        Command::Add {
            input,
            layout,
            position,
            output,
        } => {
            let mut pres = open(input)?;
            pres.add_slide(layout, *position)
                .with_context(|| format!("Failed to add a '{}' slide", layout))?;
            save(&pres, output.as_ref().unwrap_or(input))?;
        }

        Command::Move {
            input,
            from,
            to,
            output,
        } => {
            let mut pres = open(input)?;
            pres.move_slide(*from, *to)
                .with_context(|| format!("Failed to move slide {} to {}", from, to))?;
            save(&pres, output.as_ref().unwrap_or(input))?;
        }

        Command::Remove {
            input,
            slide,
            output,
        } => {
            let mut pres = open(input)?;
            pres.remove_slide(*slide)
                .with_context(|| format!("Failed to remove slide {}", slide))?;
            save(&pres, output.as_ref().unwrap_or(input))?;
        }

        Command::Series {
            input,
            slide,
            chart,
            rename,
            name,
            output,
        } => {
            let mut pres = open(input)?;
            let chart_part = pres
                .chart(*slide, *chart)
                .with_context(|| format!("Slide {} has no chart {}", slide, chart))?;

            if let (Some(series), Some(name)) = (rename, name) {
                pres.set_series_name(chart_part, *series, name)
                    .with_context(|| format!("Failed to rename series {}", series))?;
                save(&pres, output.as_ref().unwrap_or(input))?;
            }

            let series = pres
                .series(chart_part)
                .context("Failed to read chart series")?;
            print_series(out, &series, args.json)?;
        }

        Command::Validate { input } => {
            let pres = open(input)?;
            let issues = pres.validate();
            print_issues(out, &issues, args.json)?;
            return Ok(issues.is_empty());
        }
    }

    Ok(true)
}

fn open(path: &Path) -> Result<Presentation> {
    Presentation::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn save(pres: &Presentation, path: &Path) -> Result<()> {
    pres.save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn print_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("Failed to write JSON")?;
    writeln!(out)?;
    Ok(())
}

fn print_summary<W: Write>(out: &mut W, summary: &PackageSummary, json: bool) -> Result<()> {
    if json {
        return print_json(out, summary);
    }

    writeln!(
        out,
        "{} slides, {} masters, {} layouts",
        summary.slides.len(),
        summary.masters,
        summary.layouts
    )?;
    for slide in &summary.slides {
        write!(
            out,
            "{:>3}  id {:<6} {:<28} {}",
            slide.number,
            slide.id,
            slide.part_name,
            slide.layout.as_deref().unwrap_or("-")
        )?;
        if slide.has_notes {
            write!(out, "  [notes]")?;
        }
        if slide.charts > 0 {
            write!(out, "  [{} charts]", slide.charts)?;
        }
        writeln!(out)?;
    }
    for section in &summary.sections {
        writeln!(out, "section '{}': {} slides", section.name, section.slide_ids.len())?;
    }
    Ok(())
}

fn print_series<W: Write>(out: &mut W, series: &[SeriesSummary], json: bool) -> Result<()> {
    if json {
        return print_json(out, series);
    }

    for s in series {
        let values: Vec<String> = s.values.iter().map(|v| v.to_string()).collect();
        writeln!(
            out,
            "{}: {} ({:?}) = [{}]",
            s.index,
            s.name.as_deref().unwrap_or("<unnamed>"),
            s.name_state,
            values.join(", ")
        )?;
    }
    Ok(())
}

fn print_issues<W: Write>(out: &mut W, issues: &[ValidationIssue], json: bool) -> Result<()> {
    if json {
        return print_json(out, issues);
    }

    if issues.is_empty() {
        writeln!(out, "OK")?;
    }
    for issue in issues {
        writeln!(out, "{}", issue)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn execute(argv: &[&str]) -> (bool, String) {
        let args = Args::try_parse_from(argv).unwrap();
        let mut out = Vec::new();
        let clean = run(&args, &mut out).unwrap();
        (clean, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_new_then_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        let path = path.to_str().unwrap();

        execute(&["slidekit", "new", path, "--slides", "2"]);
        let (_, text) = execute(&["slidekit", "info", path]);
        assert!(text.starts_with("2 slides, 1 masters, 3 layouts"));

        let (_, json) = execute(&["slidekit", "--json", "info", path]);
        let summary: PackageSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary.slides.len(), 2);
        assert_eq!(summary.slides[0].layout.as_deref(), Some("Blank"));
    }

    #[test]
    fn test_add_move_remove_validate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        let path = path.to_str().unwrap();

        execute(&["slidekit", "new", path, "--slides", "1"]);
        execute(&["slidekit", "add", path, "--layout", "Title Slide"]);
        execute(&["slidekit", "move", path, "--from", "2", "--to", "1"]);
        execute(&["slidekit", "remove", path, "--slide", "2"]);

        let (_, json) = execute(&["slidekit", "info", path, "--json"]);
        let summary: PackageSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary.slides.len(), 1);
        assert_eq!(summary.slides[0].layout.as_deref(), Some("Title Slide"));

        let (clean, text) = execute(&["slidekit", "validate", path]);
        assert!(clean);
        assert_eq!(text.trim(), "OK");
    }

    #[test]
    fn test_copy_into_other_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.pptx");
        let dest = dir.path().join("dest.pptx");
        let merged = dir.path().join("merged.pptx");
        let (source, dest, merged) = (
            source.to_str().unwrap(),
            dest.to_str().unwrap(),
            merged.to_str().unwrap(),
        );

        execute(&["slidekit", "new", source, "--slides", "1", "--layout", "Title Only"]);
        execute(&["slidekit", "new", dest, "--slides", "2"]);
        execute(&[
            "slidekit", "copy", source, "--slide", "1", dest, "--position", "1", "--output", merged,
        ]);

        let (_, json) = execute(&["slidekit", "--json", "info", merged]);
        let summary: PackageSummary = serde_json::from_str(&json).unwrap();
        let layouts: Vec<_> = summary.slides.iter().map(|s| s.layout.clone()).collect();
        assert_eq!(
            layouts,
            vec![
                Some("Title Only".to_string()),
                Some("Blank".to_string()),
                Some("Blank".to_string())
            ]
        );
        assert_eq!(summary.masters, 1);
    }

    #[test]
    fn test_rename_requires_name() {
        let result = Args::try_parse_from(["slidekit", "series", "a.pptx", "--slide", "1", "--rename", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let args = Args::try_parse_from(["slidekit", "info", "/nonexistent/deck.pptx"]).unwrap();
        let err = run(&args, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
