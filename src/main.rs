use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use span_patcher::config::{self, Config};
use span_patcher::patch::read_source;
use span_patcher::safety::FORBIDDEN_DIRS;
use span_patcher::tagger::{SourceLanguage, DEFAULT_WRAPPER};
use span_patcher::{BuildMode, PatchOutcome, SourceSpan, SpanPatch, SpanTagger, TagStyle};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "span-patcher")]
#[command(about = "Tag JSX elements with their source spans and rewrite them in place", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the patch service
    Serve {
        /// Project root (defaults to the config's root, then the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Config file (otherwise span-patcher.toml in the root, if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Tag JSX elements under a path and report their spans
    Tag {
        /// File or directory to tag
        path: PathBuf,

        /// Project root that recorded filenames are relative to
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Write instrumented copies under this directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Build mode: development or production
        #[arg(short, long)]
        mode: Option<String>,

        /// Wrap elements in a component instead of adding attributes
        #[arg(short, long, num_args = 0..=1, default_missing_value = DEFAULT_WRAPPER)]
        wrapper: Option<String>,

        /// List every tagged element
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the text covered by a span
    Locate {
        file: PathBuf,

        /// Span as `L:C-L:C`
        span: SourceSpan,
    },

    /// Replace the text covered by a span
    Patch {
        file: PathBuf,

        /// Span as `L:C-L:C`
        span: SourceSpan,

        /// Replacement text
        #[arg(required_unless_present = "stdin", conflicts_with = "stdin")]
        text: Option<String>,

        /// Read the replacement text from stdin
        #[arg(long)]
        stdin: bool,

        /// Refuse to patch unless the span currently holds this text
        #[arg(short, long)]
        expect: Option<String>,

        /// Dry run - show what would be changed without modifying the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of the change
        #[arg(short, long)]
        diff: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            root,
            config,
            host,
            port,
        } => cmd_serve(root, config, host, port),

        Commands::Tag {
            path,
            root,
            out,
            mode,
            wrapper,
            verbose,
        } => cmd_tag(&path, &root, out.as_deref(), mode, wrapper, verbose),

        Commands::Locate { file, span } => cmd_locate(&file, &span),

        Commands::Patch {
            file,
            span,
            text,
            stdin,
            expect,
            dry_run,
            diff,
        } => cmd_patch(&file, span, text, stdin, expect, dry_run, diff),
    }
}

/// Config precedence: file, then environment, then flags.
fn resolve_config(
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<Config> {
    let mut config = match &config_path {
        Some(path) => config::load_from_path(path)?,
        None => {
            let dir = root.clone().unwrap_or_else(|| PathBuf::from("."));
            config::discover(&dir)?
        }
    };
    config::apply_env(&mut config)?;

    if let Some(root) = root {
        config.server.root = root;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_serve(
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let config = resolve_config(root, config_path, host, port)?;

    if config.transform.endpoint.is_some() && config.transform.api_key().is_none() {
        eprintln!(
            "{} {} is not set; calling the transform endpoint without a credential",
            "Warning:".yellow(),
            config.transform.api_key_env
        );
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    rt.block_on(async move { span_patcher::server::run(&config).await })?;
    Ok(())
}

fn cmd_tag(
    path: &Path,
    root: &Path,
    out: Option<&Path>,
    mode: Option<String>,
    wrapper: Option<String>,
    verbose: bool,
) -> Result<()> {
    let file_config = config::discover(root)?;

    let mode = match mode.or(file_config.tagger.mode.clone()) {
        Some(mode) => match BuildMode::parse(&mode) {
            Some(mode) => mode,
            None => bail!("Unknown build mode `{}` (expected development or production)", mode),
        },
        // Tagging on demand is a development action
        None => BuildMode::Development,
    };
    let style = match wrapper {
        Some(component) => TagStyle::Wrapper { component },
        None => file_config.tagger.tag_style(),
    };
    let tagger = SpanTagger::new(mode, style);

    if mode == BuildMode::Production {
        println!(
            "{}",
            "Production build: tagging is a no-op, sources are left untouched".yellow()
        );
    }

    let files = discover_sources(path);
    if files.is_empty() {
        bail!("No .js/.jsx/.tsx files found under {}", path.display());
    }

    let mut total_elements = 0;
    let mut failed = 0;
    for file in &files {
        let filename = file.strip_prefix(root).unwrap_or(file).to_string_lossy().replace('\\', "/");

        let output = match tagger.tag_file(file, &filename) {
            Ok(output) => output,
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), filename, e);
                failed += 1;
                continue;
            }
        };

        total_elements += output.elements.len();
        println!(
            "{} {}: {} element(s)",
            "✓".green(),
            filename,
            output.elements.len()
        );
        if verbose {
            for element in &output.elements {
                println!("    {}  {}", element.id.as_str().dimmed(), element.span);
            }
        }

        if let Some(out) = out {
            let dest = out.join(&filename);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&dest, &output.code)
                .with_context(|| format!("Failed to write {}", dest.display()))?;
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} file(s)", files.len());
    println!("  {} element(s) tagged", format!("{}", total_elements).green());
    println!("  {} failed", format!("{}", failed).red());

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Taggable sources under `path`, skipping dependency and build directories.
fn discover_sources(path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| FORBIDDEN_DIRS.contains(&name))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| SourceLanguage::from_path(path).is_some())
        .collect();
    files.sort();
    files
}

fn cmd_locate(file: &Path, span: &SourceSpan) -> Result<()> {
    let source = read_source(file)?;
    let text = source
        .locate(span)
        .with_context(|| format!("Cannot locate {} in {}", span, file.display()))?;
    println!("{}", text);
    Ok(())
}

fn cmd_patch(
    file: &Path,
    span: SourceSpan,
    text: Option<String>,
    stdin: bool,
    expect: Option<String>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let new_text = match (text, stdin) {
        (_, true) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read replacement text from stdin")?;
            buf
        }
        (Some(text), false) => text,
        (None, false) => bail!("Provide the replacement text or --stdin"),
    };

    let mut patch = SpanPatch::new(file, span, new_text);
    if let Some(expected) = &expect {
        patch = patch.expecting(expected);
    }

    let (before, after) = patch.preview()?;
    if show_diff {
        display_diff(file, &before.render(), &after.render());
    }

    if dry_run {
        println!("{}", "[DRY RUN - file not modified]".cyan());
        return Ok(());
    }

    match patch.apply()? {
        PatchOutcome::Applied { bytes_written, .. } => println!(
            "{} {} {}: wrote {} bytes",
            "✓".green(),
            file.display(),
            span,
            bytes_written
        ),
        PatchOutcome::Unchanged { .. } => println!(
            "{} {} {}: already up to date",
            "✓".yellow(),
            file.display(),
            span
        ),
    }
    Ok(())
}

/// Helper: Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!("{}", format!("--- {} (original)", file.display()).dimmed());
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}
