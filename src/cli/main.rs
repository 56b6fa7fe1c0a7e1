use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use photo_meta::batch::{self, Batch, BatchOp, BatchOptions, BatchReport, Done};
use photo_meta::codec::{self, ReadOutput};
use photo_meta::config::Config;
use photo_meta::export::{self, ExportFormat};
use photo_meta::fields::FieldProfile;
use photo_meta::metadata::{MetaValue, NormalizedMetadata};
use photo_meta::rename::{CaseTransform, RenameMode, RenameRule};
use photo_meta::template::{self, FsTemplateStore, Template, TemplateStore};

#[derive(Parser, Debug)]
#[command(
    name = "photo-meta",
    version,
    about = "Read, edit, and clear EXIF/XMP/IPTC metadata in JPEG, PNG, TIFF, GIF and BMP files"
)]
struct Cli {
    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Display the metadata of image files
    Show {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write field values to image files
    #[command(group(ArgGroup::new("values").required(true).multiple(true).args(["set", "template"])))]
    Apply {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Field to set; a group label (Title, Tags, Rights, ...) or a storage
        /// key (XPSubject, dc:rights, ...). An empty value removes the field.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Apply a saved template (values from --set win)
        #[arg(long, value_name = "NAME")]
        template: Option<String>,

        /// Write copies here instead of modifying the originals
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Preview changes without writing to files
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove all EXIF/XMP/IPTC metadata
    Clear {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Export metadata reports, one per image
    Export {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// json or txt (default from config)
        #[arg(long)]
        format: Option<ExportFormat>,

        /// Where reports go (default: next to each image)
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },

    /// Manage metadata templates
    Template {
        #[command(subcommand)]
        action: TemplateCommand,
    },

    /// Rename image files
    #[command(group(ArgGroup::new("mode").required(true).args(["pattern", "prefix", "suffix", "find", "increment"])))]
    Rename {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// New stem; {index}, {name} and {ext} are substituted
        #[arg(long)]
        pattern: Option<String>,

        #[arg(long)]
        prefix: Option<String>,

        #[arg(long)]
        suffix: Option<String>,

        /// Text to replace in the stem (use with --replace)
        #[arg(long)]
        find: Option<String>,

        #[arg(long, requires = "find", default_value = "")]
        replace: String,

        /// Append _<index> to the stem
        #[arg(long)]
        increment: bool,

        #[arg(long, default_value_t = 1)]
        start: u32,

        /// Zero-pad {index} to this many digits
        #[arg(long, default_value_t = 0)]
        padding: usize,

        /// keep, lower, upper or title
        #[arg(long, default_value = "keep")]
        case: CaseTransform,

        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// List saved templates
    List,
    /// Print a template as JSON
    Show { name: String },
    /// Save a template from --set values and/or an image's current fields
    Save {
        name: String,

        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Take the editable fields of this image
        #[arg(long, value_name = "IMAGE")]
        from: Option<PathBuf>,

        #[arg(long, default_value = "")]
        description: String,
    },
    /// Delete a template
    Delete { name: String },
    /// Write all templates to one JSON file
    Export { file: PathBuf },
    /// Load templates from a file written by `template export`
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    let Some(command) = cli.command else {
        anyhow::bail!("No command specified. Use --help for usage.");
    };
    let mut config = Config::load(cli.config.as_deref())?;

    match command {
        Command::Show { paths, json } => show(&collect(&paths)?, json, config.fields.profile),
        Command::Apply {
            paths,
            set,
            template,
            out_dir,
            dry_run,
        } => {
            config.output.dry_run |= dry_run;
            let profile = config.fields.profile;
            let mut overlay = match template {
                Some(name) => load_template(&config, &name)?.to_overlay(profile),
                None => NormalizedMetadata::new(),
            };
            // Explicit values win; empty ones stay so the writer removes the field
            for (key, value) in &assignments_overlay(&set, profile)? {
                overlay.set(key.clone(), value.clone());
            }
            if overlay.is_empty() {
                anyhow::bail!("Nothing to apply: no editable fields given.");
            }
            let files = collect(&paths)?;
            let report = run_batch(Batch::new(BatchOp::Apply(overlay)), files, &config, out_dir).await?;
            print_report(&report);
            Ok(())
        }
        Command::Clear {
            paths,
            out_dir,
            dry_run,
        } => {
            config.output.dry_run |= dry_run;
            let files = collect(&paths)?;
            let report = run_batch(Batch::new(BatchOp::Clear), files, &config, out_dir).await?;
            print_report(&report);
            Ok(())
        }
        Command::Export {
            paths,
            format,
            out_dir,
        } => export_all(&collect(&paths)?, format.unwrap_or(config.output.export_format), out_dir.as_deref()),
        Command::Template { action } => template_command(action, &config),
        Command::Rename {
            paths,
            pattern,
            prefix,
            suffix,
            find,
            replace,
            increment,
            start,
            padding,
            case,
            dry_run,
        } => {
            config.output.dry_run |= dry_run;
            let mode = match (pattern, prefix, suffix, find) {
                (Some(pattern), ..) => RenameMode::Pattern { pattern },
                (_, Some(prefix), ..) => RenameMode::Prefix { prefix },
                (_, _, Some(suffix), _) => RenameMode::Suffix { suffix },
                (.., Some(find)) => RenameMode::FindReplace { find, replace },
                _ if increment => RenameMode::Increment,
                _ => anyhow::bail!("No rename mode given."),
            };
            let rule = RenameRule::new(mode).start(start).padding(padding).case(case);
            let files = collect(&paths)?;
            if config.output.dry_run {
                for (from, to) in rule.preview(&files) {
                    println!("  {} {DIM}→{RESET} {GREEN}{}{RESET}", from.display(), to.display());
                }
            }
            let report = run_batch(Batch::new(BatchOp::Rename(rule)), files, &config, None).await?;
            print_report(&report);
            Ok(())
        }
    }
}

/// Collect images, failing when there are none.
fn collect(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let images = batch::collect_images(paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }
    log::info!("Found {} image(s) to process", images.len());
    Ok(images)
}

/// Run a batch on a worker; Ctrl-C stops it before the next file.
async fn run_batch(batch: Batch, files: Vec<PathBuf>, config: &Config, out_dir: Option<PathBuf>) -> Result<BatchReport> {
    let options = BatchOptions {
        write: config.write_options(),
        output_dir: out_dir,
        backup_originals: config.output.backup_originals,
    };
    let mut handle = batch.options(options).spawn(files);

    let cancel = handle.cancel_flag();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping after the current file...");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    while let Some(progress) = handle.progress.recv().await {
        log::debug!("{}/{} done", progress.done, progress.total);
    }
    ctrl_c.abort();

    let report = handle.join().await.context("Batch worker failed")?;
    if report.cancelled {
        log::warn!("Cancelled: {} file(s) not processed", report.not_processed);
    }
    Ok(report)
}

fn print_report(report: &BatchReport) {
    for item in &report.items {
        match &item.outcome {
            Ok(Done::Written(result)) => {
                if !result.fields_written.is_empty() {
                    let verb = if result.dry_run { "Would write" } else { "Wrote" };
                    log::info!("  {}: {verb} {}", item.path.display(), result.fields_written.join(", "));
                }
                if !result.fields_removed.is_empty() {
                    let verb = if result.dry_run { "Would remove" } else { "Removed" };
                    log::info!("  {}: {verb} {}", item.path.display(), result.fields_removed.join(", "));
                }
                if result.is_unchanged() {
                    log::info!("  {}: unchanged", item.path.display());
                }
            }
            Ok(Done::Renamed { to }) => log::debug!("  {} -> {}", item.path.display(), to.display()),
            Err(_) => {}
        }
    }
    for (path, err) in report.failures() {
        log::error!("  Failed: {} ({})", path.display(), err.kind());
    }
    log::info!("{}", report.summary());
}

/// Turn `KEY=VALUE` arguments into an overlay. Keys may be group labels or
/// storage keys.
fn assignments_overlay(assignments: &[String], profile: FieldProfile) -> Result<NormalizedMetadata> {
    let mut values = NormalizedMetadata::new();
    for assignment in assignments {
        let (key, value) = assignment
            .split_once('=')
            .with_context(|| format!("Expected KEY=VALUE, got '{assignment}'"))?;
        values.set(key.trim(), MetaValue::Text(value.to_string()));
    }
    Ok(Template::new("cli", "", values).to_overlay(profile))
}

fn template_store(config: &Config) -> Result<FsTemplateStore> {
    Ok(FsTemplateStore::new(config.template_dir()?))
}

fn load_template(config: &Config, name: &str) -> Result<Template> {
    template_store(config)?
        .get(name)?
        .with_context(|| format!("No template named '{name}'"))
}

fn template_command(action: TemplateCommand, config: &Config) -> Result<()> {
    let mut store = template_store(config)?;
    let profile = config.fields.profile;
    match action {
        TemplateCommand::List => {
            let names = store.list()?;
            if names.is_empty() {
                println!("{DIM}(no templates in {}){RESET}", store.dir().display());
            }
            for name in names {
                match store.get(&name)? {
                    Some(t) if !t.description.is_empty() => println!("{BOLD}{name}{RESET}  {DIM}{}{RESET}", t.description),
                    _ => println!("{BOLD}{name}{RESET}"),
                }
            }
        }
        TemplateCommand::Show { name } => {
            let t = load_template(config, &name)?;
            println!("{}", serde_json::to_string_pretty(&t)?);
        }
        TemplateCommand::Save {
            name,
            set,
            from,
            description,
        } => {
            let mut template = match from {
                Some(image) => {
                    let out = codec::read_metadata(&image)?;
                    Template::from_metadata(&name, &description, &out.metadata, profile)
                }
                None => Template::new(&name, &description, NormalizedMetadata::new()),
            };
            for assignment in &set {
                let (key, value) = assignment
                    .split_once('=')
                    .with_context(|| format!("Expected KEY=VALUE, got '{assignment}'"))?;
                template.metadata.set(key.trim(), value);
            }
            if template.metadata.is_empty() {
                anyhow::bail!("Template '{name}' would be empty; give --set or --from.");
            }
            store.put(&template)?;
        }
        TemplateCommand::Delete { name } => {
            if !store.delete(&name)? {
                anyhow::bail!("No template named '{name}'");
            }
        }
        TemplateCommand::Export { file } => {
            let count = template::export_templates(&store, &file)?;
            println!("Exported {count} template(s) to {}", file.display());
        }
        TemplateCommand::Import { file } => {
            let count = template::import_templates(&mut store, &file)?;
            println!("Imported {count} template(s) into {}", store.dir().display());
        }
    }
    Ok(())
}

fn export_all(images: &[PathBuf], format: ExportFormat, out_dir: Option<&Path>) -> Result<()> {
    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let (mut ok, mut failed) = (0, 0);
    for image in images {
        let stem = image.file_stem().unwrap_or_default().to_string_lossy();
        let name = format!("{stem}_metadata.{}", format.extension());
        let dest = match out_dir {
            Some(dir) => dir.join(name),
            None => image.with_file_name(name),
        };
        let result = codec::read_metadata(image)
            .map_err(anyhow::Error::from)
            .and_then(|out| export::export_to_file(image, &out.general, &out.metadata, format, &dest));
        match result {
            Ok(()) => ok += 1,
            Err(e) => {
                log::error!("Failed to export {}: {e:#}", image.display());
                failed += 1;
            }
        }
    }
    log::info!("Done: {ok} succeeded, {failed} failed");
    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

fn show(images: &[PathBuf], json: bool, profile: FieldProfile) -> Result<()> {
    if json {
        let mut docs = Vec::new();
        for image in images {
            match codec::read_metadata(image) {
                Ok(out) => docs.push(serde_json::json!({
                    "path": image.display().to_string(),
                    "general": out.general,
                    "metadata": out.metadata,
                    "notices": out.notices.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
                })),
                Err(e) => docs.push(serde_json::json!({
                    "path": image.display().to_string(),
                    "error": e.to_string(),
                    "kind": e.kind(),
                })),
            }
        }
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    for image in images {
        match codec::read_metadata(image) {
            Ok(out) => print_metadata(image, &out, profile),
            Err(e) => log::error!("{}: {e}", image.display()),
        }
    }
    Ok(())
}

/// Print one file's metadata, organized by section.
fn print_metadata(path: &Path, out: &ReadOutput, profile: FieldProfile) {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    // --- General ---
    println!("  {BOLD}General{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    print_row("Format", out.general.format.name());
    if let (Some(w), Some(h)) = (out.general.width, out.general.height) {
        print_row("ImageSize", &format!("{w} x {h}"));
    }
    print_row("FileSize", &format!("{} bytes", out.general.file_size));
    println!();

    // --- Editable groups, under the profile's labels ---
    let groups: Vec<_> = profile
        .groups()
        .iter()
        .filter_map(|g| Some((g.label(profile), g.display_value(&out.metadata)?)))
        .collect();
    if !groups.is_empty() {
        println!("  {BOLD}Descriptive Metadata{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (label, value) in groups {
            print_row(label, &value.as_text());
        }
        println!();
    }

    // --- Everything ---
    if out.metadata.is_empty() {
        println!("  {DIM}(no metadata found){RESET}");
        println!();
    } else {
        println!("  {BOLD}All Fields{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (key, value) in &out.metadata {
            print_row(key, &value.as_text());
        }
        println!();
    }

    for notice in &out.notices {
        println!("  {YELLOW}! {notice}{RESET}");
    }
}

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print a single row in the metadata table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
