use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facesym::overlay::OverlayNames;
use facesym::report::{self, ImageReport};
use facesym::{config, overlay, AnalysisSession, DisplayState, ModelPaths, Pipeline};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facesym")]
#[command(
    version,
    about = "Face symmetry analyzer - landmark overlay and bilateral symmetry score"
)]
struct Cli {
    /// Config file to use instead of the installed one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score face symmetry in one or more images
    Analyze {
        /// Images to analyze, each handled as a separate upload
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Write landmark overlays into this directory
        #[arg(short, long)]
        overlay: Option<PathBuf>,
        /// Draw overlays onto the image instead of a transparent canvas
        #[arg(long, requires = "overlay")]
        composite: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Directory holding the ONNX models
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
    /// Show where the models are expected and whether they are present
    Models {
        /// Directory holding the ONNX models
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
    /// Open config file in editor
    Config,
}

struct OverlayTarget {
    names: OverlayNames,
    composite: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            images,
            overlay,
            composite,
            json,
            models_dir,
        } => {
            let models_dir = models_dir.unwrap_or_else(|| cfg.models_dir.clone());
            let target = overlay.map(|dir| OverlayTarget {
                names: OverlayNames::new(dir),
                composite,
            });
            analyze(&cfg, &models_dir, &images, target, json)
        }
        Commands::Models { models_dir } => {
            let models_dir = models_dir.unwrap_or_else(|| cfg.models_dir.clone());
            models(&models_dir)
        }
        Commands::Config => open_config(cli.config.as_deref(), &cfg),
    }
}

fn analyze(
    cfg: &config::Config,
    models_dir: &Path,
    images: &[PathBuf],
    mut overlay: Option<OverlayTarget>,
    json: bool,
) -> Result<()> {
    info!("Loading models from {}", models_dir.display());
    let paths = ModelPaths::in_dir(models_dir);
    let mut session = AnalysisSession::start(|| Pipeline::load(&paths, cfg.detection()));

    if session.is_loading() {
        println!("{}", report::render_text(session.display()));
        anyhow::bail!(
            "models could not be loaded from {}. Run 'facesym models' to check.",
            models_dir.display()
        );
    }

    if let Some(target) = &overlay {
        let dir = target.names.dir();
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut reports = Vec::with_capacity(images.len());
    let mut failed = 0usize;

    for path in images {
        let (summary, text) = match analyze_one(&mut session, cfg, path, overlay.as_mut()) {
            Ok(done) => done,
            Err(e) => {
                warn!("{}: {:#}", path.display(), e);
                let text = format!("Analysis failed: {e:#}");
                (ImageReport::failed(path, &e), text)
            }
        };
        if summary.error.is_some() {
            failed += 1;
        }

        if json {
            reports.push(summary);
        } else if images.len() > 1 {
            println!("{}: {}", path.display(), text);
        } else {
            println!("{}", text);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    if failed > 0 {
        anyhow::bail!("{} of {} image(s) could not be analyzed", failed, images.len());
    }
    Ok(())
}

fn analyze_one(
    session: &mut AnalysisSession<Pipeline>,
    cfg: &config::Config,
    path: &Path,
    target: Option<&mut OverlayTarget>,
) -> Result<(ImageReport, String)> {
    let img = image::open(path).with_context(|| format!("opening {}", path.display()))?;
    let background = target
        .as_ref()
        .filter(|t| t.composite)
        .map(|_| img.clone());

    let pending = session.upload(img)?;
    let state = session
        .complete(pending)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("result was superseded by a newer upload"))?;

    let mut summary = ImageReport::new(path, &state);

    if let (Some(target), DisplayState::Done(analysis)) = (target, &state) {
        if !analysis.faces.is_empty() {
            let canvas =
                overlay::render_overlay(analysis.width, analysis.height, &analysis.faces, &cfg.overlay);
            let out = match &background {
                Some(img) => overlay::composite(img, &canvas),
                None => canvas,
            };

            let file = target.names.claim(path);
            out.save(&file)
                .with_context(|| format!("writing overlay {}", file.display()))?;
            info!("Overlay written to {}", file.display());
            summary.overlay = Some(file);
        }
    }

    Ok((summary, report::render_text(&state)))
}

fn models(models_dir: &Path) -> Result<()> {
    let paths = ModelPaths::in_dir(models_dir);
    for (label, path) in paths.entries() {
        let status = if path.is_file() { "ok" } else { "missing" };
        println!("{:<10} {:<8} {}", label, status, path.display());
    }

    let missing = paths.missing();
    if !missing.is_empty() {
        anyhow::bail!(
            "{} model file(s) missing from {}",
            missing.len(),
            models_dir.display()
        );
    }
    Ok(())
}

fn open_config(path: Option<&Path>, cfg: &config::Config) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(cfg, Some(config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
