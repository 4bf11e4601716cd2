// src/main.rs
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use picture_cache::config::{load_config, load_config_from};
use picture_cache::pictures::{uri, FolderThumbs, Picture};
use picture_cache::viewer::ViewerApp;

#[derive(Parser, Debug)]
#[command(name = "picture-cache", version, about = "Thumbnail and fanart cache for media artwork")]
struct Cli {
    /// Config file; defaults to $PICTURE_CACHE_CONFIG or ./config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cache a picture as a thumbnail at the configured thumb size.
    Thumb {
        source: String,
        dest: String,
        /// Keep an existing thumbnail instead of regenerating it.
        #[arg(long)]
        keep_existing: bool,
    },
    /// Cache a picture as fanart (16:9 box at the configured height).
    Fanart { source: String, dest: String },
    /// Cache a picture bounded by an explicit box; 0x0 copies it unchanged.
    Cache {
        source: String,
        dest: String,
        #[arg(long, default_value_t = 0)]
        width: u32,
        #[arg(long, default_value_t = 0)]
        height: u32,
    },
    /// Thumbnail an in-memory image, e.g. embedded album art dumped to a file.
    MemoryThumb {
        input: PathBuf,
        dest: String,
        /// Format hint; defaults to the input's extension.
        #[arg(long)]
        ext: Option<String>,
    },
    /// Build a 2x2 folder thumbnail from up to four pictures.
    FolderThumb {
        dest: String,
        #[arg(num_args = 1..=4, required = true)]
        sources: Vec<String>,
    },
    /// Rotate, mirror and resize a picture.
    Convert {
        source: String,
        dest: String,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        rotate: f32,
        #[arg(long, default_value_t = 0)]
        width: u32,
        #[arg(long, default_value_t = 0)]
        height: u32,
        /// JPEG quality, 0 = configured default.
        #[arg(long, default_value_t = 0)]
        quality: u32,
        #[arg(long)]
        mirror: bool,
    },
    /// Cache a skin image through the texture loader.
    Skin { source: String, dest: String },
    /// Remove stale downloads from the temp directory.
    CleanTemp,
    /// Open a picture in a window using the texture loader.
    View {
        file: String,
        #[arg(long, default_value_t = 0)]
        width: u32,
        #[arg(long, default_value_t = 0)]
        height: u32,
    },
}

fn pick_renderer() -> eframe::Renderer {
    match env::var("PICTURE_CACHE_RENDERER").as_deref() {
        Ok("glow") => eframe::Renderer::Glow,
        Ok("wgpu") => eframe::Renderer::Wgpu,
        _ => {
            #[cfg(target_os = "windows")]
            { eframe::Renderer::Wgpu }
            #[cfg(not(target_os = "windows"))]
            { eframe::Renderer::Glow }
        }
    }
}

fn view(picture: Picture, file: String, width: u32, height: u32) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        renderer: pick_renderer(),
        multisampling: 0,
        ..Default::default()
    };
    let app = ViewerApp::new(picture, file, width, height);
    eframe::run_native(
        "Picture Viewer",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| {
        error!("Hint: try PICTURE_CACHE_RENDERER=wgpu or glow.");
        anyhow::anyhow!("eframe failed to start: {e}")
    })
}

fn status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let mut picture = Picture::new(config);

    let code = match cli.command {
        Command::Thumb {
            source,
            dest,
            keep_existing,
        } => status(picture.create_thumbnail(&source, &dest, keep_existing)),
        Command::Fanart { source, dest } => status(picture.cache_fanart(&source, &dest)),
        Command::Cache {
            source,
            dest,
            width,
            height,
        } => status(picture.cache_image(&source, &dest, width, height)),
        Command::MemoryThumb { input, dest, ext } => {
            let buffer = fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let ext = ext.unwrap_or_else(|| {
                uri::get_extension(&input.to_string_lossy())
                    .trim_start_matches('.')
                    .to_string()
            });
            status(picture.create_thumbnail_from_memory(&buffer, &ext, &dest))
        }
        Command::FolderThumb { dest, sources } => {
            let mut thumbs: FolderThumbs = Default::default();
            for (slot, source) in thumbs.iter_mut().zip(sources) {
                *slot = source;
            }
            status(picture.create_folder_thumb(&thumbs, &dest))
        }
        Command::Convert {
            source,
            dest,
            rotate,
            width,
            height,
            quality,
            mirror,
        } => {
            match picture.convert_file(&source, &dest, rotate, width, height, quality, mirror) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => ExitCode::from(e.code() as u8),
            }
        }
        Command::Skin { source, dest } => status(picture.cache_skin_image(&source, &dest)),
        Command::CleanTemp => {
            let removed = picture.clean_temp();
            info!("removed {removed} temp file(s)");
            ExitCode::SUCCESS
        }
        Command::View {
            file,
            width,
            height,
        } => {
            view(picture, file, width, height)?;
            ExitCode::SUCCESS
        }
    };
    Ok(code)
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
