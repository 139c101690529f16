use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use lightsim_author::{ObjectEdit, ObjectField, SettingsEdit, SettingsField};
use lightsim_common::{PixelBuffer, SceneObject, default_object};
use lightsim_persist::FileStore;
use lightsim_render::{OrchestratorConfig, RenderState, WorkerFactory};
use lightsim_scene::{LoadOrigin, SceneStore};
use lightsim_studio::{Studio, StudioConfig};
use lightsim_worker::{ProcessFactory, ThreadFactory, TraceSampler};
use tracing_subscriber::EnvFilter;

/// How long one `wait` blocks before the render loop checks state again.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "lightsim-cli", about = "Edit the saved light simulation scene and render it")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the saved scene
    #[arg(long, default_value = "./lightsim_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the state of the saved scene
    Info,
    /// Inspect or edit the scene objects
    #[command(subcommand)]
    Scene(SceneCommand),
    /// Inspect or edit the render settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Render the saved scene
    Render {
        /// Write the final image as a binary PPM file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Run the renderer in a child process instead of a thread
        #[arg(long)]
        process: bool,
        /// Seconds the renderer may take to start
        #[arg(long, default_value = "30")]
        load_timeout: u64,
    },
    /// Serve render requests on stdin/stdout (used by `render --process`)
    #[command(hide = true)]
    Worker,
}

#[derive(Subcommand)]
enum SceneCommand {
    /// List every object
    Show,
    /// Append an object
    Add(NewObject),
    /// Remove the object at an index
    Delete { index: usize },
    /// Remove every object
    Clear,
    /// Restore the default scene and settings
    Reset,
    /// Set one field of an object (x, y, z, radius, emission, color)
    Set {
        index: usize,
        field: String,
        value: String,
    },
}

#[derive(Args)]
struct NewObject {
    #[arg(long, default_value = "0")]
    x: String,
    #[arg(long, default_value = "0")]
    y: String,
    #[arg(long, default_value = "0")]
    z: String,
    #[arg(long, default_value = "1")]
    radius: String,
    /// `#rrggbb` or `r,g,b`
    #[arg(long, default_value = "#ffffff")]
    color: String,
    #[arg(long, default_value = "1")]
    emission: String,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the settings as JSON
    Show,
    /// Set one field (width, height, maxBounceCount, samplesPerPixel, camera.x, lookingAt.y, ...)
    Set { field: String, value: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the worker protocol, so logs always go to stderr.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            let store = open_store(&cli.data_dir)?;
            println!("lightsim-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("data dir: {}", cli.data_dir.display());
            let origin = match store.origin() {
                LoadOrigin::Persisted => "saved".to_owned(),
                LoadOrigin::Default => "default".to_owned(),
                LoadOrigin::Recovered(reason) => format!("default (saved scene unreadable: {reason})"),
            };
            println!("scene: {origin}, {} objects", store.len());
            let s = store.settings();
            println!(
                "settings: {}x{}, {} samples, {} bounces",
                s.width, s.height, s.samples_per_pixel, s.max_bounce_count
            );
        }
        Commands::Scene(cmd) => {
            let mut store = open_store(&cli.data_dir)?;
            run_scene(&mut store, cmd)?;
        }
        Commands::Settings(cmd) => {
            let mut store = open_store(&cli.data_dir)?;
            run_settings(&mut store, cmd)?;
        }
        Commands::Render {
            output,
            process,
            load_timeout,
        } => {
            let store = open_store(&cli.data_dir)?;
            let factory: Box<dyn WorkerFactory> = if process {
                let exe = std::env::current_exe().context("locating own executable")?;
                Box::new(ProcessFactory::new(exe).arg("worker"))
            } else {
                Box::new(ThreadFactory::new(TraceSampler::new))
            };
            let config = StudioConfig {
                auto_preview: false,
                orchestrator: OrchestratorConfig {
                    load_timeout: Duration::from_secs(load_timeout),
                },
            };
            let image = render(Studio::new(store, factory, config))?;
            if let Some(path) = output {
                write_ppm(&path, &image)?;
                println!("wrote {}", path.display());
            }
        }
        Commands::Worker => {
            let stdin = std::io::stdin().lock();
            let stdout = std::io::stdout().lock();
            lightsim_worker::serve(TraceSampler::new(), stdin, stdout)?;
        }
    }

    Ok(())
}

fn open_store(dir: &Path) -> anyhow::Result<SceneStore> {
    let backend = FileStore::open(dir)
        .with_context(|| format!("opening data dir {}", dir.display()))?;
    let store = SceneStore::open(Box::new(backend));
    tracing::debug!(dir = %dir.display(), objects = store.len(), "scene loaded");
    Ok(store)
}

fn run_scene(store: &mut SceneStore, cmd: SceneCommand) -> anyhow::Result<()> {
    match cmd {
        SceneCommand::Show => {
            if store.is_empty() {
                println!("(empty scene)");
            }
            for (index, object) in store.all().iter().enumerate() {
                println!("{index}: {}", describe(object));
            }
        }
        SceneCommand::Add(new) => {
            let mut object = default_object();
            for (field, text) in [
                (ObjectField::X, &new.x),
                (ObjectField::Y, &new.y),
                (ObjectField::Z, &new.z),
                (ObjectField::Radius, &new.radius),
                (ObjectField::Color, &new.color),
                (ObjectField::Emission, &new.emission),
            ] {
                ObjectEdit::parse(field, text)?.apply(&mut object);
            }
            let index = store.add(object);
            println!("{index}: {}", describe(&object));
        }
        SceneCommand::Delete { index } => match store.delete(index) {
            Some(object) => println!("deleted {index}: {}", describe(&object)),
            None => bail!("object {index} does not exist ({} objects)", store.len()),
        },
        SceneCommand::Clear => {
            store.clear();
            println!("scene cleared");
        }
        SceneCommand::Reset => {
            store.reset();
            println!("scene reset to defaults ({} objects)", store.len());
        }
        SceneCommand::Set {
            index,
            field,
            value,
        } => {
            let edit = ObjectEdit::parse(field.parse()?, &value)?;
            if !store.update(index, |object| edit.apply(object)) {
                bail!("object {index} does not exist ({} objects)", store.len());
            }
            if let Some(object) = store.get(index) {
                println!("{index}: {}", describe(object));
            }
        }
    }
    Ok(())
}

fn run_settings(store: &mut SceneStore, cmd: SettingsCommand) -> anyhow::Result<()> {
    match cmd {
        SettingsCommand::Show => {
            println!("{}", serde_json::to_string_pretty(store.settings())?);
        }
        SettingsCommand::Set { field, value } => {
            let field: SettingsField = field.parse()?;
            let mut settings = *store.settings();
            SettingsEdit::parse(field, &value)?.apply(&mut settings);
            store.set_settings(settings);
            println!("{field} updated");
        }
    }
    Ok(())
}

fn describe(object: &SceneObject) -> String {
    format!(
        "at ({}, {}, {}) radius {} color {} emission {}",
        object.x,
        object.y,
        object.z,
        object.radius,
        object.color.to_hex(),
        object.emission
    )
}

/// Load the worker, render the scene once and return the final image.
fn render(mut studio: Studio) -> anyhow::Result<PixelBuffer> {
    studio.on_render_event(|event| {
        if let RenderState::Rendering {
            progress,
            image: Some(_),
        } = event.state()
        {
            println!("frame: {:.0}%", progress * 100.0);
        }
    });

    studio.start();
    while studio.render_state() == &RenderState::Loading {
        studio.wait(POLL_INTERVAL);
    }
    if let Some(message) = studio.render_state().error_message() {
        bail!("{message}");
    }

    let objects = studio.store().len();
    let settings = *studio.store().settings();
    println!(
        "rendering {objects} objects at {}x{}, {} samples",
        settings.width, settings.height, settings.samples_per_pixel
    );
    studio.render()?;
    while !studio.render_state().is_settled() {
        studio.wait(POLL_INTERVAL);
    }

    match studio.render_state() {
        RenderState::Finished { image, stats } => {
            println!(
                "finished: {}s, {} samples/s, {} MP/s",
                stats.total_render_time, stats.samples_per_second, stats.megapixels_per_second
            );
            Ok(image.clone())
        }
        RenderState::Error { message } => bail!("{message}"),
        other => bail!("render stopped in state {}", other.name()),
    }
}

fn write_ppm(path: &Path, image: &PixelBuffer) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(&encode_ppm(image))?;
    out.flush()?;
    Ok(())
}

/// Binary PPM (P6); alpha is dropped.
fn encode_ppm(image: &PixelBuffer) -> Vec<u8> {
    let mut bytes = format!("P6\n{} {}\n255\n", image.width(), image.height()).into_bytes();
    for rgba in image.as_bytes().chunks_exact(4) {
        bytes.extend_from_slice(&rgba[..3]);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppm_header_and_rgb_payload() {
        let mut image = PixelBuffer::new(2, 1);
        image.set_pixel(1, 0, [10, 20, 30, 255]);
        let bytes = encode_ppm(&image);
        let header = b"P6\n2 1\n255\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..], &[0, 0, 0, 10, 20, 30]);
    }

    #[test]
    fn cli_parses_scene_set() {
        let cli = Cli::try_parse_from([
            "lightsim-cli",
            "--data-dir",
            "/tmp/x",
            "scene",
            "set",
            "2",
            "color",
            "#ff0000",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/x"));
        assert!(matches!(
            cli.command,
            Commands::Scene(SceneCommand::Set { index: 2, .. })
        ));
    }

    #[test]
    fn scene_commands_edit_the_store() {
        let mut store = SceneStore::in_memory();
        let before = store.len();
        run_scene(
            &mut store,
            SceneCommand::Set {
                index: 0,
                field: "radius".into(),
                value: "4".into(),
            },
        )
        .unwrap();
        assert_eq!(store.get(0).map(|o| o.radius), Some(4.0));
        assert!(run_scene(&mut store, SceneCommand::Delete { index: before }).is_err());
        run_scene(&mut store, SceneCommand::Clear).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn settings_set_parses_field_names() {
        let mut store = SceneStore::in_memory();
        run_settings(
            &mut store,
            SettingsCommand::Set {
                field: "samplesPerPixel".into(),
                value: "3".into(),
            },
        )
        .unwrap();
        assert_eq!(store.settings().samples_per_pixel, 3);
        assert!(
            run_settings(
                &mut store,
                SettingsCommand::Set {
                    field: "fov".into(),
                    value: "1".into(),
                },
            )
            .is_err()
        );
    }
}
