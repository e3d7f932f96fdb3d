use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tokio::time::{sleep, Duration};

use geo_anchor::sensors::mock::{MockCamera, MockCompass, MockGeolocation};
use geo_anchor::sensors::{MapInset, Notice, NoticeLevel, Renderer, StatusSink, UserGesture};
use geo_anchor::{ArConfig, ArSession, Collaborators, FrameOutput, VisibilityMode};

/// Where the simulated walk starts
const START_LAT: f64 = 48.8566;
const START_LON: f64 = 2.3522;

#[derive(Parser, Debug)]
#[command(name = "geo_anchor")]
#[command(about = "Geo-anchored overlay driven by simulated sensors", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for the final status
    #[arg(long, default_value = "geo_anchor_sessions")]
    output_dir: String,

    /// Vertical field of view (degrees)
    #[arg(long)]
    fov: Option<f64>,

    /// Visibility test (frustum, forward_cone)
    #[arg(long)]
    visibility: Option<VisibilityMode>,

    /// Start without a user gesture, as a page would on load
    #[arg(long)]
    no_gesture: bool,
}

/// Logs what a real renderer would draw
#[derive(Default)]
struct LogRenderer {
    last_visible: Option<bool>,
}

impl Renderer for LogRenderer {
    fn draw(&mut self, frame: &FrameOutput) {
        if self.last_visible != Some(frame.anchor.visible) {
            match frame.anchor.local_position {
                Some(p) => println!(
                    "[{}] Anchor {} at ({:.2}, {:.2}, {:.2}), yaw {:.0}",
                    ts_now(),
                    if frame.anchor.visible { "visible" } else { "hidden" },
                    p.x,
                    p.y,
                    p.z,
                    frame.camera.yaw_deg
                ),
                None => println!("[{}] Anchor not placed yet", ts_now()),
            }
            self.last_visible = Some(frame.anchor.visible);
        }
        if frame.frame_index % 300 == 0 {
            log::debug!(
                "frame {} yaw {:.1} locked {}",
                frame.frame_index,
                frame.camera.yaw_deg,
                frame.reference_locked
            );
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        log::info!("Surface resized to {}x{}", width, height);
    }
}

struct LogMap;

impl MapInset for LogMap {
    fn set_view(&mut self, lat: f64, lon: f64, zoom: Option<u8>) {
        match zoom {
            Some(zoom) => log::info!("Map centred on {:.6}, {:.6} at zoom {}", lat, lon, zoom),
            None => log::debug!("Map recentred on {:.6}, {:.6}", lat, lon),
        }
    }
}

struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn show(&mut self, notice: &Notice) {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        println!("[{}] ({}) {}", ts_now(), tag, notice.message);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // Sensor tasks and the session loop share one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let mut config = ArConfig::load_or_default(args.config.as_deref())?;
    if let Some(fov) = args.fov {
        config.projection.fov_deg = fov;
    }
    if let Some(mode) = args.visibility {
        config.visibility = mode;
    }

    println!("[{}] Geo anchor starting", ts_now());
    println!("  Duration: {} seconds (0=until Ctrl-C)", args.duration);
    println!("  Visibility: {:?}", config.visibility);
    println!("  FOV: {:.0} deg", config.projection.fov_deg);
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let collaborators = Collaborators {
        geolocation: Box::new(MockGeolocation::walk(
            START_LAT,
            START_LON,
            30.0,
            Duration::from_secs(1),
        )),
        heading: Box::new(MockCompass::sweep(0.0, 2.0, Duration::from_millis(100)).gesture_gated()),
        camera: Box::new(MockCamera::default()),
        renderer: Box::new(LogRenderer::default()),
        map: Some(Box::new(LogMap)),
        status: Box::new(ConsoleStatus),
    };
    let mut session = ArSession::new(config, collaborators)?;

    let gesture = if args.no_gesture {
        None
    } else {
        Some(UserGesture::now())
    };
    if let Err(err) = session.start(gesture).await {
        save_status(&session, &args.output_dir);
        return Err(err.into());
    }

    let duration = args.duration;
    let shutdown = async move {
        if duration > 0 {
            tokio::select! {
                _ = sleep(Duration::from_secs(duration)) => {
                    println!("[{}] Duration reached, stopping...", ts_now());
                }
                _ = interrupted() => {
                    println!("[{}] Interrupted, stopping...", ts_now());
                }
            }
        } else {
            interrupted().await;
            println!("[{}] Interrupted, stopping...", ts_now());
        }
    };

    let outcome = session.run(shutdown).await;
    save_status(&session, &args.output_dir);

    let summary = outcome?;
    println!(
        "[{}] {} frames, {} fixes, {} headings ({} discarded) in {:.1}s",
        ts_now(),
        summary.frames_rendered,
        summary.fixes_received,
        summary.headings_accepted,
        summary.headings_discarded,
        summary.duration_secs
    );
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("Ctrl-C handler unavailable: {}", err);
        std::future::pending::<()>().await;
    }
}

fn save_status(session: &ArSession, output_dir: &str) {
    let status = session.status();
    println!("[{}] {}", ts_now(), status.summary_line());

    let path = format!("{}/status_{}.json", output_dir, ts_now_clean());
    match status.save(&path) {
        Ok(()) => println!("[{}] Status saved to {}", ts_now(), path),
        Err(err) => log::warn!("Failed to save status to {}: {}", path, err),
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
