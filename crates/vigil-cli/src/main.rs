use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use vigil_core::{
    profiles, ChallengeController, Controller, ManualClock, MotionSentry, PresentationEvent,
    Presenter, ScanConfig, SentryConfig, SkinReport, SkinScan, SystemClock, ThresholdPolicy,
    TracingPresenter,
};
use vigil_runtime::{spawn_poller, spawn_sensor, Config};
use vigil_sense::{parse_trace, FaceLandmarks, ReplaySensor, TraceRecord};

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil liveness, motion and skin scan controllers")]
struct Cli {
    /// Emit presentation events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Send presentation events to the log instead of stdout
    #[arg(long, global = true, conflicts_with = "json")]
    log_events: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded trace through the liveness challenge
    Liveness {
        /// Built-in profile name
        #[arg(short, long, default_value = profiles::DEFAULT_PROFILE)]
        profile: String,
        /// Policy TOML file (overrides --profile)
        #[arg(long)]
        policy: Option<PathBuf>,
        /// JSON-lines trace file
        #[arg(short, long)]
        trace: PathBuf,
    },
    /// Replay an accelerometer trace through the motion sentry
    Motion {
        #[arg(short, long)]
        trace: PathBuf,
        /// Per-axis delta that triggers the alarm
        #[arg(long, default_value_t = 2.5)]
        threshold: f32,
        /// Arming countdown in seconds
        #[arg(long, default_value_t = 3)]
        arming_secs: u32,
    },
    /// Replay skin frames (metrics or image + landmarks) through a scan
    Skin {
        #[arg(short, long)]
        trace: PathBuf,
        /// Frames to average
        #[arg(long, default_value_t = 10)]
        frames: u32,
    },
    /// Compute skin metrics for one still image
    Image {
        /// RGB image file
        #[arg(short, long)]
        image: PathBuf,
        /// JSON array of 68 {"x", "y"} landmarks
        #[arg(short, long)]
        landmarks: PathBuf,
    },
    /// Run the live poller against a trace (configured from VIGIL_* env vars)
    Live {
        #[arg(short, long, value_enum)]
        mode: Mode,
        #[arg(short, long)]
        trace: PathBuf,
    },
    /// List built-in liveness profiles
    Profiles,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Liveness,
    Motion,
    Skin,
}

/// Prints every presentation event to stdout.
struct StdoutPresenter {
    json: bool,
}

impl Presenter for StdoutPresenter {
    fn present(&mut self, event: &PresentationEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode event"),
            }
        } else {
            println!(
                "[{:>3}%] {:<22} {} {}: {}",
                event.progress, event.state, event.icon, event.status, event.instruction
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.log_events && std::env::var_os("RUST_LOG").is_none() {
        tracing_subscriber::EnvFilter::new("vigil_core=info")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let presenter: Box<dyn Presenter + Send> = if cli.log_events {
        Box::new(TracingPresenter)
    } else {
        Box::new(StdoutPresenter { json: cli.json })
    };

    match cli.command {
        Commands::Liveness {
            profile,
            policy,
            trace,
        } => {
            let policy = match policy {
                Some(path) => ThresholdPolicy::from_file(&path)
                    .with_context(|| format!("loading policy {}", path.display()))?,
                None => profiles::load_profile(&profile)?,
            };
            let records = read_trace(&trace)?;
            let clock = ManualClock::new();
            let mut ctl = ChallengeController::new(policy, clock.clone(), presenter)?;
            ctl.start();
            replay(&mut ctl, &clock, records, trace_dir(&trace));
            println!(
                "session {} ({}) ended in {}",
                ctl.session().id(),
                ctl.policy().name,
                ctl.label(ctl.state())
            );
        }
        Commands::Motion {
            trace,
            threshold,
            arming_secs,
        } => {
            let records = read_trace(&trace)?;
            let clock = ManualClock::new();
            let config = SentryConfig {
                threshold,
                arming_secs,
            };
            let mut sentry = MotionSentry::new(config, clock.clone(), presenter);
            sentry.arm();
            replay(&mut sentry, &clock, records, trace_dir(&trace));
            println!("sentry ended {}", sentry.state().as_str());
            print_telemetry(sentry.telemetry());
        }
        Commands::Skin { trace, frames } => {
            let records = read_trace(&trace)?;
            let clock = ManualClock::new();
            let mut scan = SkinScan::new(ScanConfig { frames }, clock.clone(), presenter);
            scan.begin();
            replay(&mut scan, &clock, records, trace_dir(&trace));
            match scan.report() {
                Some(report) => print_report(&report, cli.json)?,
                None => println!(
                    "scan ended {}: {} of {} frames accepted",
                    scan.state().as_str(),
                    scan.frames_accepted(),
                    frames
                ),
            }
        }
        Commands::Image { image, landmarks } => {
            let frame = image::open(&image)
                .with_context(|| format!("opening {}", image.display()))?
                .to_rgb8();
            let raw = std::fs::read_to_string(&landmarks)
                .with_context(|| format!("reading {}", landmarks.display()))?;
            let points: FaceLandmarks = serde_json::from_str(&raw)
                .with_context(|| format!("parsing landmarks {}", landmarks.display()))?;
            let metrics = vigil_sense::skin::analyze_frame(&frame, &points)?;

            if cli.json {
                let value = serde_json::json!({
                    "health": metrics.health,
                    "acne": metrics.acne,
                    "texture": metrics.texture,
                    "circles": metrics.circles,
                    "eye_aspect_ratio": points.eye_aspect_ratio(),
                    "head_yaw": points.head_yaw(),
                });
                println!("{value}");
            } else {
                println!("health:   {:.1}", metrics.health);
                println!("acne:     {:.1}", metrics.acne);
                println!("texture:  {:.1}", metrics.texture);
                println!("circles:  {:.1}", metrics.circles);
                if let Some(ear) = points.eye_aspect_ratio() {
                    println!("EAR:      {ear:.3}");
                }
                if let Some(yaw) = points.head_yaw() {
                    println!("yaw:      {yaw:+.3}");
                }
            }
        }
        Commands::Live { mode, trace } => {
            let config = Config::from_env();
            let source = ReplaySensor::from_trace(read_trace(&trace)?, trace_dir(&trace));
            tracing::info!(observations = source.remaining(), "starting live replay");
            let sensor = spawn_sensor(source)?;

            match mode {
                Mode::Liveness => {
                    let mut ctl =
                        ChallengeController::new(config.load_policy()?, SystemClock::new(), presenter)?;
                    ctl.start();
                    let report = run(spawn_poller(ctl, sensor, config.poll_interval())).await?;
                    println!(
                        "session {} ({}) ended in {} after {} ticks ({} skipped)",
                        report.controller.session().id(),
                        report.controller.policy().name,
                        report.controller.label(report.controller.state()),
                        report.ticks,
                        report.skipped
                    );
                }
                Mode::Motion => {
                    let mut sentry =
                        MotionSentry::new(config.sentry_config(), SystemClock::new(), presenter);
                    sentry.arm();
                    let report = run(spawn_poller(sentry, sensor, config.poll_interval())).await?;
                    println!(
                        "sentry ended {} after {} ticks",
                        report.controller.state().as_str(),
                        report.ticks
                    );
                    print_telemetry(report.controller.telemetry());
                }
                Mode::Skin => {
                    let mut scan =
                        SkinScan::new(config.scan_config(), SystemClock::new(), presenter);
                    scan.begin();
                    let report = run(spawn_poller(scan, sensor, config.scan_interval())).await?;
                    match report.controller.report() {
                        Some(r) => print_report(&r, cli.json)?,
                        None => println!("scan ended {}", report.controller.state().as_str()),
                    }
                }
            }
        }
        Commands::Profiles => {
            for policy in profiles::list_profiles() {
                let marker = if policy.name == profiles::DEFAULT_PROFILE {
                    " (default)"
                } else {
                    ""
                };
                let steps: Vec<&str> = policy.challenges.iter().map(|s| s.name.as_str()).collect();
                println!(
                    "{}{marker}: {} (timeout {} ms)",
                    policy.name,
                    steps.join(" -> "),
                    policy.challenge_timeout_ms
                );
            }
        }
    }

    Ok(())
}

/// Wait for the poller to settle; Ctrl-C stops it early.
async fn run<T>(handle: vigil_runtime::PollerHandle<T>) -> Result<vigil_runtime::PollReport<T>> {
    let signal = handle.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted; stopping poller");
            signal.trigger();
        }
    });
    Ok(handle.wait().await?)
}

/// Feed a recorded trace through a controller on a manual clock, stopping
/// once it settles.
fn replay<T: Controller>(ctl: &mut T, clock: &ManualClock, records: Vec<TraceRecord>, base: &Path) {
    for record in records {
        clock.set(record.t_ms);
        match record.observation.resolve(base) {
            Ok(measurement) => {
                ctl.tick(measurement);
            }
            Err(e) if e.is_frame_error() => {
                ctl.frame_failed(&e.to_string());
            }
            Err(e) => {
                ctl.fail(&e.to_string());
                break;
            }
        }
        if ctl.is_settled() {
            tracing::debug!(t_ms = record.t_ms, state = %ctl.state_label(), "replay settled");
            break;
        }
    }
}

/// Frame paths in a trace are relative to the trace file.
fn trace_dir(trace: &Path) -> &Path {
    trace.parent().unwrap_or_else(|| Path::new("."))
}

fn read_trace(path: &Path) -> Result<Vec<TraceRecord>> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace {}", path.display()))?;
    let records = parse_trace(&src)?;
    tracing::info!(path = %path.display(), records = records.len(), "trace loaded");
    Ok(records)
}

fn print_report(report: &SkinReport, json: bool) -> Result<()> {
    let diagnostic = report.diagnostic();
    let severity = report.severities();
    if json {
        let value = serde_json::json!({
            "report": report,
            "severity": severity,
            "diagnostic": diagnostic,
        });
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!("health:      {}%", report.health);
        println!("acne:        {} ({}%)", severity.acne, report.acne);
        println!("texture:     {} ({}%)", severity.texture, report.texture);
        println!("circles:     {} ({}%)", severity.circles, report.circles);
        println!("diagnosis:   {}", diagnostic.diagnosis);
        println!("ingredients: {}", diagnostic.ingredients);
        println!("routine:     {}", diagnostic.routine);
    }
    Ok(())
}

fn print_telemetry(reading: Option<[f32; 3]>) {
    match reading {
        Some([x, y, z]) => println!("last reading: x {x:.2}  y {y:.2}  z {z:.2}"),
        None => println!("last reading: none"),
    }
}
