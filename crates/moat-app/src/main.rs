use std::path::PathBuf;
use std::process;

use moat_app::config::{load_config, DemoConfig};
use moat_app::report::{self, RunReport};
use moat_app::SceneUpdateLoop;
use moat_core::MoatResult;
use moat_render::{HeadlessBackend, RenderBackend};

fn run<B: RenderBackend>(backend: B, name: &str, config: DemoConfig, ticks: u64, dt: f32) -> MoatResult<RunReport> {
    let mut app = SceneUpdateLoop::new(backend, config)?;
    for _ in 0..ticks {
        app.tick(dt)?;
    }

    let mut report = RunReport::from_stats(name, &app.stats());
    report.frame_resources = app.ring().len();
    report.simulated_seconds = app.timer().total_time();
    report.blocking_fence_waits = app.ring().blocking_waits();
    report.disturbances = app.disturb().fired();
    report.largest_disturbance = app.disturb().largest_magnitude();
    Ok(report)
}

#[cfg(feature = "backend_wgpu")]
fn run_gpu(config: DemoConfig, ticks: u64, dt: f32) -> MoatResult<RunReport> {
    let (width, height) = (config.viewport.width, config.viewport.height);
    let backend = moat_render::WgpuBackend::new_headless(width, height)?;
    let name = format!("wgpu ({})", backend.adapter_name());
    run(backend, &name, config, ticks, dt)
}

#[cfg(not(feature = "backend_wgpu"))]
fn run_gpu(_config: DemoConfig, _ticks: u64, _dt: f32) -> MoatResult<RunReport> {
    Err(moat_core::DeviceError::Init("built without the backend_wgpu feature".into()).into())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut tick_count = 600u64;
    let mut dt = 1.0f32 / 60.0;
    let mut use_gpu = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(PathBuf::from(&args[i]));
            }
            "--output" => {
                i += 1;
                output_path = Some(PathBuf::from(&args[i]));
            }
            "--ticks" => {
                i += 1;
                tick_count = args[i].parse().expect("invalid --ticks value");
            }
            "--dt" => {
                i += 1;
                dt = args[i].parse().expect("invalid --dt value");
            }
            "--gpu" => use_gpu = true,
            "--help" | "-h" => {
                eprintln!("Usage: moat-demo [OPTIONS]");
                eprintln!("  --config <path>   Demo configuration RON (default: bundled)");
                eprintln!("  --ticks <n>       Frames to run (default: 600)");
                eprintln!("  --dt <seconds>    Time step per frame (default: 1/60)");
                eprintln!("  --gpu             Render with wgpu instead of the headless backend");
                eprintln!("  --output <path>   Save the run report as JSON");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => load_config(path),
        None => DemoConfig::bundled(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("configuration error: {e}");
            process::exit(2);
        }
    };

    let result = if use_gpu {
        log::info!("Initializing GPU...");
        run_gpu(config, tick_count, dt)
    } else {
        run(HeadlessBackend::new(), "headless", config, tick_count, dt)
    };
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            log::error!("run aborted: {e}");
            process::exit(if e.is_fatal() { 3 } else { 1 });
        }
    };

    println!("\n## Moat Demo Run\n");
    println!("{}", report::format_markdown(&report));

    if let Some(ref path) = output_path {
        report::save_report(path, &report).expect("failed to save report");
        log::info!("Saved report to {}", path.display());
    }
}
