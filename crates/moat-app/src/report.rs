use std::path::Path;

use crate::app::LoopStats;

/// Summary of a demo run, written as JSON with `--output`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunReport {
    pub backend: String,
    pub ticks: u64,
    pub frame_resources: usize,
    pub simulated_seconds: f32,
    pub draws_per_frame: usize,
    pub layer_switches_per_frame: usize,
    pub blocking_fence_waits: u64,
    pub objects_written: u64,
    pub materials_written: u64,
    pub disturbances: u64,
    pub largest_disturbance: f32,
    pub peak_wave_height: f32,
}

impl RunReport {
    /// Fill the per-loop counters from `stats`; the caller sets the rest.
    pub fn from_stats(backend: impl Into<String>, stats: &LoopStats) -> Self {
        Self {
            backend: backend.into(),
            ticks: stats.frames_rendered,
            frame_resources: 0,
            simulated_seconds: 0.0,
            draws_per_frame: stats.draws_last_frame,
            layer_switches_per_frame: stats.layer_switches_last_frame,
            blocking_fence_waits: 0,
            objects_written: stats.objects_written,
            materials_written: stats.materials_written,
            disturbances: 0,
            largest_disturbance: 0.0,
            peak_wave_height: stats.peak_wave_height,
        }
    }

    /// Peak height relative to the largest disturbance applied.
    pub fn amplification(&self) -> Option<f32> {
        (self.largest_disturbance > 0.0).then(|| self.peak_wave_height / self.largest_disturbance)
    }
}

/// Load a report from a JSON file. Returns None if the file doesn't exist.
pub fn load_report(path: &Path) -> Option<RunReport> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Save a report to a JSON file.
pub fn save_report(path: &Path, report: &RunReport) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// Format a report as a markdown table.
pub fn format_markdown(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("| Metric | Value |\n");
    out.push_str("|--------|-------|\n");
    let rows = [
        ("Backend", report.backend.clone()),
        ("Ticks", report.ticks.to_string()),
        ("Frame resources", report.frame_resources.to_string()),
        ("Simulated time (s)", format!("{:.2}", report.simulated_seconds)),
        ("Draws / frame", report.draws_per_frame.to_string()),
        ("Layer switches / frame", report.layer_switches_per_frame.to_string()),
        ("Blocking fence waits", report.blocking_fence_waits.to_string()),
        ("Object constant writes", report.objects_written.to_string()),
        ("Material constant writes", report.materials_written.to_string()),
        ("Disturbances", report.disturbances.to_string()),
        ("Peak wave height", format!("{:.4}", report.peak_wave_height)),
    ];
    for (name, value) in rows {
        out.push_str(&format!("| {name} | {value} |\n"));
    }
    out
}
