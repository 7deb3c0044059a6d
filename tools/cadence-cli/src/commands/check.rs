//! Check system capabilities.

use cadence_assembly_engine::{Compositor, FfmpegCompositor, FfprobeBackend};
use cadence_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Cadence System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = FfmpegCompositor::new().is_available();
    if ffmpeg {
        println!("[OK] ffmpeg found (composition available)");
    } else {
        println!("[MISSING] ffmpeg not found; `cadence assemble` cannot render");
    }

    let ffprobe = FfprobeBackend::default().is_available();
    if ffprobe {
        println!("[OK] ffprobe found (all media formats can be probed)");
    } else {
        println!("[WARN] ffprobe not found; only local .wav durations can be read");
    }

    let path = config_file_path();
    if path.exists() {
        println!("[OK] Config: {}", path.display());
    } else {
        println!("[INFO] No config at {}; using defaults", path.display());
    }
    println!("     Tolerance: {}s", config.timing.tolerance);
    println!("     Work dir:  {}", config.work_dir.display());
    println!(
        "     Output:    {}x{} @ {}fps ({})",
        config.output.width,
        config.output.height,
        config.output.fps,
        config.output.format.video_codec()
    );

    println!();
    if ffmpeg {
        println!("All required capabilities are available. Cadence is ready.");
    } else {
        println!("Some required capabilities are missing. Install ffmpeg to render output.");
    }

    Ok(())
}
