//! Media duration probing.
//!
//! A [`DurationSource`] tries an ordered list of [`DurationBackend`]s and
//! returns the first answer. When every backend fails, the combined error
//! names each backend and its failure.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::process::Command;

use cadence_common::error::{CadenceError, CadenceResult};

/// A single strategy for reading a media duration.
#[async_trait::async_trait]
pub trait DurationBackend: Send + Sync {
    /// Backend name used in logs and combined errors.
    fn name(&self) -> &str;

    /// Duration of `locator` in seconds.
    async fn probe(&self, locator: &str) -> CadenceResult<f64>;
}

/// Reads the duration of local WAV files from their header with `hound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavHeaderBackend;

#[async_trait::async_trait]
impl DurationBackend for WavHeaderBackend {
    fn name(&self) -> &str {
        "wav-header"
    }

    async fn probe(&self, locator: &str) -> CadenceResult<f64> {
        let path = Path::new(locator);
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if !is_wav || is_remote(locator) {
            return Err(CadenceError::unsupported(format!(
                "{locator} is not a local .wav file"
            )));
        }

        let path = path.to_path_buf();
        let read = tokio::task::spawn_blocking(move || {
            let reader = hound::WavReader::open(&path)?;
            Ok::<_, hound::Error>((reader.duration(), reader.spec().sample_rate))
        })
        .await
        .map_err(|e| CadenceError::media_read(locator, format!("WAV reader task failed: {e}")))?;

        let (frames, sample_rate) =
            read.map_err(|e| CadenceError::media_read(locator, format!("WAV read error: {e}")))?;
        frames_to_seconds(frames, sample_rate)
            .map_err(|message| CadenceError::media_read(locator, message))
    }
}

/// Duration of an in-memory WAV file.
pub fn wav_duration_from_bytes(bytes: &[u8]) -> CadenceResult<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| CadenceError::media_read("<memory>", format!("WAV read error: {e}")))?;
    frames_to_seconds(reader.duration(), reader.spec().sample_rate)
        .map_err(|message| CadenceError::media_read("<memory>", message))
}

fn frames_to_seconds(frames: u32, sample_rate: u32) -> Result<f64, String> {
    if sample_rate == 0 {
        return Err("sample rate is zero".to_string());
    }
    if frames == 0 {
        return Err("WAV file has no samples".to_string());
    }
    Ok(frames as f64 / sample_rate as f64)
}

/// Asks `ffprobe` for the container duration. Handles local paths and URLs.
#[derive(Debug, Clone)]
pub struct FfprobeBackend {
    binary: String,
}

impl Default for FfprobeBackend {
    fn default() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }
}

impl FfprobeBackend {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        crate::compositor::binary_on_path(&self.binary)
    }
}

#[async_trait::async_trait]
impl DurationBackend for FfprobeBackend {
    fn name(&self) -> &str {
        "ffprobe"
    }

    async fn probe(&self, locator: &str) -> CadenceResult<f64> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(locator)
            .output()
            .await
            .map_err(|e| {
                CadenceError::media_read(locator, format!("failed to run {}: {e}", self.binary))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CadenceError::media_read(
                locator,
                format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ffprobe_duration(&stdout).ok_or_else(|| {
            CadenceError::media_read(
                locator,
                format!("unexpected ffprobe output '{}'", stdout.trim()),
            )
        })
    }
}

fn parse_ffprobe_duration(stdout: &str) -> Option<f64> {
    let value = stdout.lines().next()?.trim().parse::<f64>().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

fn is_remote(locator: &str) -> bool {
    locator.contains("://")
}

static SPILL_COUNTER: AtomicU64 = AtomicU64::new(0);

fn spill_path(extension: &str) -> PathBuf {
    let n = SPILL_COUNTER.fetch_add(1, Ordering::Relaxed);
    let extension = extension.trim_start_matches('.');
    let extension = if extension.is_empty() { "bin" } else { extension };
    std::env::temp_dir().join(format!(
        "cadence-buffer-{}-{n}.{extension}",
        std::process::id()
    ))
}

/// Ordered chain of duration backends with an optional cache.
pub struct DurationSource {
    backends: Vec<Box<dyn DurationBackend>>,
    cache: Option<Mutex<HashMap<String, f64>>>,
}

impl DurationSource {
    pub fn new(backends: Vec<Box<dyn DurationBackend>>) -> Self {
        Self {
            backends,
            cache: None,
        }
    }

    /// WAV header fast path, then ffprobe.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(WavHeaderBackend),
            Box::new(FfprobeBackend::default()),
        ])
    }

    /// Remember results per locator.
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(Mutex::new(HashMap::new()));
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Duration of `locator` from the first backend that succeeds.
    pub async fn extract(&self, locator: &str) -> CadenceResult<f64> {
        if let Some(cached) = self.cached(locator) {
            tracing::debug!(locator, duration = cached, "Duration cache hit");
            return Ok(cached);
        }

        let duration = self.probe_chain(locator).await?;
        self.remember(locator, duration);
        Ok(duration)
    }

    /// Duration of media held in memory.
    ///
    /// WAV data is read in place. Anything else is spilled to a temporary
    /// file named with `extension` and run through the backend chain, then
    /// removed. Results are never cached.
    pub async fn extract_from_bytes(&self, bytes: &[u8], extension: &str) -> CadenceResult<f64> {
        if bytes.is_empty() {
            return Err(CadenceError::invalid_argument("media buffer is empty"));
        }
        if bytes.starts_with(b"RIFF") {
            match wav_duration_from_bytes(bytes) {
                Ok(duration) => return Ok(duration),
                Err(e) => tracing::debug!(error = %e, "In-memory WAV read failed, spilling to disk"),
            }
        }

        let path = spill_path(extension);
        tokio::fs::write(&path, bytes).await?;
        let locator = path.to_string_lossy().into_owned();
        let result = self.probe_chain(&locator).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove spilled media buffer");
        }
        result
    }

    async fn probe_chain(&self, locator: &str) -> CadenceResult<f64> {
        if self.backends.is_empty() {
            return Err(CadenceError::media_read(
                locator,
                "no duration backends configured",
            ));
        }

        let mut failures = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            match backend.probe(locator).await {
                Ok(duration) if duration.is_finite() && duration > 0.0 => {
                    tracing::debug!(
                        locator,
                        backend = backend.name(),
                        duration,
                        "Probed media duration"
                    );
                    return Ok(duration);
                }
                Ok(duration) => {
                    failures.push(format!("{}: invalid duration {duration}", backend.name()));
                }
                Err(e) => {
                    tracing::debug!(locator, backend = backend.name(), error = %e, "Duration backend failed");
                    failures.push(format!("{}: {e}", backend.name()));
                }
            }
        }

        Err(CadenceError::media_read(
            locator,
            format!("all duration backends failed ({})", failures.join("; ")),
        ))
    }

    /// Durations for several locators, in order. Stops at the first failure.
    pub async fn extract_many(&self, locators: &[String]) -> CadenceResult<Vec<f64>> {
        let mut durations = Vec::with_capacity(locators.len());
        for locator in locators {
            durations.push(self.extract(locator).await?);
        }
        Ok(durations)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.clear();
            }
        }
    }

    fn cached(&self, locator: &str) -> Option<f64> {
        let cache = self.cache.as_ref()?.lock().ok()?;
        cache.get(locator).copied()
    }

    fn remember(&self, locator: &str, duration: f64) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.insert(locator.to_string(), duration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedBackend {
        name: &'static str,
        result: Result<f64, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl DurationBackend for FixedBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn probe(&self, locator: &str) -> CadenceResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map_err(|msg| CadenceError::media_read(locator, msg))
        }
    }

    fn fixed(name: &'static str, result: Result<f64, &'static str>) -> (Box<dyn DurationBackend>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(FixedBackend {
                name,
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..frames * channels as u32 {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_wav_duration_from_bytes() {
        let duration = wav_duration_from_bytes(&wav_bytes(8000, 1, 12_000)).unwrap();
        assert!((duration - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_wav_duration_counts_frames_not_samples() {
        let duration = wav_duration_from_bytes(&wav_bytes(8000, 2, 4_000)).unwrap();
        assert!((duration - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_wav_duration_rejects_other_formats() {
        let err = wav_duration_from_bytes(b"ID3\x03\x00\x00\x00\x00\x00\x00\x00\x00").unwrap_err();
        assert!(matches!(err, CadenceError::MediaRead { .. }));
    }

    #[test]
    fn test_wav_duration_rejects_oversized_fmt_chunk() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&36u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            wav_duration_from_bytes(&bytes),
            Err(CadenceError::MediaRead { .. })
        ));
    }

    #[test]
    fn test_frames_to_seconds_guards() {
        assert!(frames_to_seconds(100, 0).is_err());
        assert!(frames_to_seconds(0, 44_100).is_err());
        assert_eq!(frames_to_seconds(22_050, 44_100), Ok(0.5));
    }

    #[tokio::test]
    async fn test_wav_backend_reads_file() {
        let path = std::env::temp_dir().join(format!("cadence-probe-{}.wav", std::process::id()));
        std::fs::write(&path, wav_bytes(16_000, 1, 32_000)).unwrap();
        let duration = WavHeaderBackend
            .probe(path.to_str().unwrap())
            .await
            .unwrap();
        assert!((duration - 2.0).abs() < 1e-12);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_wav_backend_reports_corrupt_file() {
        let path = std::env::temp_dir().join(format!("cadence-corrupt-{}.wav", std::process::id()));
        std::fs::write(&path, b"RIFF\x00\x00\x00\x00WAVE").unwrap();
        let err = WavHeaderBackend
            .probe(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::MediaRead { .. }));
        assert!(err.to_string().contains("WAV read error"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_wav_backend_declines_other_locators() {
        assert!(matches!(
            WavHeaderBackend.probe("narration.mp3").await,
            Err(CadenceError::Unsupported { .. })
        ));
        assert!(WavHeaderBackend
            .probe("https://cdn.example.com/a.wav")
            .await
            .is_err());
    }

    #[test]
    fn test_parse_ffprobe_duration() {
        assert_eq!(parse_ffprobe_duration("12.345000\n"), Some(12.345));
        assert_eq!(parse_ffprobe_duration("N/A\n"), None);
        assert_eq!(parse_ffprobe_duration("0.000000\n"), None);
        assert_eq!(parse_ffprobe_duration(""), None);
    }

    #[tokio::test]
    async fn test_chain_falls_back_in_order() {
        let (first, first_calls) = fixed("fast", Err("cannot decode"));
        let (second, second_calls) = fixed("slow", Ok(7.25));
        let source = DurationSource::new(vec![first, second]);

        assert_eq!(source.extract("a.mp3").await.unwrap(), 7.25);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.backend_names(), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn test_chain_reports_every_failure() {
        let (first, _) = fixed("fast", Err("bad header"));
        let (second, _) = fixed("slow", Err("decoder crashed"));
        let source = DurationSource::new(vec![first, second]);

        let err = source.extract("a.mp3").await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, CadenceError::MediaRead { .. }));
        assert!(message.contains("fast: "));
        assert!(message.contains("bad header"));
        assert!(message.contains("slow: "));
        assert!(message.contains("decoder crashed"));
    }

    #[tokio::test]
    async fn test_chain_rejects_non_positive_results() {
        let (zero, _) = fixed("zero", Ok(0.0));
        let source = DurationSource::new(vec![zero]);
        assert!(source.extract("a.mp3").await.is_err());
    }

    #[tokio::test]
    async fn test_cache_is_opt_in() {
        let (backend, calls) = fixed("fast", Ok(3.0));
        let uncached = DurationSource::new(vec![backend]);
        uncached.extract("a.wav").await.unwrap();
        uncached.extract("a.wav").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let (backend, calls) = fixed("fast", Ok(3.0));
        let cached = DurationSource::new(vec![backend]).with_cache();
        cached.extract("a.wav").await.unwrap();
        cached.extract("a.wav").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cached.clear_cache();
        cached.extract("a.wav").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_extract_many_preserves_order() {
        let (backend, _) = fixed("fast", Ok(2.0));
        let source = DurationSource::new(vec![backend]);
        let durations = source
            .extract_many(&["a.mp4".to_string(), "b.mp4".to_string()])
            .await
            .unwrap();
        assert_eq!(durations, vec![2.0, 2.0]);
    }

    #[tokio::test]
    async fn test_extract_from_bytes_reads_wav_in_place() {
        let (backend, calls) = fixed("never", Err("unused"));
        let source = DurationSource::new(vec![backend]);
        let duration = source
            .extract_from_bytes(&wav_bytes(8000, 1, 4_000), "wav")
            .await
            .unwrap();
        assert!((duration - 0.5).abs() < 1e-12);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extract_from_bytes_spills_other_media() {
        let (backend, calls) = fixed("fast", Ok(4.5));
        let source = DurationSource::new(vec![backend]).with_cache();
        let duration = source.extract_from_bytes(b"\xff\xfb\x90\x00", ".mp3").await.unwrap();
        assert_eq!(duration, 4.5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(source.cache.as_ref().unwrap().lock().unwrap().is_empty());

        assert!(matches!(
            source.extract_from_bytes(&[], "mp3").await,
            Err(CadenceError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_spill_paths_are_unique() {
        let a = spill_path("mp3");
        let b = spill_path(".mp3");
        assert_ne!(a, b);
        assert_eq!(a.extension().unwrap(), "mp3");
        assert_eq!(b.extension().unwrap(), "mp3");
        assert_eq!(spill_path("").extension().unwrap(), "bin");
    }

    #[tokio::test]
    async fn test_empty_chain_is_an_error() {
        let source = DurationSource::new(Vec::new());
        assert!(matches!(
            source.extract("a.mp3").await,
            Err(CadenceError::MediaRead { .. })
        ));
    }
}
