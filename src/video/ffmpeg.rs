//! FFmpeg subprocess plumbing for raw RGB frame pipes.

use std::ffi::OsString;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use serde::Deserialize;

use super::VideoConfig;
use crate::error::{DefisheyeError, Result};

/// Video stream metadata reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub duration_seconds: Option<f64>,
    pub codec: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Locates the ffmpeg and ffprobe executables and spawns them.
#[derive(Debug, Clone)]
pub struct FfmpegWrapper {
    ffmpeg_path: PathBuf,
    ffprobe_path: Option<PathBuf>,
}

impl FfmpegWrapper {
    pub fn new() -> Result<Self> {
        let ffmpeg_path = find_tool("ffmpeg").ok_or(DefisheyeError::FfmpegNotFound)?;
        let ffprobe_path = find_tool("ffprobe");
        log::debug!("Using ffmpeg at {}", ffmpeg_path.display());

        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Probe the first video stream of `input`.
    pub fn get_video_info(&self, input: &Path) -> Result<VideoInfo> {
        let ffprobe = self
            .ffprobe_path
            .as_ref()
            .ok_or_else(|| DefisheyeError::Ffmpeg("ffprobe not found".to_string()))?;

        let output = Command::new(ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(input)
            .output()?;

        if !output.status.success() {
            return Err(DefisheyeError::Ffmpeg(format!(
                "ffprobe failed on {}: {}",
                input.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_video_info(&String::from_utf8_lossy(&output.stdout))
    }

    /// Start decoding `input` into raw RGB24 frames.
    pub fn open_reader(&self, input: &Path, info: &VideoInfo) -> Result<FrameReader> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(reader_args(input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DefisheyeError::Ffmpeg("decoder stdout unavailable".to_string()))?;
        let stderr = drain_stderr(&mut child);

        Ok(FrameReader {
            child: Some(child),
            stdout,
            stderr,
            width: info.width,
            height: info.height,
        })
    }

    /// Start encoding raw RGB24 frames of `info`'s size into `output`.
    pub fn open_writer(&self, output: &Path, info: &VideoInfo, config: &VideoConfig) -> Result<FrameWriter> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(writer_args(output, info, config))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DefisheyeError::Ffmpeg("encoder stdin unavailable".to_string()))?;
        let stderr = drain_stderr(&mut child);

        Ok(FrameWriter {
            child: Some(child),
            stdin: Some(stdin),
            stderr,
            width: info.width,
            height: info.height,
        })
    }
}

/// Bundled assets first, then `PATH`, then common install locations.
fn find_tool(name: &str) -> Option<PathBuf> {
    let executable = if cfg!(target_os = "windows") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };

    let bundled = PathBuf::from("assets/ffmpeg").join(&executable);
    if bundled.exists() {
        return Some(bundled);
    }

    if let Ok(path) = which::which(name) {
        return Some(path);
    }

    let common_dirs: &[&str] = if cfg!(target_os = "macos") {
        &["/usr/local/bin", "/opt/homebrew/bin", "/opt/local/bin"]
    } else if cfg!(target_os = "windows") {
        &["C:\\ffmpeg\\bin", "C:\\Program Files\\ffmpeg\\bin"]
    } else {
        &["/usr/bin", "/usr/local/bin"]
    };

    common_dirs
        .iter()
        .map(|dir| Path::new(dir).join(&executable))
        .find(|path| path.exists())
}

fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

pub(crate) fn parse_video_info(json: &str) -> Result<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or_else(|| DefisheyeError::Ffmpeg("no video stream found".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(DefisheyeError::Ffmpeg(
                "video stream has no frame size".to_string(),
            ))
        }
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        duration_seconds: stream.duration.as_deref().and_then(|d| d.parse().ok()),
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
    })
}

pub(crate) fn reader_args(input: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"].iter().map(OsString::from).collect();
    args.push(input.as_os_str().to_owned());
    args.extend(
        ["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
            .iter()
            .map(OsString::from),
    );
    args
}

/// Filter graph applied before encoding. Selected frames are retimed to the
/// output rate so they play back one after another.
pub(crate) fn filter_chain(config: &VideoConfig) -> String {
    let retime = format!("setpts=N/({}*TB)", config.frame_rate);
    if config.filter.trim().is_empty() {
        retime
    } else {
        format!("{},{}", config.filter.trim(), retime)
    }
}

pub(crate) fn writer_args(output: &Path, info: &VideoInfo, config: &VideoConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        format!("{}x{}", info.width, info.height).into(),
        "-r".into(),
        info.frame_rate.to_string().into(),
        "-i".into(),
        "-".into(),
        "-vf".into(),
        filter_chain(config).into(),
        "-r".into(),
        config.frame_rate.to_string().into(),
        "-q:v".into(),
        config.quality.to_string().into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ];
    args.push(output.as_os_str().to_owned());
    args
}

/// Collect a child's stderr on a helper thread so the pipe never fills.
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut text = String::new();
        if let Err(e) = stderr.read_to_string(&mut text) {
            log::debug!("Failed to read ffmpeg stderr: {}", e);
        }
        text
    }))
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Kill a child that was not finished normally and reap it.
fn abort(mut child: Child, stderr: Option<JoinHandle<String>>, role: &str) {
    if let Err(e) = child.kill() {
        log::debug!("Failed to kill ffmpeg {}: {}", role, e);
    }
    match child.wait() {
        Ok(status) => log::debug!("Stopped ffmpeg {} ({})", role, status),
        Err(e) => log::warn!("Failed to reap ffmpeg {}: {}", role, e),
    }
    join_stderr(stderr);
}

fn wait_for(mut child: Child, stderr: Option<JoinHandle<String>>, role: &str) -> Result<()> {
    let status = child.wait()?;
    let messages = join_stderr(stderr);
    if status.success() {
        if !messages.is_empty() {
            log::debug!("ffmpeg {}: {}", role, messages);
        }
        Ok(())
    } else {
        Err(DefisheyeError::Ffmpeg(format!(
            "{} exited with code {:?}: {}",
            role,
            status.code(),
            messages
        )))
    }
}

/// Decoder process producing raw RGB24 frames.
pub struct FrameReader {
    child: Option<Child>,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
}

impl FrameReader {
    /// Next frame, or `None` at end of stream.
    pub fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut buffer = vec![0u8; self.width as usize * self.height as usize * 3];
        let mut filled = 0;
        while filled < buffer.len() {
            match self.stdout.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < buffer.len() {
            log::warn!(
                "Dropping truncated frame ({} of {} bytes)",
                filled,
                buffer.len()
            );
            return Ok(None);
        }

        Ok(RgbImage::from_raw(self.width, self.height, buffer))
    }

    /// Wait for the decoder to exit.
    pub fn finish(mut self) -> Result<()> {
        let child = self
            .child
            .take()
            .ok_or_else(|| DefisheyeError::Ffmpeg("decoder already finished".to_string()))?;
        // Unread output would keep the decoder blocked on a full pipe.
        std::io::copy(&mut self.stdout, &mut std::io::sink())?;
        wait_for(child, self.stderr.take(), "decoder")
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            abort(child, self.stderr.take(), "decoder");
        }
    }
}

/// Encoder process consuming raw RGB24 frames.
pub struct FrameWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
}

impl FrameWriter {
    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(DefisheyeError::SizeMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DefisheyeError::Ffmpeg("encoder input already closed".to_string()))?;
        stdin.write_all(frame.as_raw())?;
        Ok(())
    }

    /// Close the input pipe and wait for the encoder to flush.
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| DefisheyeError::Ffmpeg("encoder already finished".to_string()))?;
        wait_for(child, self.stderr.take(), "encoder")
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(child) = self.child.take() {
            abort(child, self.stderr.take(), "encoder");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "duration": "12.5"
            }
        ]
    }"#;

    fn info() -> VideoInfo {
        VideoInfo {
            width: 640,
            height: 480,
            frame_rate: 25.0,
            duration_seconds: None,
            codec: "h264".to_string(),
        }
    }

    #[test]
    fn test_parse_video_info() {
        let info = parse_video_info(PROBE_JSON).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.frame_rate - 29.97).abs() < 0.01);
        assert_eq!(info.duration_seconds, Some(12.5));
        assert_eq!(info.codec, "h264");
    }

    #[test]
    fn test_parse_video_info_without_stream_fails() {
        assert!(parse_video_info(r#"{"streams": []}"#).is_err());
        assert!(parse_video_info(r#"{"streams": [{"codec_type": "video"}]}"#).is_err());
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_filter_chain() {
        let config = VideoConfig::default();
        assert_eq!(
            filter_chain(&config),
            "tmix=frames=3,framestep=step=6,setpts=N/(5*TB)"
        );

        let bare = VideoConfig {
            filter: String::new(),
            ..VideoConfig::default()
        };
        assert_eq!(filter_chain(&bare), "setpts=N/(5*TB)");
    }

    #[test]
    fn test_writer_args() {
        let args = writer_args(Path::new("/out/undistorted.mp4"), &info(), &VideoConfig::default());
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        let size = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[size + 1], "640x480");
        let quality = args.iter().position(|a| a == "-q:v").unwrap();
        assert_eq!(args[quality + 1], "0");
        let pix_fmt = args.iter().rposition(|a| a == "-pix_fmt").unwrap();
        assert_eq!(args[pix_fmt + 1], "yuv420p");
        assert!(pix_fmt > args.iter().position(|a| a == "-i").unwrap());
        assert_eq!(args.last().unwrap(), "/out/undistorted.mp4");
        assert!(args.contains(&"5".to_string()));
    }

    #[test]
    fn test_reader_args() {
        let args = reader_args(Path::new("clip.mov"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "clip.mov");
        let autorotate = args.iter().position(|a| a == "-noautorotate").unwrap();
        assert!(autorotate < input);
        assert_eq!(args.last().unwrap(), "-");
        assert!(args.contains(&"rgb24".to_string()));
    }

    #[cfg(target_os = "linux")]
    fn spawn_sleeper(stdin: Stdio, stdout: Stdio) -> Child {
        Command::new("sleep")
            .arg("30")
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dropped_reader_reaps_decoder() {
        let mut child = spawn_sleeper(Stdio::null(), Stdio::piped());
        let pid = child.id();
        let stdout = child.stdout.take().unwrap();
        let stderr = drain_stderr(&mut child);
        let reader = FrameReader {
            child: Some(child),
            stdout,
            stderr,
            width: 2,
            height: 2,
        };

        drop(reader);
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dropped_writer_reaps_encoder() {
        let mut child = spawn_sleeper(Stdio::piped(), Stdio::null());
        let pid = child.id();
        let stdin = child.stdin.take();
        let stderr = drain_stderr(&mut child);
        let mut writer = FrameWriter {
            child: Some(child),
            stdin,
            stderr,
            width: 2,
            height: 2,
        };

        let wrong_size = RgbImage::new(3, 2);
        assert!(writer.write_frame(&wrong_size).is_err());
        drop(writer);
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }
}
