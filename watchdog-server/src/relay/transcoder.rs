//! External transcoder process
//!
//! The relay never decodes media itself. A [`Transcoder`] turns an upstream
//! URL into a byte stream; the production implementation runs ffmpeg and
//! reads fragmented MP4 from its stdout.

use super::RelayError;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Running transcoder output
///
/// Dropping this value kills the child process (`kill_on_drop`).
pub struct TranscodeOutput {
    /// Encoded media bytes
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// The process producing `reader`, when there is one
    pub child: Option<Child>,
}

impl TranscodeOutput {
    /// Output with no backing process (used by in-process sources)
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            child: None,
        }
    }
}

/// Starts one transcoding pipeline per relay
pub trait Transcoder: Send + Sync + 'static {
    fn spawn(&self, url: &str) -> Result<TranscodeOutput, RelayError>;
}

/// ffmpeg-backed transcoder
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// ffmpeg arguments for relaying `url` as browser-playable fragmented MP4
///
/// RTSP inputs are forced onto TCP interleaving so the relay survives NAT
/// and lossy links without smeared frames.
pub fn ffmpeg_args(url: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    if url.to_ascii_lowercase().starts_with("rtsp://") {
        args.extend(["-rtsp_transport".into(), "tcp".into()]);
    }

    args.extend(
        [
            "-i",
            url,
            "-an",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-tune",
            "zerolatency",
            "-f",
            "mp4",
            "-movflags",
            "frag_keyframe+empty_moov+default_base_moof",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    args
}

impl Transcoder for FfmpegTranscoder {
    fn spawn(&self, url: &str) -> Result<TranscodeOutput, RelayError> {
        let mut child = Command::new(&self.program)
            .args(ffmpeg_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::Spawn {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or(RelayError::NoOutput)?;

        if let Some(stderr) = child.stderr.take() {
            let url = url.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("ffmpeg [{}]: {}", url, line);
                }
                debug!("ffmpeg [{}]: stderr closed", url);
            });
        }

        info!("Started {} (pid {:?}) for {}", self.program, child.id(), url);

        Ok(TranscodeOutput {
            reader: Box::new(stdout),
            child: Some(child),
        })
    }
}
