//! ffmpeg media pipe sink
//!
//! Spawns one ffmpeg process per track that pulls the stream URL and writes
//! raw PCM (48 kHz, stereo, s16le) to stdout. A pump task copies that PCM
//! into the guild's output pipe, where the gateway binding's voice sender
//! reads it. Muting writes silence while keeping the stream flowing.

use super::{AudioSink, SinkFactory};
use crate::controller::FinishSignal;
use crate::error::{Error, Result};
use crate::voice::{ChannelId, GuildId};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Reconnect on dropped HTTP streams instead of ending the track early
const BEFORE_INPUT_ARGS: &[&str] = &[
    "-reconnect",
    "1",
    "-reconnect_streamed",
    "1",
    "-reconnect_at_eof",
    "0",
    "-reconnect_delay_max",
    "2",
];

const OUTPUT_ARGS: &[&str] = &[
    "-vn", "-f", "s16le", "-ar", "48000", "-ac", "2", "-loglevel", "error", "pipe:1",
];

/// 20 ms of 48 kHz stereo s16le
const CHUNK_BYTES: usize = 3840;

/// Channel id 0 never names a real channel
const NOT_CONNECTED: u64 = 0;

pub struct FfmpegSink {
    guild: GuildId,
    ffmpeg: PathBuf,
    output: PathBuf,
    channel: AtomicU64,
    muted: Arc<AtomicBool>,
    /// Kill switch for the running pipe
    active: Mutex<Option<oneshot::Sender<()>>>,
}

impl FfmpegSink {
    pub fn new(guild: GuildId, ffmpeg: PathBuf, output: PathBuf) -> Self {
        Self {
            guild,
            ffmpeg,
            output,
            channel: AtomicU64::new(NOT_CONNECTED),
            muted: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

#[async_trait]
impl AudioSink for FfmpegSink {
    fn is_connected(&self) -> bool {
        self.channel.load(Ordering::Acquire) != NOT_CONNECTED
    }

    fn channel(&self) -> Option<ChannelId> {
        match self.channel.load(Ordering::Acquire) {
            NOT_CONNECTED => None,
            id => Some(ChannelId(id)),
        }
    }

    async fn connect(&self, channel: ChannelId) -> Result<()> {
        if channel.0 == NOT_CONNECTED {
            return Err(Error::BadRequest("Invalid voice channel".to_string()));
        }
        if let Some(parent) = self.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let previous = self.channel.swap(channel.0, Ordering::AcqRel);
        if previous != channel.0 {
            info!(guild = %self.guild, channel = %channel, "Sink connected");
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.stop().await;
        self.muted.store(false, Ordering::Release);
        self.channel.store(NOT_CONNECTED, Ordering::Release);
        info!(guild = %self.guild, "Sink disconnected");
    }

    async fn play(&self, stream_url: &str, on_finish: FinishSignal) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::SessionLost);
        }

        // Replace whatever is playing; its finish signal fires on kill
        self.stop().await;
        self.muted.store(false, Ordering::Release);

        let mut child = Command::new(&self.ffmpeg)
            .args(BEFORE_INPUT_ARGS)
            .arg("-i")
            .arg(stream_url)
            .args(OUTPUT_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Sink(format!("Failed to spawn {}: {}", self.ffmpeg.display(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Sink("ffmpeg stdout not captured".to_string()))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.active.lock().await = Some(kill_tx);

        let output = self.output.clone();
        let muted = Arc::clone(&self.muted);
        let guild = self.guild;
        tokio::spawn(async move {
            let error = pump(child, stdout, &output, muted, kill_rx).await;
            match &error {
                Some(e) => warn!(guild = %guild, error = %e, "Media pipe ended with error"),
                None => debug!(guild = %guild, "Media pipe ended"),
            }
            on_finish.finish(error);
        });

        info!(guild = %self.guild, "Media pipe started");
        Ok(())
    }

    async fn stop(&self) {
        if let Some(kill) = self.active.lock().await.take() {
            let _ = kill.send(());
        }
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::SessionLost);
        }
        self.muted.store(muted, Ordering::Release);
        Ok(())
    }
}

/// Copy PCM from ffmpeg to the output until EOF, error, or kill
///
/// Returns the error text when the source ended abnormally. A kill is a
/// normal end.
async fn pump(
    mut child: Child,
    mut stdout: ChildStdout,
    output: &Path,
    muted: Arc<AtomicBool>,
    mut kill_rx: oneshot::Receiver<()>,
) -> Option<String> {
    // Opening a FIFO blocks until the reader attaches, so keep it killable
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    let open = options.open(output);
    let mut out = tokio::select! {
        _ = &mut kill_rx => {
            let _ = child.kill().await;
            return None;
        }
        opened = open => match opened {
            Ok(file) => file,
            Err(e) => {
                let _ = child.kill().await;
                return Some(format!("Failed to open sink output {}: {}", output.display(), e));
            }
        }
    };

    let mut buf = vec![0u8; CHUNK_BYTES];
    loop {
        tokio::select! {
            _ = &mut kill_rx => {
                let _ = child.kill().await;
                return None;
            }
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if muted.load(Ordering::Acquire) {
                        buf[..n].fill(0);
                    }
                    if let Err(e) = out.write_all(&buf[..n]).await {
                        let _ = child.kill().await;
                        return Some(format!("Sink output write failed: {}", e));
                    }
                }
                Err(e) => {
                    let _ = child.kill().await;
                    return Some(format!("ffmpeg read failed: {}", e));
                }
            }
        }
    }

    match child.wait().await {
        Ok(status) if status.success() => None,
        Ok(status) => Some(format!("ffmpeg exited with {}", status)),
        Err(e) => Some(format!("ffmpeg wait failed: {}", e)),
    }
}

/// One ffmpeg sink per guild, each writing `<output_dir>/<guild>.pcm`
pub struct FfmpegSinkFactory {
    ffmpeg: PathBuf,
    output_dir: PathBuf,
}

impl FfmpegSinkFactory {
    pub fn new(ffmpeg: PathBuf, output_dir: PathBuf) -> Self {
        Self { ffmpeg, output_dir }
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn create(&self, guild: GuildId) -> Arc<dyn AudioSink> {
        Arc::new(FfmpegSink::new(
            guild,
            self.ffmpeg.clone(),
            self.output_dir.join(format!("{}.pcm", guild)),
        ))
    }
}
