// src/probe/ffprobe.rs
//! FFmpeg-based probers. The primary prober asks ffprobe to enumerate
//! stream codecs; the fallback actually decodes a few seconds with ffmpeg,
//! which catches servers that answer metadata requests for dead streams.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ProbeResult, StreamProber};

/// Grace added on top of ffprobe's own read/write timeout before the
/// process is killed outright.
const PROBE_KILL_GRACE: Duration = Duration::from_secs(2);
const DECODE_KILL_GRACE: Duration = Duration::from_secs(4);
/// Seconds of media the fallback decodes before declaring the stream live.
const DECODE_SECONDS: &str = "6";

fn stderr_snippet(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let line = text.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        "exit failure".to_string()
    } else {
        line.chars().take(120).collect()
    }
}

#[derive(Debug, Clone)]
pub struct FfprobeProber {
    bin: String,
    timeout: Duration,
    user_agent: String,
}

impl FfprobeProber {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            bin: "ffprobe".to_string(),
            timeout,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl StreamProber for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, url: &str) -> ProbeResult {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-v")
            .arg("error")
            .arg("-rw_timeout")
            .arg((self.timeout.as_micros()).to_string())
            .arg("-analyzeduration")
            .arg("1000000")
            .arg("-probesize")
            .arg("65536")
            .arg("-user_agent")
            .arg(&self.user_agent)
            .arg("-show_entries")
            .arg("stream=codec_type")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout + PROBE_KILL_GRACE, cmd.output()).await
        {
            Ok(Ok(output)) => output,
            // Could not run or had to kill it: says nothing about the stream.
            Ok(Err(err)) => return ProbeResult::Transient(format!("spawn failed: {err}")),
            Err(_) => return ProbeResult::Transient("probe timed out".to_string()),
        };

        if !output.status.success() {
            return ProbeResult::Unplayable(stderr_snippet(&output.stderr));
        }
        if String::from_utf8_lossy(&output.stdout).trim().is_empty() {
            return ProbeResult::Unplayable("no media streams reported".to_string());
        }
        ProbeResult::Playable
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegProber {
    bin: String,
    timeout: Duration,
    user_agent: String,
}

impl FfmpegProber {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            bin: "ffmpeg".to_string(),
            timeout,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl StreamProber for FfmpegProber {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn probe(&self, url: &str) -> ProbeResult {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-v")
            .arg("error")
            .arg("-rw_timeout")
            .arg((self.timeout.as_micros()).to_string())
            .arg("-user_agent")
            .arg(&self.user_agent)
            .arg("-t")
            .arg(DECODE_SECONDS)
            .arg("-i")
            .arg(url)
            .arg("-f")
            .arg("null")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output =
            match tokio::time::timeout(self.timeout + DECODE_KILL_GRACE, cmd.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(err)) => return ProbeResult::Transient(format!("spawn failed: {err}")),
                Err(_) => return ProbeResult::Transient("decode timed out".to_string()),
            };

        if output.status.success() {
            ProbeResult::Playable
        } else {
            ProbeResult::Unplayable(stderr_snippet(&output.stderr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_snippet_takes_first_line() {
        assert_eq!(
            stderr_snippet(b"Connection refused\nmore context\n"),
            "Connection refused"
        );
        assert_eq!(stderr_snippet(b""), "exit failure");
    }
}
