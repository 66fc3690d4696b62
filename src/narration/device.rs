//! Speech-output devices.

use std::{process::Stdio, time::Duration};

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::{process::Command, sync::Notify};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("speech command is empty")]
    NoCommand,

    #[error("could not run speech command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("speech command exited with {0}")]
    Failed(String),

    /// The utterance was cut short by [`SpeechDevice::stop`].
    #[error("speech interrupted")]
    Interrupted,
}

/// One shared output device. `speak` resolves once the utterance is over;
/// `stop` cuts off whatever is being spoken right now.
pub trait SpeechDevice: Send + Sync {
    fn speak<'a>(&'a self, text: &'a str, voice: &'a str) -> BoxFuture<'a, Result<(), SpeechError>>;
    fn stop(&self);
}

/// Logs each utterance and takes roughly as long as saying it would.
pub struct SilentDevice {
    per_word: Duration,
    stop: Notify,
}

impl SilentDevice {
    pub fn new(per_word: Duration) -> Self {
        Self { per_word, stop: Notify::new() }
    }
}

impl Default for SilentDevice {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}

impl SpeechDevice for SilentDevice {
    fn speak<'a>(&'a self, text: &'a str, voice: &'a str) -> BoxFuture<'a, Result<(), SpeechError>> {
        Box::pin(async move {
            let stopped = self.stop.notified();
            info!(voice, "speaking: {text}");
            let words = text.split_whitespace().count().max(1) as u32;
            tokio::select! {
                _ = tokio::time::sleep(self.per_word * words) => Ok(()),
                _ = stopped => Ok(()),
            }
        })
    }

    fn stop(&self) {
        self.stop.notify_waiters();
    }
}

/// Runs an external text-to-speech program per segment, e.g.
/// `espeak-ng -v {voice}`. The text is passed as the last argument.
pub struct CommandDevice {
    program: String,
    args: Vec<String>,
    stop: Notify,
}

impl CommandDevice {
    pub fn parse(template: &str) -> Result<Self, SpeechError> {
        let mut words = template.split_whitespace().map(str::to_owned);
        let program = words.next().ok_or(SpeechError::NoCommand)?;
        Ok(Self {
            program,
            args: words.collect(),
            stop: Notify::new(),
        })
    }
}

impl SpeechDevice for CommandDevice {
    fn speak<'a>(&'a self, text: &'a str, voice: &'a str) -> BoxFuture<'a, Result<(), SpeechError>> {
        Box::pin(async move {
            let stopped = self.stop.notified();
            tokio::pin!(stopped);
            stopped.as_mut().enable();

            let mut child = Command::new(&self.program)
                .args(self.args.iter().map(|arg| arg.replace("{voice}", voice)))
                .arg(text)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()?;

            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    if status.success() {
                        Ok(())
                    } else {
                        Err(SpeechError::Failed(status.to_string()))
                    }
                }
                _ = stopped => {
                    debug!("killing {}", self.program);
                    child.kill().await?;
                    Err(SpeechError::Interrupted)
                }
            }
        })
    }

    fn stop(&self) {
        self.stop.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_command_is_rejected() {
        assert!(matches!(CommandDevice::parse("  "), Err(SpeechError::NoCommand)));
        let device = CommandDevice::parse("espeak-ng -v {voice}").unwrap();
        assert_eq!(device.program, "espeak-ng");
        assert_eq!(device.args, ["-v", "{voice}"]);
    }

    #[tokio::test]
    async fn command_exit_status_is_the_result() {
        CommandDevice::parse("true").unwrap().speak("hola", "es").await.unwrap();
        let failed = CommandDevice::parse("false").unwrap().speak("hola", "es").await;
        assert!(matches!(failed, Err(SpeechError::Failed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_stops_early() {
        let device = std::sync::Arc::new(SilentDevice::new(Duration::from_secs(10)));
        let speaking = tokio::spawn({
            let device = device.clone();
            async move { device.speak("una frase larga", "es").await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        device.stop();

        let started = tokio::time::Instant::now();
        speaking.await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
