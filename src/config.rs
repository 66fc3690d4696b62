use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Args;

/// Server settings. Every flag falls back to an environment variable, and
/// `.env` is loaded before parsing.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://culinarea.db?mode=rwc")]
    pub database_url: String,

    /// Address to listen on
    #[arg(long, env = "CULINAREA_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,

    /// Base URL the site is reachable at, used for OAuth redirects
    #[arg(long, env = "CULINAREA_PUBLIC_URL", default_value = "http://localhost:8080")]
    pub public_url: String,

    /// Directory holding uploaded images
    #[arg(long, env = "CULINAREA_STORAGE_DIR", default_value = "storage")]
    pub storage_dir: PathBuf,

    /// JSON file with `google` / `github` OAuth client credentials
    #[arg(long, env = "CULINAREA_OAUTH_SECRETS")]
    pub oauth_secrets: Option<PathBuf>,

    /// Text-to-speech command, e.g. `espeak-ng -v {voice}`; the text is appended.
    /// Without it narration only logs.
    #[arg(long, env = "CULINAREA_SPEECH_COMMAND")]
    pub speech_command: Option<String>,

    /// Initial narration voice
    #[arg(long, env = "CULINAREA_VOICE", default_value = "es")]
    pub voice: String,

    /// Pause between narration segments
    #[arg(long, env = "CULINAREA_NARRATION_DELAY_MS", default_value_t = 1500)]
    pub narration_delay_ms: u64,

    /// Sessions expire after this much inactivity
    #[arg(long, env = "CULINAREA_SESSION_MINUTES", default_value_t = 60)]
    pub session_minutes: i64,
}

impl Config {
    pub fn narration_delay(&self) -> Duration {
        Duration::from_millis(self.narration_delay_ms)
    }

    pub fn session_ttl(&self) -> time::Duration {
        time::Duration::minutes(self.session_minutes)
    }

    /// Where stored objects are served from.
    pub fn files_url(&self) -> String {
        format!("{}/files", self.public_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: Config,
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "culinarea",
            "--addr", "127.0.0.1:9000",
            "--public-url", "https://culinarea.example/",
            "--narration-delay-ms", "250",
        ]);

        assert_eq!(cli.config.addr.port(), 9000);
        assert_eq!(cli.config.files_url(), "https://culinarea.example/files");
        assert_eq!(cli.config.narration_delay(), Duration::from_millis(250));
        assert_eq!(cli.config.voice, "es");
    }
}
