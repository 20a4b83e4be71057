use clap::Parser;

#[derive(Parser)]
#[command(name = "parlor", version, about = "Terminal client for a websocket chat server")]
pub(crate) struct Cli {
    /// Config file (default: ./parlor.toml, then ~/.config/parlor/parlor.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Chat server URL, overriding the config file.
    #[arg(short, long, env = "PARLOR_SERVER", value_name = "URL")]
    pub server: Option<String>,

    /// Nickname to announce. Prompted for when omitted.
    #[arg(short, long)]
    pub nick: Option<String>,

    /// Log connection activity to the console.
    #[arg(short, long)]
    pub verbose: bool,
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_needed() {
        let cli = Cli::try_parse_from(["parlor"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.nick.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_all_flags() {
        let cli = Cli::try_parse_from([
            "parlor",
            "--config",
            "/tmp/parlor.toml",
            "--server",
            "ws://chat.example:9000/ws",
            "-n",
            "alice",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/parlor.toml"));
        assert_eq!(cli.server.as_deref(), Some("ws://chat.example:9000/ws"));
        assert_eq!(cli.nick.as_deref(), Some("alice"));
        assert!(cli.verbose);
    }
}
