//! Supervised application selection

use clap::ValueEnum;
use std::path::Path;

/// Application the entrypoint launches
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum App {
    /// Game server (`./Server` in `/gameserver`)
    #[value(name = "gameserver")]
    GameServer,
    /// Load-test bot client (`./BotClient` in `/botclient`)
    #[value(name = "botclient")]
    BotClient,
    /// Arbitrary .NET program (`dotnet` from PATH in the current directory)
    #[value(name = "dotnet")]
    Dotnet,
}

impl App {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameServer => "gameserver",
            Self::BotClient => "botclient",
            Self::Dotnet => "dotnet",
        }
    }

    /// Working directory used unless `--working-dir` is given
    pub fn default_working_dir(&self) -> &'static Path {
        match self {
            Self::GameServer => Path::new("/gameserver"),
            Self::BotClient => Path::new("/botclient"),
            Self::Dotnet => Path::new("."),
        }
    }

    /// Program to execute
    ///
    /// Paths containing `/` resolve against the working directory, bare names
    /// are looked up in `PATH`.
    pub fn binary(&self) -> &'static str {
        match self {
            Self::GameServer => "./Server",
            Self::BotClient => "./BotClient",
            Self::Dotnet => "dotnet",
        }
    }
}

impl std::fmt::Display for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_defaults() {
        assert_eq!(App::GameServer.default_working_dir(), Path::new("/gameserver"));
        assert_eq!(App::GameServer.binary(), "./Server");
        assert_eq!(App::BotClient.default_working_dir(), Path::new("/botclient"));
        assert_eq!(App::BotClient.binary(), "./BotClient");
        assert_eq!(App::Dotnet.default_working_dir(), Path::new("."));
        assert_eq!(App::Dotnet.binary(), "dotnet");
    }

    #[test]
    fn test_app_parse() {
        assert_eq!(App::from_str("gameserver", false).unwrap(), App::GameServer);
        assert_eq!(App::from_str("botclient", false).unwrap(), App::BotClient);
        assert_eq!(App::from_str("dotnet", false).unwrap(), App::Dotnet);
        assert!(App::from_str("Server", false).is_err());
    }
}
