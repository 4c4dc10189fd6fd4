use snafu::Snafu;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub(crate) enum Error {
    #[snafu(display("Error reading Deploy.toml: {}", source))]
    Config { source: deploysys_config::Error },

    #[snafu(display("Failed to authenticate: {}", source))]
    Auth { source: crate::auth::Error },

    #[snafu(display("Failed to {} '{}': {}", op, target, source))]
    Cloud {
        op: String,
        target: String,
        source: crate::azure::Error,
    },

    #[snafu(display("Failed to build the search index: {}", source))]
    Search { source: crate::search::Error },

    #[snafu(display("Subscription '{}' is in state '{}', expected 'Enabled'", subscription, state))]
    SubscriptionDisabled { subscription: String, state: String },

    #[snafu(display("Sample documents directory '{}' does not exist", path.display()))]
    MissingSampleDir { path: PathBuf },

    #[snafu(display("Failed to walk '{}': {}", path.display(), source))]
    WalkDir {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[snafu(display("Failed to read '{}': {}", path.display(), source))]
    FileRead { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to write '{}': {}", path.display(), source))]
    FileWrite { path: PathBuf, source: io::Error },

    #[snafu(display("Path '{}' is not valid UTF-8", path.display()))]
    NonUtf8Path { path: PathBuf },

    #[snafu(display("Failed to strip prefix '{}' from '{}': {}", prefix.display(), path.display(), source))]
    StripPrefix {
        path: PathBuf,
        prefix: PathBuf,
        source: std::path::StripPrefixError,
    },

    #[snafu(display("Error splitting shell command '{}': {}", command, source))]
    CommandSplit {
        command: String,
        source: shell_words::ParseError,
    },

    #[snafu(display("Build command is empty"))]
    EmptyCommand,

    #[snafu(display("Failed to start '{}': {}", command, source))]
    BuildSpawn { command: String, source: io::Error },

    #[snafu(display("'{}' returned {}:\n{}", command, code, output))]
    BuildResult {
        command: String,
        code: String,
        output: String,
    },

    #[snafu(display("Invalid JSON in '{}': {}", path.display(), source))]
    SettingsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Expected a JSON object at the top of '{}'", path.display()))]
    SettingsNotObject { path: PathBuf },

    #[snafu(display("Failed to serialize '{}': {}", path.display(), source))]
    SettingsSerialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to add '{}' to archive: {}", path.display(), source))]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[snafu(display("Build output '{}' is not a directory", path.display()))]
    MissingBuildOutput { path: PathBuf },

    #[snafu(display("Logger setup error: {}", source))]
    Logger { source: log::SetLoggerError },

    #[snafu(display("Failed to create async runtime: {}", source))]
    Runtime { source: io::Error },
}

pub(crate) type Result<T> = std::result::Result<T, Error>;
