use std::io;

// ── Error taxonomy ─────────────────────────────────────────────────
//
//  Error
//  ├── Config           malformed connection URI / service list
//  ├── Discovery        no sentinel reachable, or no known primary
//  ├── CrossSlot        transaction or script keys span several slots
//  ├── Command          the store rejected a command (kind classified)
//  └── ConnectionLost   transport failure, caller decides to reconnect

/// Structured server error kinds for programmatic matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// Generic ERR
    Err,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// MOVED slot host:port  (cluster)
    Moved,
    /// ASK slot host:port  (cluster)
    Ask,
    /// CLUSTERDOWN
    ClusterDown,
    /// CROSSSLOT Keys in request don't hash to the same slot
    CrossSlot,
    /// LOADING Redis is loading the dataset in memory
    Loading,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// NOSCRIPT No matching script
    NoScript,
    /// BUSY Redis is busy running a script
    Busy,
    /// TRYAGAIN
    TryAgain,
    /// EXECABORT Transaction discarded because of previous errors
    ExecAbort,
    /// Any other error prefix
    Other(String),
}

impl CommandErrorKind {
    /// Classify a server error code (the first word of the error line).
    pub fn from_code(code: &str) -> Self {
        match code {
            "ERR" => Self::Err,
            "WRONGTYPE" => Self::WrongType,
            "MOVED" => Self::Moved,
            "ASK" => Self::Ask,
            "CLUSTERDOWN" => Self::ClusterDown,
            "CROSSSLOT" => Self::CrossSlot,
            "LOADING" => Self::Loading,
            "READONLY" => Self::ReadOnly,
            "NOSCRIPT" => Self::NoScript,
            "BUSY" => Self::Busy,
            "TRYAGAIN" => Self::TryAgain,
            "EXECABORT" => Self::ExecAbort,
            other => Self::Other(other.to_string()),
        }
    }

    /// Classify a full error line such as `"WRONGTYPE Operation against…"`.
    pub fn from_message(msg: &str) -> Self {
        Self::from_code(msg.split_whitespace().next().unwrap_or("UNKNOWN"))
    }
}

/// All error variants for rsedis.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed connection URI or empty service list.
    #[error("config error: {0}")]
    Config(String),
    /// Sentinels unreachable or primary unknown.
    #[error("discovery error: {0}")]
    Discovery(String),
    /// Keys of one atomic operation hash to different cluster slots.
    #[error("cross-slot error: {command} touches slots {first} and {second}")]
    CrossSlot {
        command: String,
        first: u16,
        second: u16,
    },
    /// The store rejected or failed a command.
    #[error("command error: {message}")]
    Command {
        kind: CommandErrorKind,
        message: String,
    },
    /// Underlying transport failure.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

impl Error {
    /// Create a command error from a raw error line, auto-classifying the kind.
    pub fn command(msg: impl Into<String>) -> Self {
        let message = msg.into();
        Self::Command {
            kind: CommandErrorKind::from_message(&message),
            message,
        }
    }

    /// Whether the connection that produced this error should be discarded.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    /// The classified server error kind, if this is a command error.
    pub fn command_kind(&self) -> Option<&CommandErrorKind> {
        match self {
            Self::Command { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
        {
            return Self::ConnectionLost(e.to_string());
        }
        match e.kind() {
            redis::ErrorKind::MasterNameNotFoundBySentinel
            | redis::ErrorKind::NoValidReplicasFoundBySentinel => Self::Discovery(e.to_string()),
            _ => Self::Command {
                kind: e
                    .code()
                    .map(CommandErrorKind::from_code)
                    .unwrap_or(CommandErrorKind::Err),
                message: e.to_string(),
            },
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::ConnectionLost(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Tests ──────────────────────────────────────────────────────────
