//! Binary Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// What stopped the process from starting or finishing a command.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not install the tracing subscriber")]
    Tracing,
    /// The secrets document is missing, unreadable or malformed.
    #[display("could not read secrets")]
    Secrets,
    #[display("could not open the database")]
    Database,
    #[display("could not open the photography directory")]
    Storage,
    #[display("HTTP server failure")]
    Server,
    #[display("reload failed")]
    Reload,
}
