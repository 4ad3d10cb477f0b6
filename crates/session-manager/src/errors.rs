use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("anonymous callers cannot hold a session")]
    AnonymousCaller,
    #[error("no session for {0}")]
    NoSession(String),
    #[error("auth provider failure: {0}")]
    Provider(String),
}
