use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("cannot resolve current executable: {0}")]
    CurrentExe(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(e: serde_json::Error) -> Self {
        ExecError::Protocol(e.to_string())
    }
}
