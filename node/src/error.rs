use std::{error::Error, fmt, io};

/// The node module's result type.
pub type Result<T> = std::result::Result<T, NodeErr>;

/// Stage coordinator runtime failures.
#[derive(Debug)]
pub enum NodeErr {
    Io(io::Error),
    InvalidConfig(String),
    NoReplicas {
        role: String,
    },
    PayloadSize {
        role: String,
        got: usize,
        expected: usize,
    },
    AcquireTimeout {
        role: String,
    },
}

impl fmt::Display for NodeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeErr::Io(e) => write!(f, "io error: {e}"),
            NodeErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            NodeErr::NoReplicas { role } => {
                write!(f, "no replica addresses configured for role {role}")
            }
            NodeErr::PayloadSize {
                role,
                got,
                expected,
            } => write!(
                f,
                "payload size mismatch at role {role}: got {got} bytes, expected {expected}"
            ),
            NodeErr::AcquireTimeout { role } => {
                write!(f, "timed out waiting for a free address of role {role}")
            }
        }
    }
}

impl Error for NodeErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NodeErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NodeErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<NodeErr> for io::Error {
    fn from(value: NodeErr) -> Self {
        match value {
            NodeErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
