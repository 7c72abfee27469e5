//! Error taxonomy shared by the server, the client and the wire codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameError {
    /// Malformed or structurally incomplete wire payload. Dropped without
    /// touching world state.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// No legal cell was found for a join or a potion after bounded retries.
    #[error("no space available")]
    NoSpaceAvailable,

    /// A movement or attack intent failed validation. Never surfaced to the
    /// client; only observable by the absence of a broadcast.
    #[error("intent rejected: {0}")]
    RejectedIntent(&'static str),

    /// The server answered a join with `Rejected`.
    #[error("join refused: {0}")]
    JoinRefused(String),

    /// Socket-level I/O failure.
    #[error("transport fault: {0}")]
    TransportFault(#[from] std::io::Error),
}

impl From<serde_json::Error> for GameError {
    fn from(e: serde_json::Error) -> Self {
        GameError::InvalidPacket(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_become_invalid_packet() {
        let err: GameError = serde_json::from_str::<u32>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, GameError::InvalidPacket(_)));
    }

    #[test]
    fn test_io_errors_become_transport_fault() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: GameError = io.into();
        assert!(matches!(err, GameError::TransportFault(_)));
        assert!(err.to_string().contains("reset"));
    }
}
