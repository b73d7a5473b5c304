//! Framed JSON-lines control protocol spoken over each worker's stdin.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Begin graceful drain: stop accepting new connections, finish
    /// in-flight requests, then exit 0.
    Shutdown,
    /// Resize the worker's own internal pools (SIGUSR2 equivalent).
    ResizePool { size: usize },
}

impl ControlMessage {
    pub fn to_line(&self) -> String {
        format!("{}\n", serde_json::to_string(self).unwrap_or_default())
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_round_trips_through_a_line() {
        let line = ControlMessage::Shutdown.to_line();
        assert_eq!(ControlMessage::parse_line(&line), Some(ControlMessage::Shutdown));
    }
}
