//! A single worker slot: the child process plus its control-pipe stdin.
//!
//! Uses `std::process` rather than `tokio::process`: the supervisor polls
//! every slot on a fixed tick (see `ClusterSupervisor::supervise_forever`),
//! so there is no need for an async child handle, and a blocking write of a
//! few bytes to a pipe the child is expected to read promptly is not worth
//! the complexity of driving it through the tokio IO reactor.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use super::control::ControlMessage;

pub struct SlotExit {
    pub code: i32,
    /// True if the worker exited 0 after a requested shutdown; false means
    /// an abnormal exit that should trigger the restart policy.
    pub graceful: bool,
}

pub struct Slot {
    child: Child,
    shutdown_requested: bool,
}

impl Slot {
    pub fn spawn(binary_path: &Path, args: &[String], slot_id: usize) -> anyhow::Result<Self> {
        let child = Command::new(binary_path)
            .args(args)
            .env("CLUSTER_ROLE", "worker")
            .env("WORKER_SLOT", slot_id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(Self { child, shutdown_requested: false })
    }

    /// Non-blocking poll for exit, matching the supervisor's 250ms tick.
    pub fn try_wait(&mut self) -> Option<SlotExit> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code().unwrap_or(-1);
                Some(SlotExit { code, graceful: self.shutdown_requested && code == 0 })
            }
            _ => None,
        }
    }

    /// Write a `Shutdown` control message to the worker's stdin. The worker
    /// is expected to drain in-flight requests and exit 0 on its own.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
        if let Some(stdin) = self.child.stdin.as_mut() {
            let line = ControlMessage::Shutdown.to_line();
            // Best-effort: a pipe write failure means the worker is already
            // gone, which `try_wait` will observe on the next tick.
            let _ = stdin.write_all(line.as_bytes());
        }
    }

    pub fn force_kill(&mut self) {
        let _ = self.child.kill();
    }
}
