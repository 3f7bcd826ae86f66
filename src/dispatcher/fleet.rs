//! Robot availability, as tracked by the dispatcher.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RobotStatus {
    /// Idle and accepting orders.
    Online,
    /// Has an order in progress.
    Working,
    /// Missed a completion deadline; no longer given orders.
    Broken,
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RobotStatus::Online => "ONLINE",
            RobotStatus::Working => "WORKING",
            RobotStatus::Broken => "BROKEN",
        };
        f.write_str(name)
    }
}

/// Status table keyed by robot name. Iteration order is by name.
#[derive(Debug, Default)]
pub struct Fleet {
    robots: Mutex<BTreeMap<String, RobotStatus>>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` as `ONLINE`, or resets it to `ONLINE` if already known.
    pub fn register(&self, name: impl Into<String>) {
        let name = name.into();
        info!(robot = %name, "Robot registered");
        self.robots.lock().insert(name, RobotStatus::Online);
    }

    pub fn status(&self, name: &str) -> Option<RobotStatus> {
        self.robots.lock().get(name).copied()
    }

    /// Sets the status of a known robot. Returns false if the robot is unknown.
    pub fn set_status(&self, name: &str, status: RobotStatus) -> bool {
        match self.robots.lock().get_mut(name) {
            Some(current) => {
                *current = status;
                info!(robot = %name, %status, "Robot status updated");
                true
            }
            None => false,
        }
    }

    /// Picks the first `ONLINE` robot and marks it `WORKING` in one step.
    pub fn claim_available(&self) -> Option<String> {
        let mut robots = self.robots.lock();
        let (name, status) = robots
            .iter_mut()
            .find(|(_, status)| **status == RobotStatus::Online)?;
        *status = RobotStatus::Working;
        Some(name.clone())
    }

    pub fn snapshot(&self) -> Vec<(String, RobotStatus)> {
        self.robots
            .lock()
            .iter()
            .map(|(name, status)| (name.clone(), *status))
            .collect()
    }
}
