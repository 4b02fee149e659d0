use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Running,
    NotRunning,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceState::Running => write!(f, "running"),
            ResourceState::NotRunning => write!(f, "not running"),
        }
    }
}

/// A named workload from the most recent refresh. `id` is the manager-side
/// handle used for start/stop; `name` is the value of the designated label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub id: String,
    pub state: ResourceState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub id: String,
    pub name: String,
    pub running: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("workload manager unreachable: {0}")]
    Unreachable(String),
    #[error("workload manager rejected the request: {0}")]
    Rejected(String),
}

pub trait WorkloadManager {
    fn list_labeled(&self, label: &str) -> Result<Vec<Workload>, ManagerError>;
    fn start(&self, id: &str) -> Result<(), ManagerError>;
    fn stop(&self, id: &str) -> Result<(), ManagerError>;
}

pub type Snapshot = BTreeMap<String, Resource>;

/// Refreshable view of the labeled workloads. Every refresh builds a new
/// snapshot and swaps it in whole; callers get their own copy, so a
/// concurrent refresh never mutates a snapshot mid-read.
pub struct ResourceRegistry {
    manager: Box<dyn WorkloadManager>,
    label: String,
    snapshot: Mutex<Snapshot>,
}

impl ResourceRegistry {
    pub fn new(manager: Box<dyn WorkloadManager>, label: impl Into<String>) -> Self {
        Self {
            manager,
            label: label.into(),
            snapshot: Mutex::new(Snapshot::new()),
        }
    }

    pub fn refresh(&self) -> Result<Snapshot, ManagerError> {
        let workloads = self.manager.list_labeled(&self.label)?;
        let mut next = Snapshot::new();
        for workload in workloads {
            let state = if workload.running {
                ResourceState::Running
            } else {
                ResourceState::NotRunning
            };
            next.insert(
                workload.name.clone(),
                Resource {
                    name: workload.name,
                    id: workload.id,
                    state,
                },
            );
        }
        match self.snapshot.lock() {
            Ok(mut held) => *held = next.clone(),
            Err(poisoned) => *poisoned.into_inner() = next.clone(),
        }
        Ok(next)
    }

    pub fn current(&self) -> Snapshot {
        match self.snapshot.lock() {
            Ok(held) => held.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn start(&self, resource: &Resource) -> Result<(), ManagerError> {
        self.manager.start(&resource.id)
    }

    pub fn stop(&self, resource: &Resource) -> Result<(), ManagerError> {
        self.manager.stop(&resource.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeManager {
        workloads: Vec<Workload>,
        unreachable: bool,
    }

    impl WorkloadManager for FakeManager {
        fn list_labeled(&self, _label: &str) -> Result<Vec<Workload>, ManagerError> {
            if self.unreachable {
                return Err(ManagerError::Unreachable("connection refused".to_string()));
            }
            Ok(self.workloads.clone())
        }

        fn start(&self, _id: &str) -> Result<(), ManagerError> {
            Ok(())
        }

        fn stop(&self, _id: &str) -> Result<(), ManagerError> {
            Ok(())
        }
    }

    fn workload(id: &str, name: &str, running: bool) -> Workload {
        Workload {
            id: id.to_string(),
            name: name.to_string(),
            running,
        }
    }

    #[test]
    fn refresh_replaces_the_whole_snapshot() {
        let registry = ResourceRegistry::new(
            Box::new(FakeManager {
                workloads: vec![workload("a1", "web1", true), workload("b2", "db1", false)],
                unreachable: false,
            }),
            "workbot",
        );

        let snapshot = registry.refresh().expect("refresh");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["web1"].state, ResourceState::Running);
        assert_eq!(snapshot["db1"].state, ResourceState::NotRunning);
        assert_eq!(registry.current(), snapshot);

        // A second refresh against a changed manager drops vanished entries.
        let registry = ResourceRegistry::new(
            Box::new(FakeManager {
                workloads: vec![workload("a1", "web1", false)],
                unreachable: false,
            }),
            "workbot",
        );
        let snapshot = registry.refresh().expect("refresh");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["web1"].state, ResourceState::NotRunning);
    }

    #[test]
    fn duplicate_label_values_keep_the_last_entry() {
        let registry = ResourceRegistry::new(
            Box::new(FakeManager {
                workloads: vec![workload("a1", "web1", true), workload("c3", "web1", false)],
                unreachable: false,
            }),
            "workbot",
        );
        let snapshot = registry.refresh().expect("refresh");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["web1"].id, "c3");
    }

    #[test]
    fn unreachable_manager_leaves_previous_snapshot_in_place() {
        let registry = ResourceRegistry::new(
            Box::new(FakeManager {
                workloads: Vec::new(),
                unreachable: true,
            }),
            "workbot",
        );
        let err = registry.refresh().expect_err("refresh fails");
        assert!(matches!(err, ManagerError::Unreachable(_)));
        assert!(registry.current().is_empty());
    }

    #[test]
    fn returned_snapshot_is_a_private_copy() {
        let registry = ResourceRegistry::new(
            Box::new(FakeManager {
                workloads: vec![workload("a1", "web1", true)],
                unreachable: false,
            }),
            "workbot",
        );
        let mut snapshot = registry.refresh().expect("refresh");
        snapshot.remove("web1");
        assert_eq!(registry.current().len(), 1);
    }
}
