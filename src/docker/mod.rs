use crate::registry::{ManagerError, Workload, WorkloadManager};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Thin client for the Docker Engine HTTP API, used as the workload manager.
/// Only the three calls the registry needs are implemented.
#[derive(Debug, Clone)]
pub struct DockerApiClient {
    host: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Labels", default)]
    labels: BTreeMap<String, String>,
    #[serde(rename = "State", default)]
    state: String,
}

fn request_error(err: ureq::Error) -> ManagerError {
    match err {
        ureq::Error::Status(code, _) => {
            ManagerError::Rejected(format!("docker api returned status {code}"))
        }
        ureq::Error::Transport(transport) => ManagerError::Unreachable(transport.to_string()),
    }
}

impl DockerApiClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.host.trim_end_matches('/'), path)
    }
}

impl WorkloadManager for DockerApiClient {
    fn list_labeled(&self, label: &str) -> Result<Vec<Workload>, ManagerError> {
        let filters = json!({ "label": [label] }).to_string();
        let url = format!(
            "{}?all=true&filters={}",
            self.endpoint("containers/json"),
            urlencoding::encode(&filters)
        );
        let response = ureq::get(&url).call().map_err(request_error)?;
        let containers: Vec<ContainerSummary> = response
            .into_json()
            .map_err(|e| ManagerError::Rejected(format!("unparseable container list: {e}")))?;

        Ok(containers
            .into_iter()
            .filter_map(|container| {
                container.labels.get(label).map(|name| Workload {
                    id: container.id.clone(),
                    name: name.clone(),
                    running: container.state == "running",
                })
            })
            .collect())
    }

    fn start(&self, id: &str) -> Result<(), ManagerError> {
        let url = self.endpoint(&format!("containers/{id}/start"));
        ureq::post(&url).call().map_err(request_error)?;
        Ok(())
    }

    fn stop(&self, id: &str) -> Result<(), ManagerError> {
        let url = self.endpoint(&format!("containers/{id}/stop"));
        ureq::post(&url).call().map_err(request_error)?;
        Ok(())
    }
}
