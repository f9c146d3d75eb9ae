use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Docker,
    Singularity,
}

impl ContainerType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "docker" => Some(Self::Docker),
            "singularity" => Some(Self::Singularity),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Singularity => "singularity",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ContainerDescription {
    pub identifier: String,
    #[serde(rename = "type")]
    pub container_type: ContainerType,
    #[serde(default)]
    pub resolve_dependencies: bool,
    #[serde(default = "default_container_shell")]
    pub shell: String,
}

impl ContainerDescription {
    pub fn new(identifier: impl Into<String>, container_type: ContainerType) -> Self {
        Self {
            identifier: identifier.into(),
            container_type,
            resolve_dependencies: false,
            shell: default_container_shell(),
        }
    }
}

fn default_container_shell() -> String {
    "/bin/sh".to_string()
}

pub type DestinationParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerDestination {
    pub id: String,
    #[serde(default)]
    pub params: DestinationParams,
}

/// Which container technologies are enabled and which deployment
/// destinations serve each of them.
#[derive(Debug, Clone, Default)]
pub struct ContainerDestinations {
    destinations: IndexMap<ContainerType, Vec<ContainerDestination>>,
}

impl ContainerDestinations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled_container_types(
        &mut self,
        container_types_to_destinations: IndexMap<ContainerType, Vec<ContainerDestination>>,
    ) {
        self.destinations = container_types_to_destinations;
    }

    pub fn enabled_container_types(&self) -> Vec<ContainerType> {
        self.destinations.keys().copied().collect()
    }

    pub fn is_enabled(&self, container_type: ContainerType) -> bool {
        self.destinations.contains_key(&container_type)
    }

    /// Params of `destination_id`, or of the first destination serving
    /// `container_type` when no id is given.
    pub fn destination_info(
        &self,
        container_type: ContainerType,
        destination_id: Option<&str>,
    ) -> Option<&DestinationParams> {
        let destinations = self.destinations.get(&container_type)?;
        match destination_id {
            None => destinations.first().map(|destination| &destination.params),
            Some(id) => destinations
                .iter()
                .find(|destination| destination.id == id)
                .map(|destination| &destination.params),
        }
    }
}
