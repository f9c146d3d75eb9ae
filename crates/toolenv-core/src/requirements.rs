use std::fmt;

use anyhow::{anyhow, Context};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    Package,
    SetEnvironment,
    EnvironmentVariable,
    Other,
}

impl RequirementType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "package" => Some(Self::Package),
            "set_environment" => Some(Self::SetEnvironment),
            "environment_variable" => Some(Self::EnvironmentVariable),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::SetEnvironment => "set_environment",
            Self::EnvironmentVariable => "environment_variable",
            Self::Other => "other",
        }
    }

    /// Whether resolvers may act on requirements of this type. The remaining
    /// types are informational only.
    pub fn is_resolvable(self) -> bool {
        matches!(self, Self::Package | Self::SetEnvironment)
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolRequirement {
    pub name: String,
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub requirement_type: RequirementType,
}

impl ToolRequirement {
    pub fn new(
        name: impl Into<String>,
        version: Option<&str>,
        requirement_type: RequirementType,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
            requirement_type,
        }
    }

    pub fn package(name: impl Into<String>, version: Option<&str>) -> Self {
        Self::new(name, version, RequirementType::Package)
    }
}

impl fmt::Display for ToolRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{} ({})", self.name, version, self.requirement_type),
            None => write!(f, "{} ({})", self.name, self.requirement_type),
        }
    }
}

/// A requirement as declared by a tool, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequirementDeclaration {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "type")]
    pub requirement_type: Option<String>,
}

impl RequirementDeclaration {
    pub fn to_requirement(&self) -> anyhow::Result<ToolRequirement> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(anyhow!("requirement name must not be empty"));
        }

        let version = match self.version.as_deref().map(str::trim) {
            Some("") => {
                return Err(anyhow!(
                    "requirement '{name}' declares an empty version; omit it instead"
                ));
            }
            other => other,
        };

        let requirement_type = match self.requirement_type.as_deref() {
            None => RequirementType::Package,
            Some(raw) => RequirementType::parse(raw).ok_or_else(|| {
                anyhow!(
                    "unsupported requirement type '{raw}' for '{name}'; supported: package, set_environment, environment_variable, other"
                )
            })?,
        };

        Ok(ToolRequirement::new(name, version, requirement_type))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolRequirements {
    requirements: IndexSet<ToolRequirement>,
}

#[derive(Debug, Deserialize)]
struct RequirementsFile {
    #[serde(default)]
    requirements: Vec<RequirementDeclaration>,
}

impl ToolRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_declarations(declarations: &[RequirementDeclaration]) -> anyhow::Result<Self> {
        let mut requirements = Self::new();
        for (index, declaration) in declarations.iter().enumerate() {
            let requirement = declaration
                .to_requirement()
                .with_context(|| format!("invalid requirement declaration at index {index}"))?;
            requirements.push(requirement);
        }
        Ok(requirements)
    }

    /// Parses a `[[requirements]]` TOML document.
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let file: RequirementsFile =
            toml::from_str(input).context("failed to parse requirements document")?;
        Self::from_declarations(&file.requirements)
    }

    /// Adds a requirement, returning `false` when an equal one is already present.
    pub fn push(&mut self, requirement: ToolRequirement) -> bool {
        self.requirements.insert(requirement)
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn contains(&self, requirement: &ToolRequirement) -> bool {
        self.requirements.contains(requirement)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolRequirement> {
        self.requirements.iter()
    }

    pub fn resolvable(&self) -> ToolRequirements {
        self.requirements
            .iter()
            .filter(|requirement| requirement.requirement_type.is_resolvable())
            .cloned()
            .collect()
    }
}

impl FromIterator<ToolRequirement> for ToolRequirements {
    fn from_iter<I: IntoIterator<Item = ToolRequirement>>(iter: I) -> Self {
        Self {
            requirements: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<ToolRequirement>> for ToolRequirements {
    fn from(requirements: Vec<ToolRequirement>) -> Self {
        requirements.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a ToolRequirements {
    type Item = &'a ToolRequirement;
    type IntoIter = indexmap::set::Iter<'a, ToolRequirement>;

    fn into_iter(self) -> Self::IntoIter {
        self.requirements.iter()
    }
}
