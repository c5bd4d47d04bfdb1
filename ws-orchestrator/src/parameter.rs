use serde::{Deserialize, Serialize};

/// Name of the parameter that overrides a workspace's display name.
pub const SYS_NAME: &str = "sys-name";
pub const SYS_UID: &str = "sys-uid";
pub const SYS_WORKSPACE_ACTION: &str = "sys-workspace-action";
pub const SYS_RESOURCE_ACTION: &str = "sys-resource-action";
pub const SYS_HOST: &str = "sys-host";

/// Parameters the orchestrator injects itself; any caller supplied copies are replaced.
pub const INJECTED_PARAMETERS: [&str; 4] =
    [SYS_UID, SYS_WORKSPACE_ACTION, SYS_RESOURCE_ACTION, SYS_HOST];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// Value of the first parameter called `name`, if it carries one.
pub fn parameter_value<'a>(parameters: &'a [Parameter], name: &str) -> Option<&'a str> {
    parameters
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.value.as_deref())
}
