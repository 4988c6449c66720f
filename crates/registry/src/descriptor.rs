//! Service identity.

use std::fmt;

/// Identity of one logical service: interface name plus optional group and
/// version qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceDescriptor {
    /// The service interface name, e.g. `com.example.HelloService`.
    pub interface_name: String,
    /// Optional service version.
    pub version: Option<String>,
    /// Optional service group.
    pub group: Option<String>,
}

impl ServiceDescriptor {
    /// Create a descriptor for `interface_name` with no qualifiers.
    #[must_use]
    pub fn new(interface_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            version: None,
            group: None,
        }
    }

    /// Set the service version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the service group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Normalized unique key: `group/interfaceName:version`, with the group
    /// and version segments omitted when absent.
    ///
    /// Used for consumer caching and subscription identity.
    #[must_use]
    pub fn service_key(&self) -> String {
        let mut key = self.interface_name.clone();
        if let Some(group) = &self.group {
            key = format!("{group}/{key}");
        }
        if let Some(version) = &self.version {
            key = format!("{key}:{version}");
        }
        key
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_key())
    }
}
