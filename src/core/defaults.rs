use serde::{Deserialize, Serialize};

/// Built-in defaults, overridable through the `defaults` section of a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Directory under which scratchpads are created, on every host.
    #[serde(default = "default_scratch_root")]
    pub scratch_root: String,

    #[serde(default = "default_archive_output")]
    pub archive_output: String,

    #[serde(default = "default_name_format")]
    pub name_format: String,

    #[serde(default = "default_tree_ish")]
    pub tree_ish: String,

    /// Executable name looked up under the build host's toolbin directory.
    #[serde(default = "default_build_tool")]
    pub build_tool: String,

    /// Installer entry point bundled in every distribution.
    #[serde(default = "default_installer")]
    pub installer: String,

    #[serde(default = "default_metadata_entry_point")]
    pub metadata_entry_point: String,

    /// Prints the project name then its version, one per line.
    #[serde(default = "default_metadata_probe")]
    pub metadata_probe: String,

    #[serde(default)]
    pub ssh: SshDefaults,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            scratch_root: default_scratch_root(),
            archive_output: default_archive_output(),
            name_format: default_name_format(),
            tree_ish: default_tree_ish(),
            build_tool: default_build_tool(),
            installer: default_installer(),
            metadata_entry_point: default_metadata_entry_point(),
            metadata_probe: default_metadata_probe(),
            ssh: SshDefaults::default(),
        }
    }
}

/// Connection settings applied to every remote host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshDefaults {
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u32,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            port: default_ssh_port(),
            connect_timeout: default_connect_timeout(),
            max_attempts: default_max_attempts(),
            identity_file: None,
        }
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_scratch_root() -> String {
    "/tmp".to_string()
}

fn default_archive_output() -> String {
    "/tmp".to_string()
}

fn default_name_format() -> String {
    "{name}-{version}-{tree_ish}-{datetime:%Y%m%d%H%M%S}".to_string()
}

fn default_tree_ish() -> String {
    "HEAD".to_string()
}

fn default_build_tool() -> String {
    "platter".to_string()
}

fn default_installer() -> String {
    "install.sh".to_string()
}

fn default_metadata_entry_point() -> String {
    "setup.py".to_string()
}

fn default_metadata_probe() -> String {
    "python setup.py --name --version".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    3
}
