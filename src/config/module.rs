use serde::Deserialize;

/// How packages are presented to the go command.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Module path prefix every package is served under.
    #[serde(default = "ModuleConfig::default_base_path")]
    pub base_path: String,
    /// Value of the `go` directive in generated go.mod files.
    #[serde(default = "ModuleConfig::default_go_version")]
    pub go_version: String,
}

impl ModuleConfig {
    fn default_base_path() -> String {
        "gohugo.io/npmjs".to_string()
    }

    fn default_go_version() -> String {
        "1.17".to_string()
    }

    /// Accepts `1.N` and `1.N.P`.
    pub fn is_valid_go_version(version: &str) -> bool {
        let parts: Vec<&str> = version.split('.').collect();
        (2..=3).contains(&parts.len())
            && parts[0] == "1"
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            base_path: Self::default_base_path(),
            go_version: Self::default_go_version(),
        }
    }
}
