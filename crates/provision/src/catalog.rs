//! The compiled-in catalog of installable items
//!
//! The catalog is an ordered list of [`Row`]s. Headings and spacers only
//! matter to whoever renders the list; the engine works on entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::pins::Pin;
use crate::strategy::StrategyRegistry;
use crate::types::{CatalogKey, StrategyTag};

/// A third-party apt repository: signing key plus one source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    /// Short name used in logs and prerequisite errors.
    pub name: String,
    pub keyring_url: String,
    /// File name under the keyrings directory.
    pub keyring_file: String,
    /// File name under the sources directory.
    pub list_file: String,
    /// Source line; `{arch}`, `{codename}` and `{keyring}` are filled in.
    pub source_line: String,
}

impl RepositorySpec {
    pub fn render_line(&self, arch: &str, codename: &str, keyring: &str) -> String {
        self.source_line
            .replace("{arch}", arch)
            .replace("{codename}", codename)
            .replace("{keyring}", keyring)
    }
}

/// What a generated removal script undoes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalRecipe {
    pub stop_services: Vec<String>,
    pub packages: Vec<String>,
    /// Only deleted when the destructive purge flag is set.
    pub data_dirs: Vec<String>,
    pub files: Vec<String>,
}

/// A vendor-provided install script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSpec {
    pub script_url: String,
    /// Binary whose presence on PATH means the item is installed.
    pub detect_binary: String,
    /// Services enabled after install; failure to start one is a warning.
    pub services: Vec<String>,
    pub removal: RemovalRecipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeManagerKind {
    Nvm,
    Pyenv,
}

impl RuntimeManagerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nvm => "nvm",
            Self::Pyenv => "pyenv",
        }
    }

    /// Directory under the user's home.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Nvm => ".nvm",
            Self::Pyenv => ".pyenv",
        }
    }

    /// Environment variable the installer reads for its root.
    pub fn root_var(&self) -> &'static str {
        match self {
            Self::Nvm => "NVM_DIR",
            Self::Pyenv => "PYENV_ROOT",
        }
    }
}

/// A per-user language runtime manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeManagerSpec {
    pub kind: RuntimeManagerKind,
    pub install_url: String,
    /// Native packages needed to build runtimes (installed as root first).
    pub build_packages: Vec<String>,
    /// Lines placed between the hostkit markers in shell profiles.
    pub profile_lines: Vec<String>,
}

/// How the Python target pin maps onto packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSelectSpec {
    pub system_packages: Vec<String>,
    /// `add-apt-repository` argument for versioned builds.
    pub ppa: String,
    /// Substring identifying the PPA in an existing source list.
    pub ppa_marker: String,
    /// Package templates; `{version}` becomes e.g. `3.12`.
    pub versioned_packages: Vec<String>,
}

/// Strategy-specific parameters of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyParams {
    None,
    VendorRepository(RepositorySpec),
    Binary { tool: toolchain::Tool },
    Script(ScriptSpec),
    RuntimeManager(RuntimeManagerSpec),
    LanguageSelect(LanguageSelectSpec),
}

impl StrategyParams {
    fn fits(&self, tag: StrategyTag) -> bool {
        matches!(
            (tag, self),
            (StrategyTag::NativePackage, Self::None)
                | (StrategyTag::VendorRepository, Self::VendorRepository(_))
                | (StrategyTag::StandaloneBinary, Self::Binary { .. })
                | (StrategyTag::ScriptedInstaller, Self::Script(_))
                | (StrategyTag::PerUserRuntimeManager, Self::RuntimeManager(_))
                | (StrategyTag::LanguageVersionSelect, Self::LanguageSelect(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: CatalogKey,
    pub label: String,
    pub description: String,
    /// Used only when no selection state exists yet.
    pub default_selected: bool,
    /// Native package names, in install order.
    pub packages: Vec<String>,
    pub strategy: StrategyTag,
    pub version_var: Option<Pin>,
    pub params: StrategyParams,
}

impl CatalogEntry {
    pub fn new(key: &str, label: &str, strategy: StrategyTag) -> Self {
        Self {
            key: CatalogKey::new(key),
            label: label.to_string(),
            description: String::new(),
            default_selected: false,
            packages: Vec::new(),
            strategy,
            version_var: None,
            params: StrategyParams::None,
        }
    }

    /// Shorthand for a native-package entry whose package is its key.
    pub fn package(key: &str, label: &str) -> Self {
        Self::new(key, label, StrategyTag::NativePackage).packages(&[key])
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn default_on(mut self) -> Self {
        self.default_selected = true;
        self
    }

    pub fn packages(mut self, packages: &[&str]) -> Self {
        self.packages = packages.iter().map(|p| (*p).to_string()).collect();
        self
    }

    pub fn pin(mut self, pin: Pin) -> Self {
        self.version_var = Some(pin);
        self
    }

    pub fn params(mut self, params: StrategyParams) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Row {
    Heading(String),
    Spacer,
    Entry(CatalogEntry),
}

#[derive(Debug, Clone)]
pub struct Catalog {
    rows: Vec<Row>,
    index: HashMap<CatalogKey, usize>,
}

impl Catalog {
    /// Build a catalog from rows. Duplicate keys are rejected.
    pub fn new(rows: Vec<Row>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            if let Row::Entry(entry) = row
                && index.insert(entry.key.clone(), i).is_some()
            {
                return Err(Error::InvalidCatalog(format!(
                    "duplicate key {}",
                    entry.key
                )));
            }
        }
        Ok(Self { rows, index })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.rows.iter().filter_map(|row| match row {
            Row::Entry(entry) => Some(entry),
            _ => None,
        })
    }

    pub fn all_keys(&self) -> Vec<CatalogKey> {
        self.entries().map(|e| e.key.clone()).collect()
    }

    pub fn entry(&self, key: &CatalogKey) -> Result<&CatalogEntry> {
        self.index
            .get(key)
            .and_then(|&i| match &self.rows[i] {
                Row::Entry(entry) => Some(entry),
                _ => None,
            })
            .ok_or_else(|| Error::UnknownKey(key.to_string()))
    }

    pub fn contains(&self, key: &CatalogKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn default_selected_keys(&self) -> Vec<CatalogKey> {
        self.entries()
            .filter(|e| e.default_selected)
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn keys_for_strategy(&self, tag: StrategyTag) -> Vec<CatalogKey> {
        self.entries()
            .filter(|e| e.strategy == tag)
            .map(|e| e.key.clone())
            .collect()
    }

    /// Check the catalog against a strategy registry.
    pub fn validate(&self, registry: &StrategyRegistry) -> Result<()> {
        for entry in self.entries() {
            registry.get(entry.strategy)?;
            if !entry.params.fits(entry.strategy) {
                return Err(Error::InvalidCatalog(format!(
                    "{}: parameters do not match strategy {}",
                    entry.key, entry.strategy
                )));
            }
            if entry.strategy.is_batchable() && entry.packages.is_empty() {
                return Err(Error::InvalidCatalog(format!(
                    "{}: {} entries must declare packages",
                    entry.key, entry.strategy
                )));
            }
            if entry.strategy == StrategyTag::StandaloneBinary && entry.version_var.is_none() {
                return Err(Error::InvalidCatalog(format!(
                    "{}: standalone binaries need a version pin",
                    entry.key
                )));
            }
        }
        Ok(())
    }

    /// The stock catalog.
    pub fn builtin() -> Result<Self> {
        Self::new(builtin_rows())
    }
}

fn heading(text: &str) -> Row {
    Row::Heading(text.to_string())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn builtin_rows() -> Vec<Row> {
    use StrategyTag::*;

    vec![
        heading("Base system"),
        Row::Entry(CatalogEntry::package("curl", "curl").describe("HTTP client").default_on()),
        Row::Entry(CatalogEntry::package("git", "Git").describe("Version control").default_on()),
        Row::Entry(CatalogEntry::package("jq", "jq").describe("JSON processor").default_on()),
        Row::Entry(CatalogEntry::package("htop", "htop").describe("Process viewer")),
        Row::Entry(CatalogEntry::package("tmux", "tmux").describe("Terminal multiplexer")),
        Row::Entry(
            CatalogEntry::new("openssh", "OpenSSH server", NativePackage)
                .packages(&["openssh-server"])
                .describe("Remote shell access"),
        ),
        Row::Entry(
            CatalogEntry::new("build-essential", "Build tools", NativePackage)
                .packages(&["build-essential", "pkg-config"])
                .describe("Compilers and make"),
        ),
        Row::Spacer,
        heading("Networking"),
        Row::Entry(
            CatalogEntry::new("wireguard", "WireGuard", NativePackage)
                .packages(&["wireguard", "wireguard-tools"])
                .describe("Kernel VPN tunnels"),
        ),
        Row::Entry(
            CatalogEntry::new("tailscale", "Tailscale", ScriptedInstaller)
                .describe("Mesh VPN (vendor install script)")
                .params(StrategyParams::Script(ScriptSpec {
                    script_url: "https://tailscale.com/install.sh".to_string(),
                    detect_binary: "tailscale".to_string(),
                    services: strings(&["tailscaled"]),
                    removal: RemovalRecipe {
                        stop_services: strings(&["tailscaled"]),
                        packages: strings(&["tailscale", "tailscale-archive-keyring"]),
                        data_dirs: strings(&["/var/lib/tailscale"]),
                        files: strings(&[
                            "/etc/apt/sources.list.d/tailscale.list",
                            "/usr/share/keyrings/tailscale-archive-keyring.gpg",
                        ]),
                    },
                })),
        ),
        Row::Spacer,
        heading("Containers and orchestration"),
        Row::Entry(
            CatalogEntry::new("docker", "Docker Engine", ScriptedInstaller)
                .describe("Container runtime (get.docker.com)")
                .params(StrategyParams::Script(ScriptSpec {
                    script_url: "https://get.docker.com".to_string(),
                    detect_binary: "docker".to_string(),
                    services: strings(&["docker", "containerd"]),
                    removal: RemovalRecipe {
                        stop_services: strings(&["docker.socket", "docker", "containerd"]),
                        packages: strings(&[
                            "docker-ce",
                            "docker-ce-cli",
                            "containerd.io",
                            "docker-buildx-plugin",
                            "docker-compose-plugin",
                            "docker-ce-rootless-extras",
                        ]),
                        data_dirs: strings(&["/var/lib/docker", "/var/lib/containerd"]),
                        files: strings(&[
                            "/etc/apt/sources.list.d/docker.list",
                            "/etc/apt/keyrings/docker.asc",
                        ]),
                    },
                })),
        ),
        Row::Entry(
            CatalogEntry::new("kubectl", "kubectl", VendorRepository)
                .packages(&["kubectl"])
                .describe("Kubernetes CLI (pkgs.k8s.io)")
                .params(StrategyParams::VendorRepository(RepositorySpec {
                    name: "kubernetes".to_string(),
                    keyring_url: "https://pkgs.k8s.io/core:/stable:/v1.31/deb/Release.key"
                        .to_string(),
                    keyring_file: "kubernetes-apt-keyring.gpg".to_string(),
                    list_file: "kubernetes.list".to_string(),
                    source_line:
                        "deb [signed-by={keyring}] https://pkgs.k8s.io/core:/stable:/v1.31/deb/ /"
                            .to_string(),
                })),
        ),
        Row::Entry(
            CatalogEntry::new("helm", "Helm", StandaloneBinary)
                .describe("Kubernetes package manager")
                .pin(Pin::HelmVersion)
                .params(StrategyParams::Binary {
                    tool: toolchain::Tool::Helm,
                }),
        ),
        Row::Spacer,
        heading("Infrastructure as code"),
        Row::Entry(
            CatalogEntry::new("terraform", "Terraform", StandaloneBinary)
                .describe("HashiCorp Terraform")
                .pin(Pin::TerraformVersion)
                .params(StrategyParams::Binary {
                    tool: toolchain::Tool::Terraform,
                }),
        ),
        Row::Entry(
            CatalogEntry::new("ansible", "Ansible", NativePackage)
                .packages(&["ansible", "sshpass"])
                .describe("Configuration management"),
        ),
        Row::Entry(
            CatalogEntry::new("sops", "SOPS", StandaloneBinary)
                .describe("Encrypted secrets editor")
                .pin(Pin::SopsVersion)
                .params(StrategyParams::Binary {
                    tool: toolchain::Tool::Sops,
                }),
        ),
        Row::Entry(CatalogEntry::package("age", "age").describe("File encryption")),
        Row::Entry(
            CatalogEntry::new("gh", "GitHub CLI", VendorRepository)
                .packages(&["gh"])
                .describe("GitHub from the terminal (cli.github.com)")
                .params(StrategyParams::VendorRepository(RepositorySpec {
                    name: "github-cli".to_string(),
                    keyring_url: "https://cli.github.com/packages/githubcli-archive-keyring.gpg"
                        .to_string(),
                    keyring_file: "githubcli-archive-keyring.gpg".to_string(),
                    list_file: "github-cli.list".to_string(),
                    source_line:
                        "deb [arch={arch} signed-by={keyring}] https://cli.github.com/packages stable main"
                            .to_string(),
                })),
        ),
        Row::Spacer,
        heading("Languages"),
        Row::Entry(
            CatalogEntry::new("pyenv", "pyenv", PerUserRuntimeManager)
                .describe("Per-user Python versions")
                .pin(Pin::PyenvVersion)
                .params(StrategyParams::RuntimeManager(RuntimeManagerSpec {
                    kind: RuntimeManagerKind::Pyenv,
                    install_url: "https://pyenv.run".to_string(),
                    build_packages: strings(&[
                        "build-essential",
                        "libssl-dev",
                        "zlib1g-dev",
                        "libbz2-dev",
                        "libreadline-dev",
                        "libsqlite3-dev",
                        "libncursesw5-dev",
                        "xz-utils",
                        "tk-dev",
                        "libxml2-dev",
                        "libxmlsec1-dev",
                        "libffi-dev",
                        "liblzma-dev",
                    ]),
                    profile_lines: strings(&[
                        "export PYENV_ROOT=\"$HOME/.pyenv\"",
                        "[ -d \"$PYENV_ROOT/bin\" ] && export PATH=\"$PYENV_ROOT/bin:$PATH\"",
                        "eval \"$(pyenv init - bash)\"",
                    ]),
                })),
        ),
        Row::Entry(
            CatalogEntry::new("node", "Node.js (nvm)", PerUserRuntimeManager)
                .describe("Per-user Node.js via nvm")
                .pin(Pin::NodeVersion)
                .params(StrategyParams::RuntimeManager(RuntimeManagerSpec {
                    kind: RuntimeManagerKind::Nvm,
                    install_url: "https://raw.githubusercontent.com/nvm-sh/nvm/v0.40.1/install.sh"
                        .to_string(),
                    build_packages: Vec::new(),
                    profile_lines: strings(&[
                        "export NVM_DIR=\"$HOME/.nvm\"",
                        "[ -s \"$NVM_DIR/nvm.sh\" ] && . \"$NVM_DIR/nvm.sh\"",
                        "[ -s \"$NVM_DIR/bash_completion\" ] && . \"$NVM_DIR/bash_completion\"",
                    ]),
                })),
        ),
        Row::Entry(
            CatalogEntry::new("python", "Python", LanguageVersionSelect)
                .describe("System Python, pyenv, or a deadsnakes build")
                .pin(Pin::PythonTarget)
                .params(StrategyParams::LanguageSelect(LanguageSelectSpec {
                    system_packages: strings(&["python3", "python3-venv", "python3-pip"]),
                    ppa: "ppa:deadsnakes/ppa".to_string(),
                    ppa_marker: "deadsnakes".to_string(),
                    versioned_packages: strings(&["python{version}", "python{version}-venv"]),
                })),
        ),
    ]
}
