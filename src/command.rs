use crate::error::AnsibleError;
use crate::utils::render_command;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_ANSIBLE_BINARY: &str = "ansible";
pub const DEFAULT_PLAYBOOK_BINARY: &str = "ansible-playbook";
pub const DEFAULT_GALAXY_BINARY: &str = "ansible-galaxy";
pub const DEFAULT_INVENTORY_BINARY: &str = "ansible-inventory";

/// 生成一次执行所需的 argv，`argv[0]` 为可执行文件
pub trait Commander: Send + Sync {
    fn command(&self) -> Result<Vec<String>, AnsibleError>;

    fn display_string(&self) -> String {
        self.command()
            .map(|argv| render_command(&argv))
            .unwrap_or_default()
    }
}

/// 任意可执行文件加参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnsibleCommand {
    pub binary: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl AnsibleCommand {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }
}

impl Commander for AnsibleCommand {
    fn command(&self) -> Result<Vec<String>, AnsibleError> {
        if self.binary.trim().is_empty() {
            return Err(AnsibleError::ValidationError(
                "command binary must not be empty".to_string(),
            ));
        }
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.binary.clone());
        argv.extend(self.args.iter().cloned());
        Ok(argv)
    }
}

/// `ansible-playbook` 命令
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookCommand {
    /// 为空时使用 `ansible-playbook`
    #[serde(default)]
    pub binary: Option<String>,
    pub playbooks: Vec<String>,
    #[serde(default)]
    pub inventory: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub skip_tags: Vec<String>,
    #[serde(default)]
    pub extra_vars: BTreeMap<String, Value>,
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub diff: bool,
    #[serde(default)]
    pub r#become: bool,
    #[serde(default)]
    pub vault_password_file: Option<String>,
    /// 0 表示不加 `-v`
    #[serde(default)]
    pub verbosity: u8,
}

impl PlaybookCommand {
    pub fn new<I, S>(playbooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            playbooks: playbooks
                .into_iter()
                .map(|p| p.as_ref().to_string())
                .collect(),
            ..Default::default()
        }
    }
}

impl Commander for PlaybookCommand {
    fn command(&self) -> Result<Vec<String>, AnsibleError> {
        if self.playbooks.is_empty() {
            return Err(AnsibleError::ValidationError(
                "ansible-playbook requires at least one playbook".to_string(),
            ));
        }

        let mut argv = vec![
            self.binary
                .clone()
                .unwrap_or_else(|| DEFAULT_PLAYBOOK_BINARY.to_string()),
        ];

        if let Some(ref inventory) = self.inventory {
            argv.push("--inventory".to_string());
            argv.push(inventory.clone());
        }
        if let Some(ref limit) = self.limit {
            argv.push("--limit".to_string());
            argv.push(limit.clone());
        }
        if !self.tags.is_empty() {
            argv.push("--tags".to_string());
            argv.push(self.tags.join(","));
        }
        if !self.skip_tags.is_empty() {
            argv.push("--skip-tags".to_string());
            argv.push(self.skip_tags.join(","));
        }
        if !self.extra_vars.is_empty() {
            let vars = serde_json::to_string(&self.extra_vars).map_err(|e| {
                AnsibleError::ValidationError(format!("invalid extra vars: {}", e))
            })?;
            argv.push("--extra-vars".to_string());
            argv.push(vars);
        }
        if self.check {
            argv.push("--check".to_string());
        }
        if self.diff {
            argv.push("--diff".to_string());
        }
        if self.r#become {
            argv.push("--become".to_string());
        }
        if let Some(ref file) = self.vault_password_file {
            argv.push("--vault-password-file".to_string());
            argv.push(file.clone());
        }
        if self.verbosity > 0 {
            argv.push(format!("-{}", "v".repeat(self.verbosity.min(4) as usize)));
        }

        argv.extend(self.playbooks.iter().cloned());
        Ok(argv)
    }
}

/// `ansible <pattern> -m <module>` ad-hoc 命令
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdhocCommand {
    #[serde(default)]
    pub binary: Option<String>,
    pub pattern: String,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub module_args: Option<String>,
    #[serde(default)]
    pub inventory: Option<String>,
    #[serde(default)]
    pub verbosity: u8,
}

impl AdhocCommand {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            ..Default::default()
        }
    }
}

impl Commander for AdhocCommand {
    fn command(&self) -> Result<Vec<String>, AnsibleError> {
        if self.pattern.trim().is_empty() {
            return Err(AnsibleError::ValidationError(
                "ad-hoc command requires a host pattern".to_string(),
            ));
        }

        let mut argv = vec![
            self.binary
                .clone()
                .unwrap_or_else(|| DEFAULT_ANSIBLE_BINARY.to_string()),
            self.pattern.clone(),
        ];
        if let Some(ref inventory) = self.inventory {
            argv.push("--inventory".to_string());
            argv.push(inventory.clone());
        }
        if let Some(ref module) = self.module_name {
            argv.push("--module-name".to_string());
            argv.push(module.clone());
        }
        if let Some(ref args) = self.module_args {
            argv.push("--args".to_string());
            argv.push(args.clone());
        }
        if self.verbosity > 0 {
            argv.push(format!("-{}", "v".repeat(self.verbosity.min(4) as usize)));
        }
        Ok(argv)
    }
}
