use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// 判断参数是否为 verbosity 标志（`-v`、`-vv`... 或 `--verbose`）
pub fn is_verbosity_flag(token: &str) -> bool {
    if token == "--verbose" {
        return true;
    }
    match token.strip_prefix('-') {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c == 'v'),
        None => false,
    }
}

/// 移除所有 verbosity 标志，其余参数保持顺序
pub fn strip_verbosity_flags(argv: Vec<String>) -> Vec<String> {
    argv.into_iter().filter(|t| !is_verbosity_flag(t)).collect()
}

/// 在 PATH 中查找可执行文件
///
/// 包含路径分隔符的名称直接检查该路径。
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// 渲染为可直接粘贴到 shell 的命令行
pub fn render_command(argv: &[String]) -> String {
    shell_words::join(argv)
}

/// `KEY=value` 形式，按键名排序
pub fn render_env(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 组装非零退出时的错误信息：命令、环境变量覆盖和 stderr 尾部
pub fn failure_message(
    command: &str,
    exit_code: i32,
    env: &BTreeMap<String, String>,
    stderr_tail: &str,
) -> String {
    let mut message = format!("Command '{}' failed with exit code {}", command, exit_code);
    if !env.is_empty() {
        message.push_str(&format!("\n  environment: {}", render_env(env)));
    }
    if !stderr_tail.trim().is_empty() {
        message.push_str(&format!("\n  stderr:\n{}", stderr_tail));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_verbosity_flags() {
        for flag in ["-v", "-vv", "-vvv", "-vvvv", "--verbose"] {
            assert!(is_verbosity_flag(flag), "{}", flag);
        }
        for token in ["-", "--", "-vx", "-i", "--vault-id", "v", "verbose"] {
            assert!(!is_verbosity_flag(token), "{}", token);
        }
    }

    #[test]
    fn test_strip_verbosity_flags_keeps_order() {
        let stripped = strip_verbosity_flags(argv(&[
            "ansible-playbook",
            "-vvv",
            "-i",
            "hosts",
            "--verbose",
            "site.yml",
            "-v",
        ]));
        assert_eq!(stripped, argv(&["ansible-playbook", "-i", "hosts", "site.yml"]));
    }

    #[test]
    fn test_find_executable() {
        assert!(find_executable("sh").is_some());
        assert!(find_executable("definitely-not-a-real-binary-4b1d").is_none());
        assert!(find_executable("/definitely/not/here/sh").is_none());
        assert!(find_executable("").is_none());
    }

    #[test]
    fn test_render_command_quotes_whitespace() {
        let rendered = render_command(&argv(&["ansible", "all", "-a", "echo hi", "-e", "it's"]));
        assert_eq!(rendered, r"ansible all -a 'echo hi' -e 'it'\''s'");

        // 渲染结果可以被 shell 按原样拆回
        let tokens = argv(&["ansible-playbook", "-e", r#"{"version": "1.2.3"}"#, "site.yml", ""]);
        assert_eq!(shell_words::split(&render_command(&tokens)).unwrap(), tokens);
    }

    #[test]
    fn test_failure_message_sections() {
        let mut env = BTreeMap::new();
        env.insert("ANSIBLE_STDOUT_CALLBACK".to_string(), "json".to_string());
        env.insert("ANSIBLE_FORCE_COLOR".to_string(), "true".to_string());

        let message = failure_message("ansible-playbook site.yml", 2, &env, "fatal: [web1]");
        assert!(message.starts_with("Command 'ansible-playbook site.yml' failed with exit code 2"));
        assert!(message.contains("environment: ANSIBLE_FORCE_COLOR=true ANSIBLE_STDOUT_CALLBACK=json"));
        assert!(message.contains("stderr:\nfatal: [web1]"));

        let bare = failure_message("ansible all -m ping", 3, &BTreeMap::new(), "  ");
        assert_eq!(bare, "Command 'ansible all -m ping' failed with exit code 3");
    }
}
