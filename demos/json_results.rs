use rs_ansible_cli::{
    decode_stream, AnsibleCommand, AnsibleExecutor, CancellationToken, ExecutionConfig, Executor,
    MemorySink, Result,
};
use tokio::io::BufReader;
use tracing::{info, warn};

// 模拟 ANSIBLE_STDOUT_CALLBACK=json 的输出，无需安装 ansible 即可运行
const CALLBACK_OUTPUT: &str = r#"cat <<'EOF'
{"plays": [{"play": {"name": "deploy web", "duration": {"start": "2024-05-01T08:00:00Z", "end": "2024-05-01T08:00:04Z"}}, "tasks": [{"task": {"name": "restart nginx"}, "hosts": {"web1": {"action": "service", "changed": true}, "web2": {"action": "service", "failed": true, "msg": "Unable to restart service nginx"}}}]}],
 "stats": {"web1": {"ok": 2, "changed": 1}, "web2": {"ok": 1, "failures": 1}}}
Playbook run took 0 days, 0 hours, 0 minutes, 4 seconds
EOF
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // 使用方法: RUST_LOG=debug cargo run --example json_results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("=== JSON 回调结果解析演示 ===");

    // 1. 捕获 stdout
    let captured = MemorySink::new();
    let config = ExecutionConfig::new(AnsibleCommand::new("sh").args(["-c", CALLBACK_OUTPUT]));
    let mut executor = AnsibleExecutor::new(config).with_stdout(captured.clone());
    executor.execute(&CancellationToken::new()).await?;

    // 2. 解析并合并所有 JSON 文档
    let contents = captured.contents();
    let document = decode_stream(BufReader::new(contents.as_slice())).await?;

    for play in &document.plays {
        info!("▶ {} ({} 个任务)", play.play.name, play.tasks.len());
        for task in &play.tasks {
            for (host, result) in &task.hosts {
                if result.failed {
                    warn!("  ❌ [{}] {}: {}", host, task.task.name, result.message());
                } else {
                    info!("  ✅ [{}] {} (changed={})", host, task.task.name, result.changed);
                }
            }
        }
    }

    // 3. 退出码为 0 时仍需检查 stats
    match document.check_stats() {
        Ok(()) => info!("所有主机执行成功"),
        Err(e) => warn!("{}", e),
    }

    Ok(())
}
