use anyhow::{bail, Context, Result};
use rs_ansible_cli::command::DEFAULT_PLAYBOOK_BINARY;
use rs_ansible_cli::transformer::{log_format, prepend, DEFAULT_LOG_FORMAT};
use rs_ansible_cli::{
    decode_documents, merge_documents, resolve_outcome, AnsibleCommand, AnsibleError,
    AnsibleExecutor, AnsibleSettings, CancellationToken, ExecutionConfig, Executor, MemorySink,
    ResultDocument, StdoutCallback, SystemClock, TimedExecutor, TransformerChain,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const USAGE: &str =
    "Usage: rs-ansible-cli [--json] [--quiet] [--settings <file.yml>] <ansible-playbook args...>";

/// 命令行参数，未识别的参数原样传给 ansible-playbook
#[derive(Debug, Default)]
struct CliArgs {
    json: bool,
    quiet: bool,
    settings: Option<PathBuf>,
    ansible_args: Vec<String>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => cli.json = true,
            "--quiet" => cli.quiet = true,
            "--settings" => {
                let path = args.next().context("--settings requires a file path")?;
                cli.settings = Some(PathBuf::from(path));
            }
            "--" => {
                cli.ansible_args.extend(args.by_ref());
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => cli.ansible_args.push(arg),
        }
    }

    if cli.ansible_args.is_empty() {
        bail!("missing ansible-playbook arguments\n{}", USAGE);
    }
    Ok(cli)
}

fn load_settings(cli: &CliArgs) -> Result<AnsibleSettings> {
    let mut settings = match cli.settings {
        Some(ref path) => AnsibleSettings::from_yaml_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => AnsibleSettings::new(),
    };
    if cli.json {
        settings.stdout_callback = StdoutCallback::Json;
    }
    settings.quiet |= cli.quiet;
    Ok(settings)
}

fn print_summary(document: &ResultDocument) {
    println!("\n📊 Playbook 执行结果");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for play in &document.plays {
        let elapsed = play
            .play
            .duration
            .as_ref()
            .and_then(|d| d.elapsed())
            .map(|d| format!("{:.3}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        println!("▶ {} ({} 个任务, {})", play.play.name, play.tasks.len(), elapsed);
    }

    let mut hosts: Vec<_> = document.stats.iter().collect();
    hosts.sort_by(|a, b| a.0.cmp(b.0));
    for (host, stats) in hosts {
        let marker = if stats.is_failure() { "❌" } else { "✅" };
        println!(
            "{} {:<24} ok={} changed={} failed={} unreachable={} skipped={}",
            marker, host, stats.ok, stats.changed, stats.failures, stats.unreachable, stats.skipped
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化tracing日志，输出到stderr，stdout留给ansible输出
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = parse_args(std::env::args().skip(1))?;
    let settings = load_settings(&cli)?;

    let mut config = ExecutionConfig::new(
        AnsibleCommand::new(DEFAULT_PLAYBOOK_BINARY).args(&cli.ansible_args),
    );
    settings.apply(&mut config);
    config.kill_on_cancel = true;
    if !cli.json {
        config.transformers = TransformerChain::new()
            .with(prepend("│"))
            .with(log_format(DEFAULT_LOG_FORMAT, Arc::new(SystemClock)));
    }

    let captured = MemorySink::new();
    let mut executor = AnsibleExecutor::new(config);
    if cli.json {
        executor = executor.with_stdout(captured.clone());
    }
    let mut executor = TimedExecutor::new(executor);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl-C, cancelling execution");
            signal_token.cancel();
        }
    });

    let execution = executor.execute(&cancel).await;
    if let Some(elapsed) = executor.duration() {
        info!("ansible-playbook finished in {:.3}s", elapsed.as_secs_f64());
    }

    let outcome = if cli.json {
        match decode_documents(&captured.contents()) {
            Ok(documents) => {
                let document = merge_documents(documents);
                print_summary(&document);
                resolve_outcome(execution, Some(&document))
            }
            // 进程本身失败时 stdout 往往不是完整的 JSON
            Err(decode_error) => match execution {
                Err(e) => Err(e),
                Ok(()) => Err(decode_error),
            },
        }
    } else {
        execution
    };

    if let Err(e) = outcome {
        eprintln!("❌ {}", e);
        std::process::exit(exit_status(&e));
    }
    Ok(())
}

fn exit_status(error: &AnsibleError) -> i32 {
    match error.exit_code() {
        Some(code) if code > 0 => code,
        _ => 1,
    }
}
