use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Pingtalk 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建所有组件 (release)
    Build,
    /// 在回环射频上运行一次 Ping 往返
    Ping {
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
        /// 日志输出文件 (默认输出到终端)
        #[arg(short = 'o', long)]
        log_file: Option<String>,
    },
    /// 在回环射频上浏览模拟外设
    Browse {
        /// 服务过滤 (如 180A)
        #[arg(short, long)]
        filter: Option<String>,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 格式和 lint 检查
    Lint,
    /// 运行测试
    Test,
    /// 运行测试并生成覆盖率报告
    Coverage,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // 确保在项目根目录执行
    let project_root = match std::env::var("CARGO_MANIFEST_DIR")
        .map(std::path::PathBuf::from)
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Ping {
            log_level,
            log_file,
        } => ping(&sh, &log_level, log_file)?,
        Commands::Browse { filter, json } => browse(&sh, filter, json)?,
        Commands::Lint => lint(&sh)?,
        Commands::Test => test(&sh)?,
        Commands::Coverage => coverage(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建所有组件...");
    cmd!(sh, "cargo build --release --workspace").run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn ping(sh: &Shell, log_level: &str, log_file: Option<String>) -> Result<()> {
    println!("📡 运行 Ping 往返...");
    let rust_log = format!("{level},pingtalk_core={level}", level = log_level);

    match log_file {
        Some(log_file) => {
            println!("   日志文件: {}", log_file);
            // 使用 shell 执行以支持重定向
            let command = format!(
                "RUST_LOG='{}' cargo run -p pingtalk-sim -- ping 2>> '{}'",
                rust_log, log_file
            );
            cmd!(sh, "bash -c {command}").run()?;
        }
        None => {
            cmd!(sh, "cargo run -p pingtalk-sim -- ping")
                .env("RUST_LOG", rust_log)
                .run()?;
        }
    }
    Ok(())
}

fn browse(sh: &Shell, filter: Option<String>, json: bool) -> Result<()> {
    println!("🔍 浏览模拟外设...");
    let mut args = vec!["browse".to_string()];
    if let Some(filter) = filter {
        args.push("--filter".to_string());
        args.push(filter);
    }
    if json {
        args.push("--json".to_string());
    }
    cmd!(sh, "cargo run -q -p pingtalk-sim -- {args...}").run()?;
    Ok(())
}

fn lint(sh: &Shell) -> Result<()> {
    println!("🔎 检查格式和 lint...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    println!("✅ 检查通过");
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 运行测试覆盖率分析...");

    // 检查 cargo-tarpaulin 是否安装
    if cmd!(sh, "cargo tarpaulin --version").run().is_err() {
        println!("📦 安装 cargo-tarpaulin...");
        cmd!(sh, "cargo install cargo-tarpaulin").run()?;
    }

    println!("🔍 分析中...");
    cmd!(
        sh,
        "cargo tarpaulin --packages pingtalk-core --packages pingtalk-sim --out Html --output-dir target/coverage"
    )
    .run()?;

    println!("✅ 覆盖率报告已生成");
    println!("   HTML 报告: target/coverage/tarpaulin-report.html");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    println!("✅ 清理完成");
    Ok(())
}
