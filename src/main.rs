//! 程序入口：初始化日志，按子命令对 schema/模型或目录列表快照做离线检查

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::SubscriberBuilder;

use panel_model::model::performance::run_performance_suite;
use panel_model::model::tree::to_breadcrumbs;
use panel_model::utils::fs::write_json_file;
use panel_model::vm::rows::visible_row_views;
use panel_model::{ExplorerState, FieldPlan, FormSession};

#[derive(Debug, Parser)]
#[command(name = "panel_model", version, about = "控制面板数据核心的离线检查工具")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 按 schema 校验模型，输出错误树
    Validate {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        model: PathBuf,
        /// 校验前按 schema 补齐缺失字段的默认值
        #[arg(long)]
        fill_defaults: bool,
        /// 把（填充后的）模型写到该文件
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// 输出字段计划（JSON）
    Plan {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        model: PathBuf,
    },
    /// 按展开状态打印目录列表快照
    Tree {
        listing: PathBuf,
        #[arg(long)]
        expand_all: bool,
        /// 要展开的目录，可重复
        #[arg(long)]
        expand: Vec<String>,
        /// 选中的节点（其祖先会被展开）
        #[arg(long)]
        select: Option<String>,
    },
    /// 打印路径的面包屑
    Breadcrumbs { path: String },
    /// 运行性能基准
    Bench,
}

/// 返回 false 表示检查未通过
fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Command::Validate {
            schema,
            model,
            fill_defaults,
            output,
        } => {
            let mut session = FormSession::load_files(&schema, &model).context("加载表单失败")?;
            if fill_defaults {
                session.apply_defaults();
            }
            let passed = match session.validate() {
                Some(errors) => {
                    for (path, message) in errors.messages() {
                        println!("{}: {}", if path.is_root() { "$".to_string() } else { path.to_string() }, message);
                    }
                    false
                }
                None => {
                    println!("校验通过");
                    true
                }
            };
            if let Some(output) = output {
                session.save_model(&output).context("保存模型失败")?;
            }
            Ok(passed)
        }
        Command::Plan { schema, model } => {
            let mut session = FormSession::load_files(&schema, &model).context("加载表单失败")?;
            session.validate();
            let plan = FieldPlan::for_session(&session);
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(true)
        }
        Command::Tree {
            listing,
            expand_all,
            expand,
            select,
        } => {
            let mut state = ExplorerState::default();
            state.load_listing_file(&listing).context("加载列表失败")?;
            if expand_all {
                state.expand_all();
            }
            for dir in &expand {
                state.expand(dir);
            }
            if let Some(selected) = &select {
                state.select(selected);
            }
            for row in visible_row_views(&state) {
                let marker = match (row.expandable, row.expanded) {
                    (true, true) => "▾",
                    (true, false) => "▸",
                    _ => " ",
                };
                println!("{}{} {}  {}", "  ".repeat(row.depth), marker, row.name, row.detail);
            }
            Ok(true)
        }
        Command::Breadcrumbs { path } => {
            let crumbs = to_breadcrumbs(&path);
            println!("{}", serde_json::to_string_pretty(&crumbs)?);
            Ok(true)
        }
        Command::Bench => {
            let results = run_performance_suite();
            let report = std::env::temp_dir().join("panel_model_bench.json");
            write_json_file(&report, &results)?;
            tracing::info!("基准报告已写出: {}", report.display());
            Ok(results.iter().all(|r| r.success))
        }
    }
}

fn main() -> ExitCode {
    // 初始化日志输出
    let _ = SubscriberBuilder::default()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("执行失败: {:#}", e);
            ExitCode::from(2)
        }
    }
}
