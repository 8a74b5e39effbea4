//! framesize CLI - コマンドラインインターフェース
//!
//! 指定した関数のローカル変数について、型名・バイトサイズ・スタック上の位置を一覧表示する。
//! `-Wframe-larger-than` の警告が出た関数の調査に使う。

use anyhow::Result;
use clap::Parser;
use framesize_core::{DebugInfoIndex, FunctionScanner, ReportEmitter, ScanConfig};
use framesize_dwarf::DwarfLoader;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// frame-larger-than - report the locals that make up a function's stack frame
#[derive(Parser, Debug)]
#[command(name = "frame-larger-than")]
#[command(version)]
#[command(
    about = "List local variables of a function with their type, size and stack location",
    long_about = None
)]
struct Cli {
    /// Path to the binary with DWARF debug info
    binary: PathBuf,

    /// Name of the function to report
    function: String,

    /// Maximum depth of inlined functions to expand
    #[arg(long, default_value_t = ScanConfig::default().max_inline_depth)]
    max_inline_depth: usize,

    /// Maximum length of type and abstract origin chains to follow
    #[arg(long, default_value_t = ScanConfig::default().max_type_depth)]
    max_type_depth: usize,

    /// Exit with an error if the function is not found
    #[arg(long)]
    strict: bool,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            max_inline_depth: self.max_inline_depth,
            max_type_depth: self.max_type_depth,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help と --version は正常終了、それ以外の引数エラーは 1
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// 診断出力（標準エラー）を初期化する
///
/// `-v` が指定されていなければ `RUST_LOG` に従い、未設定なら warn 以上を出す。
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

/// バイナリを読み込み、関数をスキャンしてレポートを出力する
fn run(cli: &Cli) -> Result<()> {
    let loader = DwarfLoader::open(&cli.binary)?;
    let info = loader.load()?;
    debug!(
        "Loaded {} entries from {}",
        info.entries().len(),
        loader.name()
    );

    let index = DebugInfoIndex::new(&info);
    let scanner = FunctionScanner::new(&index, cli.scan_config());
    let report = scanner.scan(&cli.function);

    if !report.found() {
        if cli.strict {
            report.ensure_found()?;
        }
        warn!("Function '{}' not found in {}", cli.function, loader.name());
    }

    let stdout = std::io::stdout();
    let mut emitter = ReportEmitter::new(stdout.lock());
    emitter.emit(&report)?;

    Ok(())
}
