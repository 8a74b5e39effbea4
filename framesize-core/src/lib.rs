//! framesize コア機能
//!
//! 関数のローカル変数を列挙し、型名・バイトサイズ・スタック上の位置を解決します。
//! 入力はローダーが構築した読み取り専用のエントリグラフです。

pub mod config;
pub mod errors;
pub mod index;
pub mod location;
pub mod report;
pub mod scanner;
pub mod size;
pub mod types;

pub use config::ScanConfig;
pub use errors::ScanError;
pub use index::DebugInfoIndex;
pub use location::{LocationDecoder, LocationDescriptor};
pub use report::ReportEmitter;
pub use scanner::{FunctionScanner, ScanItem, ScanReport, VariableRow};
pub use size::SizeCalculator;
pub use types::TypeResolver;

/// 名前を持たないエントリの表示名
pub const ANONYMOUS: &str = "{anonymous}";
