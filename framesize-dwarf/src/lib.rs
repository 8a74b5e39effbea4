//! framesize DWARF デバッグ情報モデル
//!
//! このクレートは、ELFファイルからDWARFデバッグ情報を読み込み、
//! 読み取り専用のエントリグラフ（DIEツリー）として提供します。
//! ロケーション式のサブパーサーとレジスタ名の解決もここで行います。

pub mod builder;
pub mod entry;
pub mod expr;
pub mod loader;
pub mod registers;

pub use builder::DebugInfoBuilder;
pub use entry::{AttrValue, CompilationUnit, DebugInfo, Entry, EntryKind, EntryOffset, UnitId};
pub use expr::{parse_location, ExprOp, LocationExpr};
pub use loader::{DwarfLoader, LoadError};
pub use registers::Arch;

/// DWARF解析の結果型
pub type Result<T> = anyhow::Result<T>;
