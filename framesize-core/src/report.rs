//! スキャン結果のテキスト出力

use crate::{ScanItem, ScanReport, VariableRow};
use std::io::{self, Write};

/// 型名が解決できなかった変数の表示
pub const UNKNOWN_TYPE: &str = "<unknown>";

/// レポート出力器
pub struct ReportEmitter<W: Write> {
    out: W,
}

impl<W: Write> ReportEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// 関数ごとに `名前:` の見出しを出し、続けて変数を1行ずつ出力する
    pub fn emit(&mut self, report: &ScanReport) -> io::Result<()> {
        for item in report.items() {
            match item {
                ScanItem::Function { name, .. } => writeln!(self.out, "{}:", name)?,
                ScanItem::Variable(row) => self.write_row(row)?,
            }
        }
        self.out.flush()
    }

    fn write_row(&mut self, row: &VariableRow) -> io::Result<()> {
        let type_name = row.type_name.as_deref().unwrap_or(UNKNOWN_TYPE);
        let location = row
            .location
            .as_ref()
            .map(|loc| loc.to_string())
            .unwrap_or_default();

        writeln!(
            self.out,
            "\t{}\t{:<30}\t{:<30}\t{}",
            row.size, type_name, row.name, location
        )
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
