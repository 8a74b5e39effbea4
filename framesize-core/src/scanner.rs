//! 関数のローカル変数スキャン
//!
//! 全ユニットのエントリを前順に走査し、指定名の最初の関数エントリから
//! 次の関数エントリまでの間にある変数を列挙します。
//! インライン展開された関数は、その関数名で再帰的にスキャンします。

use crate::{
    DebugInfoIndex, LocationDecoder, LocationDescriptor, ScanConfig, ScanError, SizeCalculator,
    TypeResolver, ANONYMOUS,
};
use framesize_dwarf::{Entry, EntryKind};
use tracing::{debug, trace, warn};

/// 変数1つ分の解決結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRow {
    /// バイトサイズ
    pub size: u64,
    /// 型名（扱えない型は None）
    pub type_name: Option<String>,
    /// 変数名
    pub name: String,
    /// 格納位置（デコードできなければ None）
    pub location: Option<LocationDescriptor>,
}

/// スキャン結果の要素（出現順）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    /// 関数に入った（対象関数、またはインライン展開された関数）
    Function { name: String, depth: usize },
    /// 変数
    Variable(VariableRow),
}

/// スキャン結果
#[derive(Debug, Clone)]
pub struct ScanReport {
    function: String,
    found: bool,
    items: Vec<ScanItem>,
}

impl ScanReport {
    /// 要求された関数名
    pub fn function(&self) -> &str {
        &self.function
    }

    /// 関数が見つかったか
    pub fn found(&self) -> bool {
        self.found
    }

    pub fn items(&self) -> &[ScanItem] {
        &self.items
    }

    /// 変数行のみを出現順に列挙する
    pub fn rows(&self) -> impl Iterator<Item = &VariableRow> {
        self.items.iter().filter_map(|item| match item {
            ScanItem::Variable(row) => Some(row),
            ScanItem::Function { .. } => None,
        })
    }

    /// 全変数のバイトサイズの合計
    pub fn total_size(&self) -> u64 {
        self.rows().map(|row| row.size).sum()
    }

    /// 関数が見つからなかった場合にエラーを返す
    pub fn ensure_found(&self) -> Result<(), ScanError> {
        if self.found {
            Ok(())
        } else {
            Err(ScanError::FunctionNotFound(self.function.clone()))
        }
    }
}

/// 関数スキャナ
pub struct FunctionScanner<'a> {
    index: &'a DebugInfoIndex<'a>,
    types: TypeResolver<'a>,
    sizes: SizeCalculator<'a>,
    locations: LocationDecoder<'a>,
    config: ScanConfig,
}

impl<'a> FunctionScanner<'a> {
    /// 索引を共有してスキャナを作成する
    pub fn new(index: &'a DebugInfoIndex<'a>, config: ScanConfig) -> Self {
        Self {
            index,
            types: TypeResolver::new(index, config.max_type_depth),
            sizes: SizeCalculator::new(index, config.max_type_depth),
            locations: LocationDecoder::new(index.info()),
            config,
        }
    }

    /// 関数のローカル変数をスキャンする
    ///
    /// 関数が見つからなくてもエラーにはせず、空の結果を返す。
    pub fn scan(&self, name: &str) -> ScanReport {
        let mut items = Vec::new();
        let mut active = Vec::new();
        let found = self.scan_function(name, 0, &mut active, &mut items);
        if !found {
            debug!("Function '{}' not found", name);
        }

        ScanReport {
            function: name.to_string(),
            found,
            items,
        }
    }

    /// `active` は展開中の関数エントリの位置（外側から順）
    fn scan_function(
        &self,
        name: &str,
        depth: usize,
        active: &mut Vec<usize>,
        items: &mut Vec<ScanItem>,
    ) -> bool {
        // 同名の関数が複数あっても、前順で最初のものだけを対象にする
        let start = match self.index.find_function(name) {
            Some(position) => position,
            None => return false,
        };
        trace!("Scanning '{}' from entry #{} (depth {})", name, start, depth);
        active.push(start);

        items.push(ScanItem::Function {
            name: name.to_string(),
            depth,
        });

        for entry in &self.index.entries()[start + 1..] {
            match entry.kind() {
                // 次の関数エントリで対象関数の範囲は終わる
                EntryKind::Function => break,
                EntryKind::Variable => items.push(ScanItem::Variable(self.resolve_variable(entry))),
                EntryKind::InlinedCall => self.expand_inlined(entry, depth, active, items),
                _ => {}
            }
        }

        active.pop();
        true
    }

    /// インライン展開された関数の変数を追加する
    fn expand_inlined(
        &self,
        entry: &Entry,
        depth: usize,
        active: &mut Vec<usize>,
        items: &mut Vec<ScanItem>,
    ) {
        let origin = match entry.abstract_origin().and_then(|o| self.index.lookup(o)) {
            Some(origin) => origin,
            None => {
                warn!("Inlined call without resolvable abstract origin: {}", entry);
                return;
            }
        };

        if depth >= self.config.max_inline_depth {
            warn!(
                "Inline depth limit {} reached at {}, not expanding further",
                self.config.max_inline_depth,
                entry.offset()
            );
            return;
        }

        let name = origin.name().unwrap_or(ANONYMOUS);
        // 展開中の関数に戻る循環は辿らない
        if let Some(position) = self.index.find_function(name) {
            if active.contains(&position) {
                warn!(
                    "Recursive inlining of '{}' at {}, not expanding",
                    name,
                    entry.offset()
                );
                return;
            }
        }

        if !self.scan_function(name, depth + 1, active, items) {
            debug!("Inlined function '{}' not found", name);
        }
    }

    /// 変数エントリを1行に解決する
    ///
    /// abstract origin を持つ場合は、定義元のエントリから名前・型・位置を解決する。
    fn resolve_variable(&self, entry: &'a Entry) -> VariableRow {
        let source = self.variable_origin(entry);
        let type_entry = self.type_entry(source);

        VariableRow {
            size: type_entry.map_or(0, |ty| self.sizes.byte_size(ty)),
            type_name: type_entry.and_then(|ty| self.types.type_string(ty)),
            name: source.name().unwrap_or(ANONYMOUS).to_string(),
            location: self.locations.decode(source),
        }
    }

    /// abstract origin の連鎖を辿った先の変数エントリ
    fn variable_origin(&self, entry: &'a Entry) -> &'a Entry {
        let mut current = entry;
        for _ in 0..self.config.max_type_depth {
            let origin = match current.abstract_origin() {
                Some(origin) => origin,
                None => return current,
            };
            match self.index.lookup(origin) {
                Some(next) => current = next,
                None => {
                    warn!(
                        "Unresolved abstract origin {} for variable at {}",
                        origin,
                        current.offset()
                    );
                    return current;
                }
            }
        }

        warn!("Abstract origin chain too deep at {}", entry.offset());
        current
    }

    /// 変数の型エントリ
    fn type_entry(&self, entry: &Entry) -> Option<&'a Entry> {
        let offset = entry.type_ref()?;
        let ty = self.index.lookup(offset);
        if ty.is_none() {
            warn!(
                "Unresolved type reference {} for variable at {}",
                offset,
                entry.offset()
            );
        }
        ty
    }
}
