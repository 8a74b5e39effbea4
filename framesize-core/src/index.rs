//! オフセットからエントリへの索引

use framesize_dwarf::{DebugInfo, Entry, EntryKind, EntryOffset};
use std::collections::HashMap;

/// デバッグ情報の索引
///
/// グラフ全体を一度だけ走査して構築し、以降の参照は O(1) で行う。
/// 構築後は読み取り専用なので、複数のスキャンで共有してよい。
pub struct DebugInfoIndex<'a> {
    info: &'a DebugInfo,
    /// オフセット -> `DebugInfo::entries` のインデックス
    by_offset: HashMap<EntryOffset, usize>,
    /// 関数名 -> 最初に現れる関数エントリのインデックス
    functions: HashMap<&'a str, usize>,
}

impl<'a> DebugInfoIndex<'a> {
    /// 索引を構築する
    pub fn new(info: &'a DebugInfo) -> Self {
        let entries = info.entries();
        let mut by_offset = HashMap::with_capacity(entries.len());
        let mut functions = HashMap::new();

        for (position, entry) in entries.iter().enumerate() {
            by_offset.insert(entry.offset(), position);

            if entry.kind() == EntryKind::Function {
                let name = entry.name().unwrap_or(crate::ANONYMOUS);
                functions.entry(name).or_insert(position);
            }
        }

        Self {
            info,
            by_offset,
            functions,
        }
    }

    pub fn info(&self) -> &'a DebugInfo {
        self.info
    }

    /// 前順のエントリ列
    pub fn entries(&self) -> &'a [Entry] {
        self.info.entries()
    }

    /// オフセットからエントリを取得する
    pub fn lookup(&self, offset: EntryOffset) -> Option<&'a Entry> {
        self.position(offset).map(|position| &self.info.entries()[position])
    }

    /// オフセットに対応する前順の位置
    pub fn position(&self, offset: EntryOffset) -> Option<usize> {
        self.by_offset.get(&offset).copied()
    }

    /// 子エントリを格納順に列挙する
    pub fn children(&self, entry: &'a Entry) -> impl Iterator<Item = &'a Entry> + '_ {
        entry
            .children()
            .iter()
            .filter_map(move |offset| self.lookup(*offset))
    }

    /// 指定名の関数エントリのうち、前順で最初のものの位置
    pub fn find_function(&self, name: &str) -> Option<usize> {
        self.functions.get(name).copied()
    }

    /// エントリが属するユニットのアドレスサイズ
    pub fn address_size(&self, entry: &Entry) -> Option<u8> {
        self.info.unit(entry.unit()).map(|unit| unit.address_size())
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }
}
