//! エントリグラフの構築
//!
//! ローダーがDWARFから読み込む際と、テスト等で合成グラフを組み立てる際の両方で使う。
//! エントリは開いた順（前順）に追加され、`open` と `close` で親子関係を表す。

use crate::entry::{AttrValue, CompilationUnit, DebugInfo, Entry, EntryKind, EntryOffset, UnitId};
use crate::{Arch, Result};
use std::collections::HashMap;

/// 合成ユニットのヘッダ長（DWARF 4, 32ビット形式）
const UNIT_HEADER_SIZE: u64 = 11;

/// エントリグラフのビルダー
pub struct DebugInfoBuilder {
    arch: Arch,
    endian: gimli::RunTimeEndian,
    units: Vec<CompilationUnit>,
    entries: Vec<Entry>,
    /// オフセット -> `entries` のインデックス
    positions: HashMap<EntryOffset, usize>,
    /// 開いているエントリのインデックス（親から順）
    open: Vec<usize>,
    /// 自動採番する次のオフセット
    next_offset: u64,
}

impl DebugInfoBuilder {
    /// 新しいビルダーを作成する（リトルエンディアン）
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            endian: gimli::RunTimeEndian::Little,
            units: Vec::new(),
            entries: Vec::new(),
            positions: HashMap::new(),
            open: Vec::new(),
            next_offset: 0,
        }
    }

    pub fn with_endian(mut self, endian: gimli::RunTimeEndian) -> Self {
        self.endian = endian;
        self
    }

    /// 新しいコンパイルユニットを開始する（オフセットは自動採番）
    pub fn begin_unit(&mut self, version: u16, address_size: u8) -> UnitId {
        let encoding = gimli::Encoding {
            format: gimli::Format::Dwarf32,
            version,
            address_size,
        };
        let offset = self.next_offset;
        self.next_offset += UNIT_HEADER_SIZE;
        self.begin_unit_at(offset, encoding)
    }

    /// ヘッダオフセットとエンコーディングを指定してユニットを開始する
    pub fn begin_unit_at(&mut self, offset: u64, encoding: gimli::Encoding) -> UnitId {
        self.end_unit();

        let id = UnitId(self.units.len());
        self.units
            .push(CompilationUnit::new(id, offset, encoding, self.entries.len()));
        id
    }

    /// 現在のユニットを閉じる
    pub fn end_unit(&mut self) {
        self.open.clear();
        let end = self.entries.len();
        if let Some(unit) = self.units.last_mut() {
            unit.set_end(end);
        }
    }

    /// 現在の親の子としてエントリを開く（オフセットは自動採番）
    pub fn open<I>(&mut self, kind: EntryKind, attrs: I) -> Result<EntryOffset>
    where
        I: IntoIterator<Item = (gimli::DwAt, AttrValue)>,
    {
        let attrs: Vec<_> = attrs.into_iter().collect();
        let offset = EntryOffset(self.next_offset);
        self.open_at(offset, kind, attrs)?;
        Ok(offset)
    }

    /// オフセットを指定してエントリを開く
    pub fn open_at<I>(&mut self, offset: EntryOffset, kind: EntryKind, attrs: I) -> Result<()>
    where
        I: IntoIterator<Item = (gimli::DwAt, AttrValue)>,
    {
        let unit = match self.units.last() {
            Some(unit) => unit.id(),
            None => return Err(anyhow::anyhow!("No compilation unit started")),
        };
        if self.positions.contains_key(&offset) {
            return Err(anyhow::anyhow!("Duplicate entry offset {}", offset));
        }

        let attrs: std::collections::BTreeMap<_, _> = attrs.into_iter().collect();
        // 実際のDIEのおおよその長さ分だけ進める
        self.next_offset = self
            .next_offset
            .max(offset.0 + 1 + 4 * attrs.len() as u64);

        let index = self.entries.len();
        if let Some(&parent) = self.open.last() {
            self.entries[parent].push_child(offset);
        }
        self.entries.push(Entry::new(offset, kind, attrs, unit));
        self.positions.insert(offset, index);
        self.open.push(index);
        Ok(())
    }

    /// 子を持たないエントリを追加する
    pub fn leaf<I>(&mut self, kind: EntryKind, attrs: I) -> Result<EntryOffset>
    where
        I: IntoIterator<Item = (gimli::DwAt, AttrValue)>,
    {
        let offset = self.open(kind, attrs)?;
        self.close();
        Ok(offset)
    }

    /// 最後に開いたエントリを閉じる
    pub fn close(&mut self) {
        self.open.pop();
    }

    /// 現在開いているエントリの深さ
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// 追加済みのエントリに属性を設定する（前方参照の解決用）
    pub fn set_attr(
        &mut self,
        target: EntryOffset,
        name: gimli::DwAt,
        value: AttrValue,
    ) -> Result<()> {
        let index = *self
            .positions
            .get(&target)
            .ok_or_else(|| anyhow::anyhow!("No entry at offset {}", target))?;
        self.entries[index].set_attr(name, value);
        Ok(())
    }

    /// グラフを確定する
    pub fn finish(mut self) -> DebugInfo {
        self.end_unit();
        DebugInfo {
            arch: self.arch,
            endian: self.endian,
            units: self.units,
            entries: self.entries,
        }
    }
}

/// DW_AT_name
pub fn name(name: &str) -> (gimli::DwAt, AttrValue) {
    (gimli::DW_AT_name, AttrValue::String(name.to_string()))
}

/// DW_AT_type
pub fn type_ref(offset: EntryOffset) -> (gimli::DwAt, AttrValue) {
    (gimli::DW_AT_type, AttrValue::Ref(offset))
}

/// DW_AT_abstract_origin
pub fn abstract_origin(offset: EntryOffset) -> (gimli::DwAt, AttrValue) {
    (gimli::DW_AT_abstract_origin, AttrValue::Ref(offset))
}

/// DW_AT_byte_size
pub fn byte_size(size: u64) -> (gimli::DwAt, AttrValue) {
    (gimli::DW_AT_byte_size, AttrValue::Udata(size))
}

/// DW_AT_count
pub fn count(count: u64) -> (gimli::DwAt, AttrValue) {
    (gimli::DW_AT_count, AttrValue::Udata(count))
}

/// DW_AT_location（単一のロケーション式）
pub fn location(expr: &[u8]) -> (gimli::DwAt, AttrValue) {
    (gimli::DW_AT_location, AttrValue::Expr(expr.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preorder_and_children() {
        let mut builder = DebugInfoBuilder::new(Arch::Unknown);
        builder.begin_unit(4, 8);
        let cu = builder.open(EntryKind::Other(gimli::DW_TAG_compile_unit), []).unwrap();
        let f = builder.open(EntryKind::Function, [name("f")]).unwrap();
        let v = builder.leaf(EntryKind::Variable, [name("v")]).unwrap();
        builder.close();
        let g = builder.leaf(EntryKind::Function, [name("g")]).unwrap();
        let info = builder.finish();

        let offsets: Vec<_> = info.entries().iter().map(|e| e.offset()).collect();
        assert_eq!(offsets, vec![cu, f, v, g]);
        assert_eq!(info.entries()[0].children(), &[f, g]);
        assert_eq!(info.entries()[1].children(), &[v]);
        assert!(cu < f && f < v && v < g);
    }

    #[test]
    fn test_units_partition_entries() {
        let mut builder = DebugInfoBuilder::new(Arch::X86_64);
        builder.begin_unit(4, 8);
        builder.leaf(EntryKind::Function, [name("a")]).unwrap();
        builder.begin_unit(5, 4);
        builder.leaf(EntryKind::Function, [name("b")]).unwrap();
        builder.leaf(EntryKind::Function, [name("c")]).unwrap();
        let info = builder.finish();

        assert_eq!(info.units().len(), 2);
        assert_eq!(info.units()[0].entry_range(), 0..1);
        assert_eq!(info.units()[1].entry_range(), 1..3);
        assert_eq!(info.units()[1].address_size(), 4);
        assert_eq!(info.units()[1].version(), 5);
        assert_eq!(info.entries()[2].unit(), UnitId(1));
        assert_eq!(info.unit_entries(&info.units()[1])[0].name(), Some("b"));
    }

    #[test]
    fn test_set_attr_resolves_forward_reference() {
        let mut builder = DebugInfoBuilder::new(Arch::Unknown);
        builder.begin_unit(4, 8);
        let var = builder.leaf(EntryKind::Variable, [name("v")]).unwrap();
        let int = builder.leaf(EntryKind::BaseType, [name("int"), byte_size(4)]).unwrap();
        builder.set_attr(var, gimli::DW_AT_type, AttrValue::Ref(int)).unwrap();
        let info = builder.finish();

        assert_eq!(info.entries()[0].type_ref(), Some(int));
    }

    #[test]
    fn test_rejects_entry_without_unit() {
        let mut builder = DebugInfoBuilder::new(Arch::Unknown);
        assert!(builder.leaf(EntryKind::Function, []).is_err());
    }

    #[test]
    fn test_rejects_duplicate_offset() {
        let mut builder = DebugInfoBuilder::new(Arch::Unknown);
        builder.begin_unit(4, 8);
        builder.open_at(EntryOffset(0x20), EntryKind::BaseType, []).unwrap();
        builder.close();
        assert!(builder.open_at(EntryOffset(0x20), EntryKind::BaseType, []).is_err());
    }
}
