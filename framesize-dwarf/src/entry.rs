//! デバッグ情報エントリのグラフモデル
//!
//! ローダーが一度だけ構築し、以降は読み取り専用で扱うDIEツリーを表現します。
//! エントリは全コンパイルユニットを連結した前順（深さ優先）の列として保持されます。

use crate::Arch;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// `.debug_info` セクション全体でのグローバルオフセット
///
/// グラフ全体で一意であり、エントリの識別子として使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryOffset(pub u64);

impl fmt::Display for EntryOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<0x{:08x}>", self.0)
    }
}

/// コンパイルユニットの識別子（`DebugInfo::units` のインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub usize);

/// エントリの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// DW_TAG_subprogram
    Function,
    /// DW_TAG_variable
    Variable,
    /// DW_TAG_structure_type
    Struct,
    /// DW_TAG_union_type
    Union,
    /// DW_TAG_base_type
    BaseType,
    /// DW_TAG_pointer_type
    Pointer,
    /// DW_TAG_inlined_subroutine
    InlinedCall,
    /// DW_TAG_const_type
    Const,
    /// DW_TAG_array_type
    Array,
    /// DW_TAG_subrange_type
    Subrange,
    /// DW_TAG_typedef
    Typedef,
    /// DW_TAG_enumeration_type
    Enum,
    /// 上記以外（診断用に元のタグを保持する）
    Other(gimli::DwTag),
}

impl EntryKind {
    /// DWARFタグから種別を決定する
    pub fn from_tag(tag: gimli::DwTag) -> Self {
        match tag {
            gimli::DW_TAG_subprogram => EntryKind::Function,
            gimli::DW_TAG_variable => EntryKind::Variable,
            gimli::DW_TAG_structure_type => EntryKind::Struct,
            gimli::DW_TAG_union_type => EntryKind::Union,
            gimli::DW_TAG_base_type => EntryKind::BaseType,
            gimli::DW_TAG_pointer_type => EntryKind::Pointer,
            gimli::DW_TAG_inlined_subroutine => EntryKind::InlinedCall,
            gimli::DW_TAG_const_type => EntryKind::Const,
            gimli::DW_TAG_array_type => EntryKind::Array,
            gimli::DW_TAG_subrange_type => EntryKind::Subrange,
            gimli::DW_TAG_typedef => EntryKind::Typedef,
            gimli::DW_TAG_enumeration_type => EntryKind::Enum,
            other => EntryKind::Other(other),
        }
    }

    /// 対応するDWARFタグ
    pub fn tag(self) -> gimli::DwTag {
        match self {
            EntryKind::Function => gimli::DW_TAG_subprogram,
            EntryKind::Variable => gimli::DW_TAG_variable,
            EntryKind::Struct => gimli::DW_TAG_structure_type,
            EntryKind::Union => gimli::DW_TAG_union_type,
            EntryKind::BaseType => gimli::DW_TAG_base_type,
            EntryKind::Pointer => gimli::DW_TAG_pointer_type,
            EntryKind::InlinedCall => gimli::DW_TAG_inlined_subroutine,
            EntryKind::Const => gimli::DW_TAG_const_type,
            EntryKind::Array => gimli::DW_TAG_array_type,
            EntryKind::Subrange => gimli::DW_TAG_subrange_type,
            EntryKind::Typedef => gimli::DW_TAG_typedef,
            EntryKind::Enum => gimli::DW_TAG_enumeration_type,
            EntryKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// 属性値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// 文字列（インライン文字列と文字列テーブル参照の両方）
    String(String),
    /// 符号なし定数
    Udata(u64),
    /// 符号付き定数
    Sdata(i64),
    /// フラグ
    Flag(bool),
    /// 他のエントリへの参照
    Ref(EntryOffset),
    /// 単一のロケーション式（生バイト列）
    Expr(Vec<u8>),
    /// ロケーションリストへのオフセット
    LocationList(u64),
    /// このモデルでは扱わない値
    Other,
}

impl AttrValue {
    /// 非負の定数として取得する
    pub fn as_udata(&self) -> Option<u64> {
        match *self {
            AttrValue::Udata(v) => Some(v),
            AttrValue::Sdata(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    /// 配列の添字境界として取得する
    ///
    /// 符号なしの値は2の補数として読むので、全ビットが立った上限は -1 になる。
    pub fn as_bound(&self) -> Option<i64> {
        match *self {
            AttrValue::Udata(v) => Some(v as i64),
            AttrValue::Sdata(v) => Some(v),
            _ => None,
        }
    }

    /// 参照として取得する
    pub fn as_ref_offset(&self) -> Option<EntryOffset> {
        match *self {
            AttrValue::Ref(offset) => Some(offset),
            _ => None,
        }
    }

    /// 文字列として取得する
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AttrValue::String(s) => write!(f, "{:?}", s),
            AttrValue::Udata(v) => write!(f, "{}", v),
            AttrValue::Sdata(v) => write!(f, "{}", v),
            AttrValue::Flag(b) => write!(f, "{}", b),
            AttrValue::Ref(offset) => write!(f, "{}", offset),
            AttrValue::Expr(bytes) => {
                write!(f, "[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "]")
            }
            AttrValue::LocationList(offset) => write!(f, "loclist@0x{:x}", offset),
            AttrValue::Other => write!(f, "<other>"),
        }
    }
}

/// デバッグ情報エントリ（DIE）
#[derive(Debug, Clone)]
pub struct Entry {
    offset: EntryOffset,
    kind: EntryKind,
    attrs: BTreeMap<gimli::DwAt, AttrValue>,
    children: Vec<EntryOffset>,
    unit: UnitId,
}

impl Entry {
    pub(crate) fn new(
        offset: EntryOffset,
        kind: EntryKind,
        attrs: BTreeMap<gimli::DwAt, AttrValue>,
        unit: UnitId,
    ) -> Self {
        Self {
            offset,
            kind,
            attrs,
            children: Vec::new(),
            unit,
        }
    }

    pub(crate) fn push_child(&mut self, child: EntryOffset) {
        self.children.push(child);
    }

    pub(crate) fn set_attr(&mut self, name: gimli::DwAt, value: AttrValue) {
        self.attrs.insert(name, value);
    }

    pub fn offset(&self) -> EntryOffset {
        self.offset
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// 所属するコンパイルユニット
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// 子エントリのオフセット（格納順）
    pub fn children(&self) -> &[EntryOffset] {
        &self.children
    }

    pub fn attr(&self, name: gimli::DwAt) -> Option<&AttrValue> {
        self.attrs.get(&name)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (gimli::DwAt, &AttrValue)> {
        self.attrs.iter().map(|(name, value)| (*name, value))
    }

    /// DW_AT_name
    pub fn name(&self) -> Option<&str> {
        self.attr(gimli::DW_AT_name).and_then(AttrValue::as_str)
    }

    /// DW_AT_type の参照先
    pub fn type_ref(&self) -> Option<EntryOffset> {
        self.attr(gimli::DW_AT_type).and_then(AttrValue::as_ref_offset)
    }

    /// DW_AT_abstract_origin の参照先
    pub fn abstract_origin(&self) -> Option<EntryOffset> {
        self.attr(gimli::DW_AT_abstract_origin)
            .and_then(AttrValue::as_ref_offset)
    }

    /// DW_AT_byte_size
    pub fn byte_size(&self) -> Option<u64> {
        self.attr(gimli::DW_AT_byte_size).and_then(AttrValue::as_udata)
    }

    /// 配列次元（subrange）の要素数
    ///
    /// DW_AT_count を優先し、なければ DW_AT_upper_bound と DW_AT_lower_bound から求める。
    /// 長さ0の配列（GCCは上限を -1 として出力する）は 0 になる。
    pub fn element_count(&self) -> Option<u64> {
        if let Some(count) = self.attr(gimli::DW_AT_count) {
            return count.as_udata();
        }

        let upper = self.attr(gimli::DW_AT_upper_bound)?.as_bound()?;
        let lower = match self.attr(gimli::DW_AT_lower_bound) {
            Some(value) => value.as_bound()?,
            None => 0,
        };
        let count = upper.checked_sub(lower)?.checked_add(1)?;
        u64::try_from(count).ok()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DIE {}, offset={}, unit={}", self.kind, self.offset, self.unit.0)?;
        for (name, value) in &self.attrs {
            write!(f, "\n  {}: {}", name, value)?;
        }
        Ok(())
    }
}

/// コンパイルユニット
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    id: UnitId,
    offset: u64,
    encoding: gimli::Encoding,
    entries: Range<usize>,
}

impl CompilationUnit {
    pub(crate) fn new(id: UnitId, offset: u64, encoding: gimli::Encoding, start: usize) -> Self {
        Self {
            id,
            offset,
            encoding,
            entries: start..start,
        }
    }

    pub(crate) fn set_end(&mut self, end: usize) {
        self.entries.end = end;
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    /// ユニットヘッダのセクションオフセット
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// DWARFバージョン
    pub fn version(&self) -> u16 {
        self.encoding.version
    }

    /// ターゲットのアドレスサイズ（バイト）
    pub fn address_size(&self) -> u8 {
        self.encoding.address_size
    }

    pub fn encoding(&self) -> gimli::Encoding {
        self.encoding
    }

    /// `DebugInfo::entries` 内でこのユニットが占める範囲
    pub fn entry_range(&self) -> Range<usize> {
        self.entries.clone()
    }
}

/// 読み込み済みのデバッグ情報全体
#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub(crate) arch: Arch,
    pub(crate) endian: gimli::RunTimeEndian,
    pub(crate) units: Vec<CompilationUnit>,
    pub(crate) entries: Vec<Entry>,
}

impl DebugInfo {
    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn endian(&self) -> gimli::RunTimeEndian {
        self.endian
    }

    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> Option<&CompilationUnit> {
        self.units.get(id.0)
    }

    /// 全ユニットのエントリを前順で連結した列
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// 指定ユニットのエントリ列
    pub fn unit_entries(&self, unit: &CompilationUnit) -> &[Entry] {
        &self.entries[unit.entry_range()]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
