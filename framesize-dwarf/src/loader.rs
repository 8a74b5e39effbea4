//! ELFとDWARFの読み込み機能

use crate::entry::{AttrValue, DebugInfo, EntryKind, EntryOffset};
use crate::{Arch, DebugInfoBuilder};
use gimli::Reader;
use object::{Object, ObjectSection};
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::debug;

/// 読み込みエラー
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// ファイルを読み込めなかった
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// コンテナ（ELF等）として解析できなかった
    #[error("failed to parse elf: {0}")]
    Container(#[from] object::Error),
    /// デバッグ情報がない
    #[error("No dwarf info found in {0}")]
    MissingDebugInfo(String),
    /// DWARFセクションの解析に失敗した
    #[error("failed to parse dwarf: {0}")]
    Dwarf(#[from] gimli::Error),
    /// グラフの構築に失敗した
    #[error("malformed debug info: {0}")]
    Graph(anyhow::Error),
}

/// DWARFローダー
pub struct DwarfLoader {
    /// 表示用の名前（通常はファイルパス）
    name: String,
    /// ファイルの内容
    data: Vec<u8>,
}

impl DwarfLoader {
    /// ファイルを読み込む
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self::from_bytes(path.display().to_string(), data))
    }

    /// メモリ上のバイト列から作成する
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// デバッグ情報を含むか判定する
    pub fn has_debug_info(&self) -> Result<bool, LoadError> {
        let object_file = object::File::parse(&*self.data)?;
        Ok(has_debug_info(&object_file))
    }

    /// コンテナを解析し、エントリグラフを構築する
    pub fn load(&self) -> Result<DebugInfo, LoadError> {
        let object_file = object::File::parse(&*self.data)?;
        if !has_debug_info(&object_file) {
            return Err(LoadError::MissingDebugInfo(self.name.clone()));
        }

        // エンディアンを取得
        let endian = if object_file.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        // DWARFセクションを読み込む（圧縮セクションは展開する）
        let load_section = |id: gimli::SectionId| -> Result<Cow<[u8]>, object::Error> {
            match object_file.section_by_name(id.name()) {
                Some(section) => section.uncompressed_data(),
                None => Ok(Cow::Borrowed(&[][..])),
            }
        };
        let sections = gimli::Dwarf::load(load_section)?;
        let dwarf = sections.borrow(|section| gimli::EndianSlice::new(section, endian));

        let arch = Arch::from_object(object_file.architecture());
        debug!("Loading DWARF from {} (arch={})", self.name, arch);

        let mut builder = DebugInfoBuilder::new(arch).with_endian(endian);
        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            read_unit(&dwarf, &unit, &mut builder)?;
        }

        let info = builder.finish();
        debug!(
            "Loaded {} units, {} entries",
            info.units().len(),
            info.entries().len()
        );
        Ok(info)
    }
}

/// 空でない .debug_info セクションがあるか
fn has_debug_info(object_file: &object::File) -> bool {
    object_file
        .section_by_name(".debug_info")
        .map_or(false, |section| section.size() > 0)
}

/// ユニット内の全エントリを深さ優先でグラフに追加する
fn read_unit<R: Reader<Offset = usize>>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    builder: &mut DebugInfoBuilder,
) -> Result<(), LoadError> {
    let unit_offset = match unit.header.offset().as_debug_info_offset() {
        Some(offset) => offset.0 as u64,
        // .debug_types のユニットは対象外
        None => return Ok(()),
    };
    builder.begin_unit_at(unit_offset, unit.encoding());

    let mut depth: isize = 0;
    let mut entries = unit.entries();
    while let Some((delta, entry)) = entries.next_dfs()? {
        depth += delta;
        while builder.depth() > depth.max(0) as usize {
            builder.close();
        }

        let offset = match entry.offset().to_debug_info_offset(&unit.header) {
            Some(offset) => EntryOffset(offset.0 as u64),
            None => continue,
        };

        let mut attrs = Vec::new();
        let mut iter = entry.attrs();
        while let Some(attr) = iter.next()? {
            attrs.push((attr.name(), convert_attr(dwarf, unit, &attr)?));
        }

        builder
            .open_at(offset, EntryKind::from_tag(entry.tag()), attrs)
            .map_err(LoadError::Graph)?;
    }

    builder.end_unit();
    Ok(())
}

/// gimliの属性値をモデルの属性値に変換する
fn convert_attr<R: Reader<Offset = usize>>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    attr: &gimli::Attribute<R>,
) -> Result<AttrValue, LoadError> {
    use gimli::AttributeValue;

    let value = match attr.value() {
        AttributeValue::UnitRef(offset) => match offset.to_debug_info_offset(&unit.header) {
            Some(offset) => AttrValue::Ref(EntryOffset(offset.0 as u64)),
            None => AttrValue::Other,
        },
        AttributeValue::DebugInfoRef(offset) => AttrValue::Ref(EntryOffset(offset.0 as u64)),
        AttributeValue::Udata(v) => AttrValue::Udata(v),
        AttributeValue::Data1(v) => data_value(attr.name(), v.into(), v == u8::MAX),
        AttributeValue::Data2(v) => data_value(attr.name(), v.into(), v == u16::MAX),
        AttributeValue::Data4(v) => data_value(attr.name(), v.into(), v == u32::MAX),
        AttributeValue::Data8(v) => data_value(attr.name(), v, v == u64::MAX),
        AttributeValue::Sdata(v) => AttrValue::Sdata(v),
        AttributeValue::Flag(v) => AttrValue::Flag(v),
        AttributeValue::Exprloc(expr) => AttrValue::Expr(expr.0.to_slice()?.into_owned()),
        AttributeValue::Block(data) if attr.name() == gimli::DW_AT_location => {
            AttrValue::Expr(data.to_slice()?.into_owned())
        }
        AttributeValue::LocationListsRef(offset) => AttrValue::LocationList(offset.0 as u64),
        AttributeValue::DebugLocListsIndex(index) => {
            let offset = dwarf.locations_offset(unit, index)?;
            AttrValue::LocationList(offset.0 as u64)
        }
        value @ (AttributeValue::String(_)
        | AttributeValue::DebugStrRef(_)
        | AttributeValue::DebugStrRefSup(_)
        | AttributeValue::DebugLineStrRef(_)
        | AttributeValue::DebugStrOffsetsIndex(_)) => {
            let s = dwarf.attr_string(unit, value)?;
            AttrValue::String(s.to_string_lossy()?.into_owned())
        }
        _ => AttrValue::Other,
    };

    Ok(value)
}

/// 固定長データ形式の定数
///
/// 添字境界では、形式の幅いっぱいに立った値を -1 として扱う。
fn data_value(name: gimli::DwAt, value: u64, all_ones: bool) -> AttrValue {
    let is_bound = name == gimli::DW_AT_upper_bound || name == gimli::DW_AT_lower_bound;
    if is_bound && all_ones {
        AttrValue::Sdata(-1)
    } else {
        AttrValue::Udata(value)
    }
}
