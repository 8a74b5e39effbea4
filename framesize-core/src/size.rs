//! 型のバイトサイズ計算

use crate::types::array_dimensions;
use crate::DebugInfoIndex;
use framesize_dwarf::{Entry, EntryKind};
use tracing::warn;

/// バイトサイズ計算器
pub struct SizeCalculator<'a> {
    index: &'a DebugInfoIndex<'a>,
    max_depth: usize,
}

impl<'a> SizeCalculator<'a> {
    pub fn new(index: &'a DebugInfoIndex<'a>, max_depth: usize) -> Self {
        Self { index, max_depth }
    }

    /// 型エントリのバイトサイズを計算する
    ///
    /// 優先順位:
    /// 1. DW_AT_byte_size があればその値
    /// 2. ポインタはユニットのアドレスサイズ
    /// 3. typedef / const は参照先のサイズ
    /// 4. 配列は要素サイズ × 要素数（要素数が不明なら 0）
    /// 5. それ以外は 0
    pub fn byte_size(&self, entry: &Entry) -> u64 {
        self.size(entry, 0)
    }

    fn size(&self, entry: &Entry, depth: usize) -> u64 {
        if let Some(size) = entry.byte_size() {
            return size;
        }
        if depth > self.max_depth {
            warn!(
                "Type chain deeper than {} at {}, assuming size 0",
                self.max_depth,
                entry.offset()
            );
            return 0;
        }

        match entry.kind() {
            EntryKind::Pointer => self.index.address_size(entry).map_or(0, u64::from),
            EntryKind::Typedef | EntryKind::Const => self
                .referenced(entry)
                .map_or(0, |target| self.size(target, depth + 1)),
            EntryKind::Array => {
                let count = match element_count(self.index, entry) {
                    Some(count) => count,
                    None => return 0,
                };
                let element_size = self
                    .referenced(entry)
                    .map_or(0, |element| self.size(element, depth + 1));
                element_size.saturating_mul(count)
            }
            _ => 0,
        }
    }

    fn referenced(&self, entry: &Entry) -> Option<&'a Entry> {
        entry.type_ref().and_then(|offset| self.index.lookup(offset))
    }
}

/// 配列の総要素数（全次元の積）
fn element_count(index: &DebugInfoIndex, array: &Entry) -> Option<u64> {
    let dimensions = array_dimensions(index, array);
    if dimensions.is_empty() {
        return None;
    }
    dimensions
        .into_iter()
        .try_fold(1u64, |total, count| count.map(|n| total.saturating_mul(n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesize_dwarf::builder::{byte_size, count, name, type_ref};
    use framesize_dwarf::{Arch, AttrValue, DebugInfo, DebugInfoBuilder, EntryOffset};

    fn size_of(info: &DebugInfo, offset: EntryOffset) -> u64 {
        let index = DebugInfoIndex::new(info);
        SizeCalculator::new(&index, 64).byte_size(index.lookup(offset).unwrap())
    }

    fn builder(address_size: u8) -> DebugInfoBuilder {
        let mut builder = DebugInfoBuilder::new(Arch::Unknown);
        builder.begin_unit(4, address_size);
        builder
    }

    fn array(
        builder: &mut DebugInfoBuilder,
        element: EntryOffset,
        counts: &[Option<u64>],
    ) -> EntryOffset {
        let array = builder.open(EntryKind::Array, [type_ref(element)]).unwrap();
        for c in counts {
            builder
                .leaf(EntryKind::Subrange, c.map(count).into_iter().collect::<Vec<_>>())
                .unwrap();
        }
        builder.close();
        array
    }

    #[test]
    fn test_explicit_byte_size_wins() {
        let mut b = builder(8);
        let s = b.leaf(EntryKind::Struct, [name("S"), byte_size(24)]).unwrap();
        let ptr = b.leaf(EntryKind::Pointer, [byte_size(4)]).unwrap();
        let arr = b.open(EntryKind::Array, [byte_size(12)]).unwrap();
        b.close();
        let info = b.finish();

        assert_eq!(size_of(&info, s), 24);
        assert_eq!(size_of(&info, ptr), 4);
        assert_eq!(size_of(&info, arr), 12);
    }

    #[test]
    fn test_pointer_uses_address_size() {
        let mut b = builder(8);
        let resolved = b.leaf(EntryKind::Pointer, []).unwrap();
        let dangling = b.leaf(EntryKind::Pointer, [type_ref(EntryOffset(0xffff_0000))]).unwrap();
        b.begin_unit(4, 4);
        let narrow = b.leaf(EntryKind::Pointer, []).unwrap();
        let info = b.finish();

        assert_eq!(size_of(&info, resolved), 8);
        assert_eq!(size_of(&info, dangling), 8);
        assert_eq!(size_of(&info, narrow), 4);
    }

    #[test]
    fn test_typedef_and_const_follow_reference() {
        let mut b = builder(8);
        let long = b.leaf(EntryKind::BaseType, [name("long"), byte_size(8)]).unwrap();
        let td = b.leaf(EntryKind::Typedef, [name("off_t"), type_ref(long)]).unwrap();
        let c = b.leaf(EntryKind::Const, [type_ref(td)]).unwrap();
        let const_void = b.leaf(EntryKind::Const, []).unwrap();
        let info = b.finish();

        assert_eq!(size_of(&info, td), 8);
        assert_eq!(size_of(&info, c), 8);
        assert_eq!(size_of(&info, const_void), 0);
    }

    #[test]
    fn test_array_sizes() {
        let mut b = builder(8);
        let int = b.leaf(EntryKind::BaseType, [name("int"), byte_size(4)]).unwrap();
        let ptr = b.leaf(EntryKind::Pointer, [type_ref(int)]).unwrap();
        let ints = array(&mut b, int, &[Some(10)]);
        let ptrs = array(&mut b, ptr, &[Some(3)]);
        let matrix = array(&mut b, int, &[Some(4), Some(5)]);
        let unknown = array(&mut b, int, &[None]);
        let partly_unknown = array(&mut b, int, &[Some(2), None]);
        let no_subrange = array(&mut b, int, &[]);
        let info = b.finish();

        assert_eq!(size_of(&info, ints), 40);
        assert_eq!(size_of(&info, ptrs), 24);
        assert_eq!(size_of(&info, matrix), 80);
        assert_eq!(size_of(&info, unknown), 0);
        assert_eq!(size_of(&info, partly_unknown), 0);
        assert_eq!(size_of(&info, no_subrange), 0);
    }

    #[test]
    fn test_zero_length_array() {
        // GCC は u8 data[0] の上限を全ビット1で出力する
        let mut b = builder(8);
        let u8_ty = b.leaf(EntryKind::BaseType, [name("u8"), byte_size(1)]).unwrap();
        let data = b.open(EntryKind::Array, [type_ref(u8_ty)]).unwrap();
        b.leaf(
            EntryKind::Subrange,
            [(gimli::DW_AT_upper_bound, AttrValue::Udata(u64::MAX))],
        )
        .unwrap();
        b.close();
        let info = b.finish();

        assert_eq!(size_of(&info, data), 0);

        let index = DebugInfoIndex::new(&info);
        let array = index.lookup(data).unwrap();
        assert_eq!(
            crate::TypeResolver::new(&index, 64).type_string(array).as_deref(),
            Some("u8[0]")
        );
    }

    #[test]
    fn test_defaults_to_zero() {
        let mut b = builder(8);
        let base = b.leaf(EntryKind::BaseType, [name("int")]).unwrap();
        let s = b.leaf(EntryKind::Struct, [name("Incomplete")]).unwrap();
        let other = b
            .leaf(EntryKind::Other(gimli::DW_TAG_subroutine_type), [])
            .unwrap();
        let info = b.finish();

        assert_eq!(size_of(&info, base), 0);
        assert_eq!(size_of(&info, s), 0);
        assert_eq!(size_of(&info, other), 0);
    }

    #[test]
    fn test_cyclic_typedef_terminates() {
        let mut b = builder(8);
        let td = b.leaf(EntryKind::Typedef, [name("loop")]).unwrap();
        b.set_attr(td, gimli::DW_AT_type, framesize_dwarf::AttrValue::Ref(td))
            .unwrap();
        let info = b.finish();

        assert_eq!(size_of(&info, td), 0);
    }
}
