//! C言語風の型名の再構築
//!
//! ポインタ・配列・const・typedef・構造体・共用体・列挙型の連鎖を辿り、
//! `const char*` や `struct S[4]` のような型名を組み立てます。

use crate::{DebugInfoIndex, ANONYMOUS};
use framesize_dwarf::{Entry, EntryKind};
use std::fmt::Write;
use tracing::warn;

/// 型名リゾルバ
pub struct TypeResolver<'a> {
    index: &'a DebugInfoIndex<'a>,
    max_depth: usize,
}

impl<'a> TypeResolver<'a> {
    pub fn new(index: &'a DebugInfoIndex<'a>, max_depth: usize) -> Self {
        Self { index, max_depth }
    }

    /// 型エントリの型名を取得する
    ///
    /// # Returns
    /// 扱えない種別を含む場合は `None`（診断を出力する）
    pub fn type_string(&self, entry: &Entry) -> Option<String> {
        self.resolve(entry, 0)
    }

    fn resolve(&self, entry: &Entry, depth: usize) -> Option<String> {
        if depth > self.max_depth {
            warn!(
                "Type chain deeper than {} at {}, giving up",
                self.max_depth,
                entry.offset()
            );
            return None;
        }

        match entry.kind() {
            EntryKind::Pointer => match self.referenced(entry) {
                Some(pointee) => self.resolve(pointee, depth + 1).map(|s| s + "*"),
                None => Some("void*".to_string()),
            },
            EntryKind::Array => {
                let element = match self.referenced(entry) {
                    Some(element) => element,
                    None => {
                        warn!("Array without element type: {}", entry);
                        return None;
                    }
                };
                let mut s = self.resolve(element, depth + 1)?;
                let dimensions = array_dimensions(self.index, entry);
                if dimensions.is_empty() {
                    s.push_str("[]");
                }
                for count in dimensions {
                    match count {
                        Some(n) => {
                            let _ = write!(s, "[{}]", n);
                        }
                        None => s.push_str("[]"),
                    }
                }
                Some(s)
            }
            EntryKind::Const => match self.referenced(entry) {
                Some(target) => self.resolve(target, depth + 1).map(|s| format!("const {}", s)),
                None => {
                    warn!("broken DIE: {}", entry);
                    Some(String::new())
                }
            },
            EntryKind::Struct => Some(format!("struct {}", display_name(entry))),
            EntryKind::Union => Some(format!("union {}", display_name(entry))),
            EntryKind::Enum => Some(format!("enum {}", display_name(entry))),
            EntryKind::BaseType | EntryKind::Typedef => Some(display_name(entry).to_string()),
            EntryKind::Function
            | EntryKind::Variable
            | EntryKind::InlinedCall
            | EntryKind::Subrange
            | EntryKind::Other(_) => {
                warn!("Unsupported type info for {}, implement me!\n{}", entry.kind(), entry);
                None
            }
        }
    }

    /// DW_AT_type の参照先（存在しないオフセットは None）
    fn referenced(&self, entry: &Entry) -> Option<&'a Entry> {
        entry.type_ref().and_then(|offset| self.index.lookup(offset))
    }
}

/// エントリの名前（なければ `{anonymous}`）
pub(crate) fn display_name(entry: &Entry) -> &str {
    entry.name().unwrap_or(ANONYMOUS)
}

/// 配列の各次元の要素数（subrangeの子エントリ順、不明な次元は None）
pub(crate) fn array_dimensions(index: &DebugInfoIndex, array: &Entry) -> Vec<Option<u64>> {
    array
        .children()
        .iter()
        .filter_map(|offset| index.lookup(*offset))
        .filter(|child| child.kind() == EntryKind::Subrange)
        .map(Entry::element_count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesize_dwarf::builder::{byte_size, count, name, type_ref};
    use framesize_dwarf::{Arch, DebugInfo, DebugInfoBuilder, EntryOffset};

    /// 型エントリを1つずつ追加していくテスト用グラフ
    struct Graph {
        builder: DebugInfoBuilder,
    }

    impl Graph {
        fn new() -> Self {
            let mut builder = DebugInfoBuilder::new(Arch::Unknown);
            builder.begin_unit(4, 8);
            Self { builder }
        }

        fn add(
            &mut self,
            kind: EntryKind,
            attrs: Vec<(gimli::DwAt, framesize_dwarf::AttrValue)>,
        ) -> EntryOffset {
            self.builder.leaf(kind, attrs).unwrap()
        }

        fn array(&mut self, element: EntryOffset, counts: &[Option<u64>]) -> EntryOffset {
            let array = self.builder.open(EntryKind::Array, [type_ref(element)]).unwrap();
            for c in counts {
                let attrs = c.map(count).into_iter().collect::<Vec<_>>();
                self.builder.leaf(EntryKind::Subrange, attrs).unwrap();
            }
            self.builder.close();
            array
        }

        fn finish(self) -> DebugInfo {
            self.builder.finish()
        }
    }

    fn type_string(info: &DebugInfo, offset: EntryOffset) -> Option<String> {
        let index = DebugInfoIndex::new(info);
        let resolver = TypeResolver::new(&index, 64);
        resolver.type_string(index.lookup(offset).unwrap())
    }

    #[test]
    fn test_named_types() {
        let mut g = Graph::new();
        let int = g.add(EntryKind::BaseType, vec![name("int"), byte_size(4)]);
        let s = g.add(EntryKind::Struct, vec![name("S")]);
        let u = g.add(EntryKind::Union, vec![name("U")]);
        let e = g.add(EntryKind::Enum, vec![name("E")]);
        let td = g.add(EntryKind::Typedef, vec![name("size_t"), type_ref(int)]);
        let info = g.finish();

        assert_eq!(type_string(&info, int).as_deref(), Some("int"));
        assert_eq!(type_string(&info, s).as_deref(), Some("struct S"));
        assert_eq!(type_string(&info, u).as_deref(), Some("union U"));
        assert_eq!(type_string(&info, e).as_deref(), Some("enum E"));
        assert_eq!(type_string(&info, td).as_deref(), Some("size_t"));
    }

    #[test]
    fn test_anonymous_aggregates() {
        let mut g = Graph::new();
        let s = g.add(EntryKind::Struct, vec![]);
        let u = g.add(EntryKind::Union, vec![]);
        let info = g.finish();

        assert_eq!(type_string(&info, s).as_deref(), Some("struct {anonymous}"));
        assert_eq!(type_string(&info, u).as_deref(), Some("union {anonymous}"));
    }

    #[test]
    fn test_pointers() {
        let mut g = Graph::new();
        let s = g.add(EntryKind::Struct, vec![name("S")]);
        let ptr_s = g.add(EntryKind::Pointer, vec![type_ref(s)]);
        let ptr_ptr = g.add(EntryKind::Pointer, vec![type_ref(ptr_s)]);
        let void_ptr = g.add(EntryKind::Pointer, vec![]);
        let dangling = g.add(EntryKind::Pointer, vec![type_ref(EntryOffset(0xffff_0000))]);
        let info = g.finish();

        assert_eq!(type_string(&info, ptr_s).as_deref(), Some("struct S*"));
        assert_eq!(type_string(&info, ptr_ptr).as_deref(), Some("struct S**"));
        assert_eq!(type_string(&info, void_ptr).as_deref(), Some("void*"));
        assert_eq!(type_string(&info, dangling).as_deref(), Some("void*"));
    }

    #[test]
    fn test_const_binds_to_pointee() {
        let mut g = Graph::new();
        let char_ty = g.add(EntryKind::BaseType, vec![name("char"), byte_size(1)]);
        let const_char = g.add(EntryKind::Const, vec![type_ref(char_ty)]);
        let ptr = g.add(EntryKind::Pointer, vec![type_ref(const_char)]);
        let const_ptr = g.add(EntryKind::Const, vec![type_ref(ptr)]);
        let info = g.finish();

        assert_eq!(type_string(&info, ptr).as_deref(), Some("const char*"));
        assert_eq!(type_string(&info, const_ptr).as_deref(), Some("const const char*"));
    }

    #[test]
    fn test_const_of_unresolvable_is_empty() {
        let mut g = Graph::new();
        let const_void = g.add(EntryKind::Const, vec![]);
        let broken = g.add(EntryKind::Const, vec![type_ref(EntryOffset(0xffff_0000))]);
        let info = g.finish();

        assert_eq!(type_string(&info, const_void).as_deref(), Some(""));
        assert_eq!(type_string(&info, broken).as_deref(), Some(""));
    }

    #[test]
    fn test_arrays() {
        let mut g = Graph::new();
        let int = g.add(EntryKind::BaseType, vec![name("int"), byte_size(4)]);
        let fixed = g.array(int, &[Some(16)]);
        let matrix = g.array(int, &[Some(2), Some(3)]);
        let flexible = g.array(int, &[None]);
        let no_subrange = g.array(int, &[]);
        let info = g.finish();

        assert_eq!(type_string(&info, fixed).as_deref(), Some("int[16]"));
        assert_eq!(type_string(&info, matrix).as_deref(), Some("int[2][3]"));
        assert_eq!(type_string(&info, flexible).as_deref(), Some("int[]"));
        assert_eq!(type_string(&info, no_subrange).as_deref(), Some("int[]"));
    }

    #[test]
    fn test_unsupported_kind_is_none() {
        let mut g = Graph::new();
        let func = g.add(EntryKind::Other(gimli::DW_TAG_subroutine_type), vec![]);
        let fn_ptr = g.add(EntryKind::Pointer, vec![type_ref(func)]);
        let volatile = g.add(EntryKind::Other(gimli::DW_TAG_volatile_type), vec![]);
        let info = g.finish();

        assert_eq!(type_string(&info, func), None);
        assert_eq!(type_string(&info, fn_ptr), None);
        assert_eq!(type_string(&info, volatile), None);
    }

    #[test]
    fn test_repeated_calls_are_stable() {
        let mut g = Graph::new();
        let s = g.add(EntryKind::Struct, vec![name("S")]);
        let ptr = g.add(EntryKind::Pointer, vec![type_ref(s)]);
        let arr = g.array(ptr, &[Some(4)]);
        let info = g.finish();

        let index = DebugInfoIndex::new(&info);
        let resolver = TypeResolver::new(&index, 64);
        let entry = index.lookup(arr).unwrap();
        let first = resolver.type_string(entry);
        assert_eq!(first.as_deref(), Some("struct S*[4]"));
        assert_eq!(resolver.type_string(entry), first);
    }

    #[test]
    fn test_cyclic_chain_terminates() {
        let mut g = Graph::new();
        let a = g.add(EntryKind::Typedef, vec![name("a")]);
        let ptr = g.add(EntryKind::Pointer, vec![type_ref(a)]);
        let cycle = g.add(EntryKind::Const, vec![]);
        g.builder
            .set_attr(cycle, gimli::DW_AT_type, framesize_dwarf::AttrValue::Ref(cycle))
            .unwrap();
        let info = g.finish();

        assert_eq!(type_string(&info, ptr).as_deref(), Some("a*"));
        assert_eq!(type_string(&info, cycle), None);
    }
}
