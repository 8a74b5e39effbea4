//! 変数ロケーションのデコード
//!
//! 単一のロケーション式の先頭オペレーションだけを見て、
//! レジスタ相対（DW_OP_bregN / DW_OP_bregx）であれば `レジスタ+オフセット` に変換します。
//! ロケーションリストや複数箇所に分かれた変数は扱いません。

use framesize_dwarf::{parse_location, DebugInfo, Entry, ExprOp, LocationExpr};
use tracing::{debug, warn};

/// 変数の格納位置（レジスタ + バイトオフセット）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationDescriptor {
    /// 大文字のレジスタ名（例: `RBP`）
    pub register: String,
    pub offset: i64,
}

impl std::fmt::Display for LocationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}+{}", self.register, self.offset)
    }
}

/// ロケーションデコーダ
pub struct LocationDecoder<'a> {
    info: &'a DebugInfo,
}

impl<'a> LocationDecoder<'a> {
    pub fn new(info: &'a DebugInfo) -> Self {
        Self { info }
    }

    /// 変数エントリの格納位置をデコードする
    ///
    /// # Returns
    /// レジスタ相対に還元できない場合は `None`
    pub fn decode(&self, entry: &Entry) -> Option<LocationDescriptor> {
        let expr = match parse_location(self.info, entry) {
            Ok(Some(expr)) => expr,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to parse location of {}: {}", entry.offset(), e);
                return None;
            }
        };

        let ops = match expr {
            LocationExpr::Single(ops) => ops,
            LocationExpr::List(offset) => {
                debug!(
                    "Location list at 0x{:x} for {} is not supported",
                    offset,
                    entry.offset()
                );
                return None;
            }
        };

        // TODO: 複数のオペレーションからなる式（レジスタとスタックに分割された変数など）
        match ops.first() {
            Some(ExprOp::RegisterOffset { register, offset }) => Some(LocationDescriptor {
                register: self.info.arch().register_name(*register),
                offset: *offset,
            }),
            Some(op) => {
                debug!("Location of {} is not register-relative: {:?}", entry.offset(), op);
                None
            }
            None => None,
        }
    }
}
