//! ロケーション属性のサブパーサー
//!
//! DW_AT_location の生バイト列を、gimliでオペレーション列にデコードします。
//! ロケーションリストは識別するだけで展開しません。

use crate::entry::{AttrValue, DebugInfo, Entry};
use crate::Result;

/// ロケーション属性の内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationExpr {
    /// 単一のロケーション式
    Single(Vec<ExprOp>),
    /// PC範囲ごとのロケーションリスト（セクションオフセット）
    List(u64),
}

/// ロケーション式のオペレーション
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprOp {
    /// DW_OP_bregN / DW_OP_bregx: レジスタ + オフセット
    RegisterOffset { register: u16, offset: i64 },
    /// DW_OP_fbreg: フレームベース + オフセット
    FrameOffset { offset: i64 },
    /// DW_OP_regN / DW_OP_regx: 値がレジスタにある
    Register { register: u16 },
    /// DW_OP_addr: 静的アドレス
    Address { address: u64 },
    /// 上記以外
    Other(String),
}

impl<R: gimli::Reader> From<gimli::Operation<R>> for ExprOp {
    fn from(op: gimli::Operation<R>) -> Self {
        match op {
            gimli::Operation::RegisterOffset {
                register, offset, ..
            } => ExprOp::RegisterOffset {
                register: register.0,
                offset,
            },
            gimli::Operation::FrameOffset { offset } => ExprOp::FrameOffset { offset },
            gimli::Operation::Register { register } => ExprOp::Register {
                register: register.0,
            },
            gimli::Operation::Address { address } => ExprOp::Address { address },
            other => ExprOp::Other(format!("{:?}", other)),
        }
    }
}

/// エントリの DW_AT_location をデコードする
///
/// # Returns
/// 属性がなければ `None`
pub fn parse_location(info: &DebugInfo, entry: &Entry) -> Result<Option<LocationExpr>> {
    let bytes = match entry.attr(gimli::DW_AT_location) {
        None => return Ok(None),
        Some(AttrValue::LocationList(offset)) => return Ok(Some(LocationExpr::List(*offset))),
        Some(AttrValue::Expr(bytes)) => bytes,
        Some(other) => {
            return Err(anyhow::anyhow!(
                "Unexpected location form {} at {}",
                other,
                entry.offset()
            ))
        }
    };

    let unit = info
        .unit(entry.unit())
        .ok_or_else(|| anyhow::anyhow!("Entry {} has no owning unit", entry.offset()))?;

    let expr = gimli::Expression(gimli::EndianSlice::new(bytes, info.endian()));
    let mut operations = expr.operations(unit.encoding());
    let mut ops = Vec::new();
    while let Some(op) = operations.next()? {
        ops.push(ExprOp::from(op));
    }

    Ok(Some(LocationExpr::Single(ops)))
}
