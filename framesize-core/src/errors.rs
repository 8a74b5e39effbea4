//! スキャンのエラー

/// スキャンのエラー
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 指定された名前の関数がデバッグ情報にない
    #[error("Function '{0}' not found in debug info")]
    FunctionNotFound(String),
}
