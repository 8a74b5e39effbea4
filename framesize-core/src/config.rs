//! スキャン設定

/// スキャン設定
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// インライン展開された関数を辿る最大深さ
    pub max_inline_depth: usize,
    /// 型参照・abstract origin の連鎖を辿る最大深さ
    pub max_type_depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_inline_depth: 32,
            max_type_depth: 64,
        }
    }
}
