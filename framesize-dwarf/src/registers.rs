//! ターゲットアーキテクチャとDWARFレジスタ名

/// ターゲットアーキテクチャ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Aarch64,
    RiscV,
    /// レジスタ名を解決できないアーキテクチャ
    #[default]
    Unknown,
}

impl Arch {
    /// objectクレートのアーキテクチャから変換する
    pub fn from_object(arch: object::Architecture) -> Self {
        use object::Architecture;

        match arch {
            Architecture::I386 => Arch::X86,
            Architecture::X86_64 | Architecture::X86_64_X32 => Arch::X86_64,
            Architecture::Arm => Arch::Arm,
            Architecture::Aarch64 | Architecture::Aarch64_Ilp32 => Arch::Aarch64,
            Architecture::Riscv32 | Architecture::Riscv64 => Arch::RiscV,
            _ => Arch::Unknown,
        }
    }

    /// DWARFレジスタ番号から大文字のレジスタ名を取得する
    ///
    /// 名前が分からない場合は `R<番号>` を返す。
    pub fn register_name(self, register: u16) -> String {
        let reg = gimli::Register(register);
        let name = match self {
            Arch::X86 => gimli::X86::register_name(reg),
            Arch::X86_64 => gimli::X86_64::register_name(reg),
            Arch::Arm => gimli::Arm::register_name(reg),
            Arch::Aarch64 => gimli::AArch64::register_name(reg),
            Arch::RiscV => gimli::RiscV::register_name(reg),
            Arch::Unknown => None,
        };

        match name {
            Some(name) => name.to_uppercase(),
            None => format!("R{}", register),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
            Arch::RiscV => "riscv",
            Arch::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}
