#![forbid(unsafe_code)]

/// An SSA operand together with its LLVM type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Value {
    pub ty: String,
    pub repr: String,
}

impl Value {
    pub fn new(ty: impl Into<String>, repr: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            repr: repr.into(),
        }
    }

    /// Result of an expression of type `Nothing`.
    pub fn void() -> Self {
        Self::new("void", "")
    }

    pub fn is_void(&self) -> bool {
        self.ty == "void"
    }

    /// `ty repr`, as written in operand lists.
    pub fn typed(&self) -> String {
        format!("{} {}", self.ty, self.repr)
    }
}

/// Global symbol for `name`, quoted when it is not a bare identifier.
pub fn llvm_ident(name: &str) -> String {
    let bare = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if bare {
        format!("@{name}")
    } else {
        let escaped: String = name
            .chars()
            .map(|c| match c {
                '"' | '\\' => format!("\\{:02X}", c as u32),
                c => c.to_string(),
            })
            .collect();
        format!("@\"{escaped}\"")
    }
}

/// LLVM accepts any double written as its bit pattern in hex.
pub fn real_literal(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}
