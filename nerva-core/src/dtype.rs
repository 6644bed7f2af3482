/// DType of a variable or value
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum DType {
    /// 32 bit floating point type
    F32,
    /// 64 bit floating point type
    F64,
    /// 32 bit integer type
    I32,
}

impl DType {
    /// Get the size of DType in bytes
    pub fn byte_size(self) -> usize {
        match self {
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Check if self is floating point dtype
    pub fn is_floating(self) -> bool {
        match self {
            Self::F32 | Self::F64 => true,
            Self::I32 => false,
        }
    }

    pub(crate) fn tag(self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F64 => "F64",
            Self::I32 => "I32",
        }
    }

    pub(crate) fn from_tag(tag: &str) -> Result<Self, crate::error::NervaError> {
        match tag {
            "F32" => Ok(Self::F32),
            "F64" => Ok(Self::F64),
            "I32" => Ok(Self::I32),
            _ => Err(crate::error::NervaError::MalformedDictionary(format!(
                "unknown dtype tag {tag}"
            ))),
        }
    }
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        f.write_fmt(format_args!("{self:?}"))
    }
}
