use std::fmt;

/// Closed set of element types a tiled array can hold.
///
/// The discriminant doubles as the on-disk tag in tile file headers, so
/// existing values must never be renumbered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ValueClass {
    Bool = 1,
    UInt2 = 2,
    UInt4 = 3,
    UInt8 = 4,
    Int8 = 5,
    UInt16 = 6,
    Int16 = 7,
    UInt32 = 8,
    Int32 = 9,
    UInt64 = 10,
    Int64 = 11,
    Float32 = 12,
    Float64 = 13,
}

impl ValueClass {
    pub const ALL: [ValueClass; 13] = [
        ValueClass::Bool,
        ValueClass::UInt2,
        ValueClass::UInt4,
        ValueClass::UInt8,
        ValueClass::Int8,
        ValueClass::UInt16,
        ValueClass::Int16,
        ValueClass::UInt32,
        ValueClass::Int32,
        ValueClass::UInt64,
        ValueClass::Int64,
        ValueClass::Float32,
        ValueClass::Float64,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.tag() == tag)
    }

    pub fn bit_width(self) -> u32 {
        match self {
            ValueClass::Bool => 1,
            ValueClass::UInt2 => 2,
            ValueClass::UInt4 => 4,
            ValueClass::UInt8 | ValueClass::Int8 => 8,
            ValueClass::UInt16 | ValueClass::Int16 => 16,
            ValueClass::UInt32 | ValueClass::Int32 | ValueClass::Float32 => 32,
            ValueClass::UInt64 | ValueClass::Int64 | ValueClass::Float64 => 64,
        }
    }

    /// Sub-byte classes are stored packed into 32-bit words.
    pub fn is_bit_packed(self) -> bool {
        self.bit_width() < 8
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueClass::Bool => "bool",
            ValueClass::UInt2 => "uint2",
            ValueClass::UInt4 => "uint4",
            ValueClass::UInt8 => "uint8",
            ValueClass::Int8 => "int8",
            ValueClass::UInt16 => "uint16",
            ValueClass::Int16 => "int16",
            ValueClass::UInt32 => "uint32",
            ValueClass::Int32 => "int32",
            ValueClass::UInt64 => "uint64",
            ValueClass::Int64 => "int64",
            ValueClass::Float32 => "float32",
            ValueClass::Float64 => "float64",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.iter().copied().find(|c| c.name() == s)
    }
}

impl fmt::Display for ValueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
