/// How a sequence or tile is accessed for the duration of an open or lock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RwMode {
    ReadOnly,
    /// Existing content is kept and may be modified.
    ReadWrite,
    /// The caller writes every element; initial content is unspecified.
    WriteOnlyAll,
    /// Content starts out zeroed.
    WriteOnlyMustZero,
    /// Only validate that the backing store exists and matches.
    CheckOnly,
}

impl RwMode {
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            RwMode::ReadWrite | RwMode::WriteOnlyAll | RwMode::WriteOnlyMustZero
        )
    }

    /// Existing content must be visible after opening.
    pub fn keeps_content(self) -> bool {
        matches!(self, RwMode::ReadOnly | RwMode::ReadWrite | RwMode::CheckOnly)
    }

    pub fn must_zero(self) -> bool {
        self == RwMode::WriteOnlyMustZero
    }

    /// Growth during this access must zero the new elements.
    pub fn must_clear(self) -> bool {
        self != RwMode::WriteOnlyAll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_capabilities() {
        assert!(!RwMode::ReadOnly.is_writable());
        assert!(!RwMode::CheckOnly.is_writable());
        assert!(RwMode::WriteOnlyAll.is_writable());
        assert!(RwMode::ReadWrite.keeps_content());
        assert!(!RwMode::WriteOnlyMustZero.keeps_content());
        assert!(RwMode::WriteOnlyMustZero.must_zero());
        assert!(!RwMode::WriteOnlyAll.must_clear());
        assert!(RwMode::ReadWrite.must_clear());
    }
}
