// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for superblock interpretation.
pub type FfsResult<T = ()> = core::result::Result<T, FfsError>;

/// Errors raised while turning a superblock dump into usable layout parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfsError {
    /// A leaf field the translator depends on is absent from the dump.
    MissingField(&'static str),
    /// The field exists but holds a value of another shape (string vs integer).
    WrongType(&'static str),
    /// The fragment arithmetic is only valid for a power-of-two fragment count.
    NotPowerOfTwo { field: &'static str, value: i64 },
    /// Negative, zero or oversized value for a field that cannot hold it.
    OutOfRange { field: &'static str, value: i64 },
}

impl FfsError {
    pub fn msg(&self) -> &'static str {
        match self {
            FfsError::MissingField(_) => "Missing superblock field",
            FfsError::WrongType(_) => "Unexpected superblock field type",
            FfsError::NotPowerOfTwo { .. } => "Superblock field is not a power of two",
            FfsError::OutOfRange { .. } => "Superblock field out of range",
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            FfsError::MissingField(field)
            | FfsError::WrongType(field)
            | FfsError::NotPowerOfTwo { field, .. }
            | FfsError::OutOfRange { field, .. } => field,
        }
    }
}

impl fmt::Display for FfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.msg(), self.field())?;
        match self {
            FfsError::NotPowerOfTwo { value, .. } | FfsError::OutOfRange { value, .. } => {
                write!(f, " (got {value})")
            }
            _ => Ok(()),
        }
    }
}

impl std::error::Error for FfsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_field_and_value() {
        let err = FfsError::NotPowerOfTwo {
            field: "frag",
            value: 6,
        };
        assert_eq!(
            err.to_string(),
            "Superblock field is not a power of two 'frag' (got 6)"
        );
        assert_eq!(
            FfsError::MissingField("fsmnt").to_string(),
            "Missing superblock field 'fsmnt'"
        );
    }
}
