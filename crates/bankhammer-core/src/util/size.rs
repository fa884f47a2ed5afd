use std::str::FromStr;

use thiserror::Error;

/// Memory size representation supporting common units.
///
/// All units use binary (base-2) multipliers (1 KB = 1024 bytes).
///
/// # Examples
///
/// ```
/// use bankhammer_core::util::Size;
///
/// let size = Size::MB(4);
/// assert_eq!(size.bytes(), 4 * 1024 * 1024);
///
/// let parsed: Size = "2048M".parse().unwrap();
/// assert_eq!(parsed.bytes(), Size::GB(2).bytes());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Size {
    /// Size in bytes
    B(usize),
    /// Size in kilobytes (1 KB = 1024 bytes)
    KB(usize),
    /// Size in megabytes (1 MB = 1024 KB)
    MB(usize),
    /// Size in gigabytes (1 GB = 1024 MB)
    GB(usize),
}

impl Size {
    /// Converts this size to bytes.
    pub const fn bytes(&self) -> usize {
        match self {
            Size::B(bytes) => *bytes,
            Size::KB(kb) => *kb * (1 << 10),
            Size::MB(mb) => *mb * (1 << 20),
            Size::GB(gb) => *gb * (1 << 30),
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Size::B(bytes) => write!(f, "{} B", bytes),
            Size::KB(kb) => write!(f, "{} KB", kb),
            Size::MB(mb) => write!(f, "{} MB", mb),
            Size::GB(gb) => write!(f, "{} GB", gb),
        }
    }
}

/// Error returned when a size string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size '{0}', expected <number>[B|K|M|G]")]
pub struct ParseSizeError(String);

impl FromStr for Size {
    type Err = ParseSizeError;

    /// Parses sizes like `8192`, `64K`, `2048M` or `1G`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseSizeError(s.to_string());
        let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
            Some(idx) => s.split_at(idx),
            None => (s, ""),
        };
        let value = digits.parse::<usize>().map_err(|_| err())?;
        match unit.to_ascii_uppercase().as_str() {
            "" | "B" => Ok(Size::B(value)),
            "K" | "KB" => Ok(Size::KB(value)),
            "M" | "MB" => Ok(Size::MB(value)),
            "G" | "GB" => Ok(Size::GB(value)),
            _ => Err(err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::util::Size;

    #[test]
    fn size_conversions() {
        let bytes = Size::B(12);
        assert_eq!(bytes.bytes(), 12);
        let mb = Size::MB(12);
        assert_eq!(mb.bytes(), 12 * (1 << 20));
        let gb = Size::GB(12);
        assert_eq!(gb.bytes(), 12 * (1 << 30));
    }

    #[test]
    fn size_parse() {
        assert_eq!("8192".parse::<Size>(), Ok(Size::B(8192)));
        assert_eq!("64K".parse::<Size>(), Ok(Size::KB(64)));
        assert_eq!("2048m".parse::<Size>(), Ok(Size::MB(2048)));
        assert_eq!("1GB".parse::<Size>(), Ok(Size::GB(1)));
        assert!("12X".parse::<Size>().is_err());
        assert!("M".parse::<Size>().is_err());
    }
}
