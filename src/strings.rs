use std::str;

use crate::error::{Error, Result};
use crate::osmpbf;

/// Strings of a single primitive block, addressed by their index.
///
/// Every block carries a private table of interned strings. Tag keys, tag
/// values and relation roles refer to it by index. Index 0 is reserved as the
/// dense nodes tag delimiter and is always the empty string.
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    strings: Vec<String>,
    // offset of the owning block, used for error reporting
    offset: u64,
}

impl StringTable {
    /// Decodes the string table of a block, validating that all entries are UTF-8.
    pub fn decode(pbf_stringtable: &osmpbf::StringTable, offset: u64) -> Result<Self> {
        let strings = pbf_stringtable
            .s
            .iter()
            .map(|x| {
                str::from_utf8(x)
                    .map(str::to_owned)
                    .map_err(|source| Error::InvalidUtf8 { offset, source })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { strings, offset })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Resolves an index from a tag or role field.
    pub fn get<I>(&self, index: I) -> Result<&str>
    where
        I: TryInto<usize> + Copy + Into<i64>,
    {
        let out_of_range = || Error::StringTableIndexOutOfRange {
            offset: self.offset,
            index: Into::<i64>::into(index).max(0) as usize,
            len: self.strings.len(),
        };
        let idx: usize = index.try_into().map_err(|_| out_of_range())?;
        self.strings
            .get(idx)
            .map(String::as_str)
            .ok_or_else(out_of_range)
    }
}
