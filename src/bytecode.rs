//! On-disk bytecode format: a magic/version header, a source hash for
//! staleness detection, a string pool, the instruction stream and an
//! optional line-number map.
//!
//! A mismatched compiler version or source hash is always treated as
//! stale and must be recompiled, never patched up in place.

use crate::error::{TinError, TinResult};
use crate::function::CodeBlock;

const MAGIC: [u8; 4] = *b"TSVM";

/// Bumped whenever the on-disk instruction encoding changes. A loaded file
/// whose version differs from this is unconditionally stale.
pub const COMPILER_VERSION: u32 = 1;

/// A loaded bytecode file: the code block it decodes to, plus the source
/// hash it was compiled from (for the caller to compare against the
/// current source file before trusting the cache).
pub struct LoadedBytecode {
    pub code_block: CodeBlock,
    pub source_hash: u64,
}

/// Serializes `block` plus `source_hash` into the on-disk format.
pub fn write(block: &CodeBlock, source_hash: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&COMPILER_VERSION.to_le_bytes());
    out.extend_from_slice(&source_hash.to_le_bytes());
    out.extend_from_slice(&block.id.to_le_bytes());

    out.extend_from_slice(&(block.string_pool.len() as u32).to_le_bytes());
    for s in &block.string_pool {
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    out.extend_from_slice(&(block.instructions.len() as u32).to_le_bytes());
    out.extend_from_slice(&block.instructions);

    out.extend_from_slice(&(block.line_map.len() as u32).to_le_bytes());
    for (offset, line) in &block.line_map {
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&line.to_le_bytes());
    }
    out
}

/// Deserializes a bytecode file. A magic mismatch or truncation is a
/// [`TinError::Compile`]; a compiler-version mismatch is reported via
/// [`LoadError::StaleVersion`] so the caller can recompile from source
/// rather than attempt to use a partially-decoded, version-skewed block.
pub fn read(bytes: &[u8]) -> Result<LoadedBytecode, LoadError> {
    let mut r = Reader { bytes, pos: 0 };
    let magic = r.take(4).ok_or(LoadError::Truncated)?;
    if magic != MAGIC {
        return Err(LoadError::BadMagic);
    }
    let version = r.u32().ok_or(LoadError::Truncated)?;
    if version != COMPILER_VERSION {
        return Err(LoadError::StaleVersion {
            found: version,
            expected: COMPILER_VERSION,
        });
    }
    let source_hash = r.u64().ok_or(LoadError::Truncated)?;
    let id = r.u32().ok_or(LoadError::Truncated)?;

    let pool_len = r.u32().ok_or(LoadError::Truncated)? as usize;
    let mut string_pool = Vec::with_capacity(pool_len);
    for _ in 0..pool_len {
        let len = r.u32().ok_or(LoadError::Truncated)? as usize;
        let bytes = r.take(len).ok_or(LoadError::Truncated)?;
        string_pool.push(String::from_utf8(bytes.to_vec()).map_err(|_| LoadError::Truncated)?);
    }

    let instr_len = r.u32().ok_or(LoadError::Truncated)? as usize;
    let instructions = r.take(instr_len).ok_or(LoadError::Truncated)?.to_vec();

    let line_len = r.u32().ok_or(LoadError::Truncated)? as usize;
    let mut line_map = Vec::with_capacity(line_len);
    for _ in 0..line_len {
        let offset = r.u32().ok_or(LoadError::Truncated)?;
        let line = r.u32().ok_or(LoadError::Truncated)?;
        line_map.push((offset, line));
    }

    let mut block = CodeBlock::new(id, instructions, string_pool);
    block.line_map = line_map;
    Ok(LoadedBytecode { code_block: block, source_hash })
}

/// Why a bytecode file failed to load. `StaleVersion` is not a
/// [`TinError`]: it is the signal the loader's caller (`exec_script`)
/// uses to fall back to recompiling, not a runtime fault.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadError {
    Truncated,
    BadMagic,
    StaleVersion { found: u32, expected: u32 },
}

impl From<LoadError> for TinError {
    fn from(e: LoadError) -> Self {
        TinError::Compile {
            line: 0,
            message: format!("{e:?}"),
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8).map(|b| u64::from_le_bytes(b.try_into().unwrap()))
    }
}

/// Checks whether a loaded bytecode file's source hash still matches
/// `current_source_hash`; if not, it is stale and must be recompiled.
pub fn is_stale(loaded: &LoadedBytecode, current_source_hash: u64) -> bool {
    loaded.source_hash != current_source_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_code_block() {
        let mut block = CodeBlock::new(7, vec![1, 2, 3], vec!["hi".to_string()]);
        block.line_map = vec![(0, 1), (2, 2)];
        let bytes = write(&block, 0xdead_beef);
        let loaded = read(&bytes).unwrap();
        assert_eq!(loaded.code_block.id, 7);
        assert_eq!(loaded.code_block.instructions, vec![1, 2, 3]);
        assert_eq!(loaded.code_block.string_pool, vec!["hi".to_string()]);
        assert_eq!(loaded.source_hash, 0xdead_beef);
        assert!(!is_stale(&loaded, 0xdead_beef));
        assert!(is_stale(&loaded, 0));
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 20];
        assert_eq!(read(&bytes), Err(LoadError::BadMagic));
    }

    #[test]
    fn flags_version_mismatch_as_stale_not_an_error_to_patch() {
        let block = CodeBlock::new(0, vec![], vec![]);
        let mut bytes = write(&block, 0);
        bytes[4..8].copy_from_slice(&(COMPILER_VERSION + 1).to_le_bytes());
        match read(&bytes) {
            Err(LoadError::StaleVersion { found, expected }) => {
                assert_eq!(found, COMPILER_VERSION + 1);
                assert_eq!(expected, COMPILER_VERSION);
            }
            other => panic!("expected StaleVersion, got {other:?}"),
        }
    }
}
