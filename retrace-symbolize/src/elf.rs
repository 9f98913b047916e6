//! Support for the Executable and Linkable Format, used on Linux.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::io::Read;

use goblin::elf;
use thiserror::Error;

use crate::dwarf::{Dwarf, DwarfSection, Endian};
use crate::symbols::{Symbol, SymbolMap};

const SHF_COMPRESSED: u64 = elf::section_header::SHF_COMPRESSED as u64;
const SHT_NOBITS: u32 = elf::section_header::SHT_NOBITS;

/// An error when dealing with [`ElfObject`](struct.ElfObject.html).
#[derive(Debug, Error)]
#[error("invalid ELF file")]
pub struct ElfError {
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ElfError {
    /// Creates a new ELF error from an arbitrary error payload.
    fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { source }
    }
}

/// How the data of a section is compressed on disk.
enum SectionCompression {
    /// Plain, uncompressed section data.
    None,
    /// An ELF compression header (`SHF_COMPRESSED`) precedes the stream.
    Chdr,
    /// Legacy GNU `.zdebug_` section with a `ZLIB` magic header.
    Gnu,
}

/// Executable and Linkable Format, used for executables and libraries on
/// Linux.
pub struct ElfObject<'data> {
    elf: elf::Elf<'data>,
    data: &'data [u8],
}

impl<'data> ElfObject<'data> {
    /// Tests whether the buffer could contain an ELF object.
    pub fn test(data: &[u8]) -> bool {
        data.get(0..elf::header::SELFMAG)
            .map_or(false, |data| data == elf::header::ELFMAG)
    }

    /// Tries to parse an ELF object from the given slice.
    pub fn parse(data: &'data [u8]) -> Result<Self, ElfError> {
        let elf = elf::Elf::parse(data).map_err(ElfError::new)?;
        Ok(ElfObject { elf, data })
    }

    /// The address at which the image prefers to be loaded into memory.
    ///
    /// This is the lowest virtual address of any loadable segment. For
    /// position-independent images this is usually zero, in which case the
    /// runtime load base equals the relocation bias.
    pub fn load_address(&self) -> u64 {
        self.elf
            .program_headers
            .iter()
            .filter(|header| header.p_type == elf::program_header::PT_LOAD)
            .map(|header| header.p_vaddr)
            .min()
            .unwrap_or(0)
    }

    /// Returns an ordered map of the function symbols in the symbol table.
    ///
    /// The debug symbol table (`.symtab`) is preferred; stripped objects fall
    /// back to the dynamic symbol table (`.dynsym`).
    pub fn symbol_map(&self) -> SymbolMap<'data> {
        let (symtab, strtab) = if self.elf.syms.is_empty() {
            (&self.elf.dynsyms, &self.elf.dynstrtab)
        } else {
            (&self.elf.syms, &self.elf.strtab)
        };

        symtab
            .iter()
            .filter(|symbol| symbol.is_function() && symbol.st_value != 0)
            .map(|symbol| Symbol {
                name: strtab.get_at(symbol.st_name).map(Cow::Borrowed),
                address: symbol.st_value,
                size: symbol.st_size,
            })
            .collect()
    }

    /// Locates a section by its translated name, without decompressing.
    fn find_section(&self, name: &str) -> Option<(SectionCompression, DwarfSection<'data>)> {
        for header in &self.elf.section_headers {
            if header.sh_type == SHT_NOBITS {
                continue;
            }

            let section_name = match self.elf.shdr_strtab.get_at(header.sh_name) {
                Some(section_name) => section_name,
                None => continue,
            };
            let (gnu_compressed, section_name) = match section_name.strip_prefix(".z") {
                Some(rest) if rest.starts_with("debug_") => (true, rest),
                _ => (false, section_name.strip_prefix('.').unwrap_or(section_name)),
            };

            if section_name != name {
                continue;
            }

            let offset = header.sh_offset as usize;
            let size = header.sh_size as usize;
            let data = self.data.get(offset..offset.checked_add(size)?)?;

            let compression = if gnu_compressed {
                SectionCompression::Gnu
            } else if header.sh_flags & SHF_COMPRESSED != 0 {
                SectionCompression::Chdr
            } else {
                SectionCompression::None
            };

            let section = DwarfSection {
                address: header.sh_addr,
                data: Cow::Borrowed(data),
            };

            return Some((compression, section));
        }

        None
    }

    /// Decompresses section data that carries an ELF compression header.
    fn decompress_chdr(&self, data: &[u8]) -> Option<Vec<u8>> {
        let (ch_type, ch_size, header_size) = if self.elf.is_64 {
            (
                read_u32(data, 0, self.elf.little_endian)?,
                read_u64(data, 8, self.elf.little_endian)?,
                24,
            )
        } else {
            (
                read_u32(data, 0, self.elf.little_endian)?,
                read_u32(data, 4, self.elf.little_endian)? as u64,
                12,
            )
        };

        if ch_type != elf::compression_header::ELFCOMPRESS_ZLIB {
            return None;
        }

        inflate(data.get(header_size..)?, ch_size as usize)
    }

    /// Decompresses legacy `.zdebug_` section data.
    fn decompress_gnu(&self, data: &[u8]) -> Option<Vec<u8>> {
        if data.get(..4)? != b"ZLIB" {
            return None;
        }

        let size = u64::from_be_bytes(data.get(4..12)?.try_into().ok()?);
        inflate(data.get(12..)?, size as usize)
    }
}

impl fmt::Debug for ElfObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElfObject")
            .field("load_address", &format_args!("{:#x}", self.load_address()))
            .field("is_64", &self.elf.is_64)
            .finish()
    }
}

impl<'data> Dwarf<'data> for ElfObject<'data> {
    fn endianity(&self) -> Endian {
        if self.elf.little_endian {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    fn raw_section(&self, name: &str) -> Option<DwarfSection<'data>> {
        let (_, section) = self.find_section(name)?;
        Some(section)
    }

    fn section(&self, name: &str) -> Option<DwarfSection<'data>> {
        let (compression, mut section) = self.find_section(name)?;

        let decompressed = match compression {
            SectionCompression::None => return Some(section),
            SectionCompression::Chdr => self.decompress_chdr(&section.data)?,
            SectionCompression::Gnu => self.decompress_gnu(&section.data)?,
        };

        section.data = Cow::Owned(decompressed);
        Some(section)
    }
}

fn read_u32(data: &[u8], offset: usize, little_endian: bool) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(if little_endian {
        u32::from_le_bytes(bytes)
    } else {
        u32::from_be_bytes(bytes)
    })
}

fn read_u64(data: &[u8], offset: usize, little_endian: bool) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(if little_endian {
        u64::from_le_bytes(bytes)
    } else {
        u64::from_be_bytes(bytes)
    })
}

fn inflate(stream: &[u8], size_hint: usize) -> Option<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(size_hint);
    flate2::read::ZlibDecoder::new(stream)
        .read_to_end(&mut decompressed)
        .ok()?;
    Some(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_common::ByteView;

    #[test]
    fn test_parse_current_exe() {
        let path = std::env::current_exe().unwrap();
        let view = ByteView::open(path).unwrap();

        assert!(ElfObject::test(&view));
        let object = ElfObject::parse(&view).unwrap();

        assert!(object.raw_section("text").is_some());
        assert!(!object.symbol_map().is_empty());
    }

    #[test]
    fn test_reject_garbage() {
        assert!(!ElfObject::test(b"not an object"));
        assert!(ElfObject::parse(b"not an object").is_err());
    }
}
