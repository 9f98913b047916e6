//! Support for DWARF debugging information embedded in ELF objects.
//!
//! The central element of this module is [`DwarfInfo`], which parses the
//! DWARF sections of a module once and then answers point queries: given an
//! address (in the module's linked address space), produce the chain of
//! functions covering that address, innermost inlined function first.
//!
//! [`DwarfInfo`]: struct.DwarfInfo.html

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::OnceLock;

use fallible_iterator::FallibleIterator;
use gimli::read::{AttributeValue, Error as GimliError, Range};
use gimli::{constants, DwarfFileType, UnitSectionOffset};
use thiserror::Error;

use retrace_common::{AsSelf, Language, Name, NameMangling};

pub use gimli::RunTimeEndian as Endian;

type Slice<'a> = gimli::read::EndianSlice<'a, Endian>;
type RangeLists<'a> = gimli::read::RangeLists<Slice<'a>>;
type Unit<'a> = gimli::read::Unit<Slice<'a>>;
type DwarfInner<'a> = gimli::read::Dwarf<Slice<'a>>;

type Die<'d, 'u> = gimli::read::DebuggingInformationEntry<'u, 'u, Slice<'d>, usize>;
type Attribute<'a> = gimli::read::Attribute<Slice<'a>>;
type UnitOffset = gimli::read::UnitOffset<usize>;
type DebugInfoOffset = gimli::DebugInfoOffset<usize>;

type UnitHeader<'a> = gimli::read::UnitHeader<Slice<'a>>;
type IncompleteLineNumberProgram<'a> = gimli::read::IncompleteLineProgram<Slice<'a>>;
type LineNumberProgramHeader<'a> = gimli::read::LineProgramHeader<Slice<'a>>;
type LineProgramFileEntry<'a> = gimli::read::FileEntry<Slice<'a>>;

/// Clamps a DWARF line or column number into the reported range.
///
/// Zero remains "unknown".
fn clamp_to_u32(value: u64) -> u32 {
    value.min(u64::from(u32::MAX)) as u32
}

/// The error kind for [`DwarfError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DwarfErrorKind {
    /// A compilation unit referenced by offset does not exist.
    InvalidUnitRef(usize),

    /// The DWARF file is corrupted. See the cause for more information.
    CorruptedData,
}

impl fmt::Display for DwarfErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUnitRef(offset) => {
                write!(f, "compilation unit for offset {} does not exist", offset)
            }
            Self::CorruptedData => write!(f, "corrupted dwarf debug data"),
        }
    }
}

/// An error handling DWARF debugging information.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DwarfError {
    kind: DwarfErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl DwarfError {
    /// Creates a new DWARF error from a known kind of error as well as an
    /// arbitrary error payload.
    fn new<E>(kind: DwarfErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`DwarfErrorKind`] for this error.
    pub fn kind(&self) -> DwarfErrorKind {
        self.kind
    }
}

impl From<DwarfErrorKind> for DwarfError {
    fn from(kind: DwarfErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<GimliError> for DwarfError {
    fn from(e: GimliError) -> Self {
        Self::new(DwarfErrorKind::CorruptedData, e)
    }
}

/// DWARF section information including its data.
///
/// This is returned from objects implementing the [`Dwarf`] trait.
///
/// [`Dwarf`]: trait.Dwarf.html
#[derive(Clone)]
pub struct DwarfSection<'data> {
    /// Memory address of this section in virtual memory.
    pub address: u64,

    /// Binary data of this section.
    pub data: Cow<'data, [u8]>,
}

impl fmt::Debug for DwarfSection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DwarfSection")
            .field("address", &format_args!("{:#x}", self.address))
            .field("len()", &self.data.len())
            .finish()
    }
}

/// Provides access to DWARF debugging information independent of the
/// container file type.
pub trait Dwarf<'data> {
    /// Returns whether the file was compiled for a big-endian or
    /// little-endian machine.
    fn endianity(&self) -> Endian;

    /// Returns information and raw data of a section.
    ///
    /// The section name is given without leading punctuation; for instance,
    /// the name of the Debug Info section would be `"debug_info"`, which
    /// translates to `".debug_info"` in ELF.
    ///
    /// If the container supports compressed section data, this returns the
    /// compressed data. To get uncompressed data instead, use `section`.
    fn raw_section(&self, name: &str) -> Option<DwarfSection<'data>>;

    /// Returns information and data of a section, decompressing on the fly
    /// if necessary.
    fn section(&self, name: &str) -> Option<DwarfSection<'data>> {
        self.raw_section(name)
    }
}

/// A row in the prepared line table.
#[derive(Debug)]
struct LineRow {
    address: u64,
    file_index: u64,
    line: u32,
    column: u32,
}

/// A contiguous sequence in the prepared line table.
#[derive(Debug)]
struct LineSequence {
    start: u64,
    end: u64,
    rows: Vec<LineRow>,
}

/// A line program prepared for efficient address lookups.
#[derive(Debug)]
struct LineTable<'d> {
    header: LineNumberProgramHeader<'d>,
    sequences: Vec<LineSequence>,
}

impl<'d> LineTable<'d> {
    fn prepare(program: IncompleteLineNumberProgram<'d>) -> Self {
        let mut sequences = Vec::new();
        let mut sequence_rows = Vec::<LineRow>::new();
        let mut prev_address = 0;
        let mut state_machine = program.rows();

        while let Ok(Some((_, &program_row))) = state_machine.next_row() {
            let address = program_row.address();

            // rustc has emitted sequences starting at address 0 for WASM
            // targets. DWARF does not permit code at address 0, so skip.
            if address == 0 {
                continue;
            }

            if program_row.end_sequence() {
                // There could be multiple end_sequence rows in a row; empty
                // sequences are skipped entirely.
                if !sequence_rows.is_empty() {
                    sequences.push(LineSequence {
                        start: sequence_rows[0].address,
                        // Ensure that the sequence end always covers the last
                        // encountered row, assuming a 1 byte instruction.
                        end: if address < prev_address {
                            prev_address + 1
                        } else {
                            address
                        },
                        rows: sequence_rows.drain(..).collect(),
                    });
                }
                prev_address = 0;
            } else if address < prev_address {
                // "Within a sequence, addresses and operation pointers may
                // only increase." This row is invalid, ignore it.
            } else {
                let file_index = program_row.file_index();
                let line = program_row
                    .line()
                    .map(|line| clamp_to_u32(line.get()))
                    .unwrap_or(0);
                let column = match program_row.column() {
                    gimli::ColumnType::LeftEdge => 0,
                    gimli::ColumnType::Column(column) => clamp_to_u32(column.get()),
                };

                let mut duplicate = false;
                if let Some(last_row) = sequence_rows.last_mut() {
                    if last_row.address == address {
                        last_row.file_index = file_index;
                        last_row.line = line;
                        last_row.column = column;
                        duplicate = true;
                    }
                }
                if !duplicate {
                    sequence_rows.push(LineRow {
                        address,
                        file_index,
                        line,
                        column,
                    });
                }
                prev_address = address;
            }
        }

        if !sequence_rows.is_empty() {
            // A sequence without an end_sequence row; assume the last row
            // covered one byte.
            let start = sequence_rows[0].address;
            let end = prev_address + 1;
            sequences.push(LineSequence {
                start,
                end,
                rows: sequence_rows,
            });
        }

        // Sequences are not guaranteed to be in order.
        dmsort::sort_by_key(&mut sequences, |sequence| sequence.start);

        LineTable {
            header: state_machine.header().clone(),
            sequences,
        }
    }

    /// Returns the row covering the given address, if any.
    fn row_for_address(&self, address: u64) -> Option<&LineRow> {
        let sequence = self
            .sequences
            .iter()
            .find(|sequence| sequence.start <= address && address < sequence.end)?;

        match sequence
            .rows
            .binary_search_by_key(&address, |row| row.address)
        {
            Ok(index) => Some(&sequence.rows[index]),
            Err(0) => None,
            Err(next_index) => Some(&sequence.rows[next_index - 1]),
        }
    }

    /// Returns the file entry for an index into this table's file list.
    fn file(&self, index: u64) -> Option<&LineProgramFileEntry<'d>> {
        self.header.file(index)
    }
}

/// A slim wrapper around a DWARF unit.
#[derive(Clone, Copy)]
struct UnitRef<'d, 'a> {
    info: &'a DwarfInfo<'d>,
    unit: &'a Unit<'d>,
}

impl<'d, 'a> UnitRef<'d, 'a> {
    /// Resolve the binary value of an attribute.
    #[inline(always)]
    fn slice_value(&self, value: AttributeValue<Slice<'d>>) -> Option<&'d [u8]> {
        self.info
            .inner
            .attr_string(self.unit, value)
            .map(|reader| reader.slice())
            .ok()
    }

    /// Resolve the actual string value of an attribute.
    #[inline(always)]
    fn string_value(&self, value: AttributeValue<Slice<'d>>) -> Option<Cow<'d, str>> {
        let slice = self.slice_value(value)?;
        Some(String::from_utf8_lossy(slice))
    }

    /// Resolves an entry and if found invokes a function to transform it.
    ///
    /// As this might resolve into cached information the data borrowed from
    /// abbrev can only be temporarily accessed in the callback.
    fn resolve_reference<T, F>(&self, attr: Attribute<'d>, f: F) -> Result<Option<T>, DwarfError>
    where
        F: FnOnce(Self, &Die<'d, '_>) -> Result<Option<T>, DwarfError>,
    {
        let (unit, offset) = match attr.value() {
            AttributeValue::UnitRef(offset) => (*self, offset),
            AttributeValue::DebugInfoRef(offset) => self.info.find_unit_offset(offset)?,
            _ => return Ok(None),
        };

        let mut entries = unit.unit.entries_at_offset(offset)?;
        entries.next_entry()?;

        if let Some(entry) = entries.current() {
            f(unit, entry)
        } else {
            Ok(None)
        }
    }

    /// Returns the offset of this unit within its section.
    fn offset(&self) -> UnitSectionOffset {
        self.unit.header.offset()
    }

    /// Resolves the function name of a debug entry.
    ///
    /// Linkage names win; a plain name is the fallback; references through
    /// `DW_AT_specification` and `DW_AT_abstract_origin` are followed.
    fn resolve_function_name(
        &self,
        entry: &Die<'d, '_>,
        language: Language,
    ) -> Result<Option<Name<'d>>, DwarfError> {
        let mut attrs = entry.attrs();
        let mut fallback_name = None;
        let mut reference_target = None;

        while let Some(attr) = attrs.next()? {
            match attr.name() {
                // Prioritize these. If we get them, take them.
                constants::DW_AT_linkage_name | constants::DW_AT_MIPS_linkage_name => {
                    return Ok(self
                        .string_value(attr.value())
                        .map(|name| Name::new(name, NameMangling::Mangled, language)));
                }
                constants::DW_AT_name => {
                    fallback_name = Some(attr);
                }
                constants::DW_AT_abstract_origin | constants::DW_AT_specification => {
                    reference_target = Some(attr);
                }
                _ => {}
            }
        }

        if let Some(attr) = fallback_name {
            return Ok(self
                .string_value(attr.value())
                .map(|name| Name::new(name, NameMangling::Unmangled, language)));
        }

        if let Some(attr) = reference_target {
            return self.resolve_reference(attr, |ref_unit, ref_entry| {
                if self.offset() != ref_unit.offset() || entry.offset() != ref_entry.offset() {
                    ref_unit.resolve_function_name(ref_entry, language)
                } else {
                    Ok(None)
                }
            });
        }

        Ok(None)
    }
}

/// Converts a DWARF language number into the common `Language` type.
fn language_from_dwarf(language: gimli::DwLang) -> Language {
    match language {
        constants::DW_LANG_C => Language::C,
        constants::DW_LANG_C11 => Language::C,
        constants::DW_LANG_C89 => Language::C,
        constants::DW_LANG_C99 => Language::C,
        constants::DW_LANG_C_plus_plus => Language::Cpp,
        constants::DW_LANG_C_plus_plus_03 => Language::Cpp,
        constants::DW_LANG_C_plus_plus_11 => Language::Cpp,
        constants::DW_LANG_C_plus_plus_14 => Language::Cpp,
        constants::DW_LANG_D => Language::D,
        constants::DW_LANG_Go => Language::Go,
        constants::DW_LANG_ObjC => Language::ObjC,
        constants::DW_LANG_ObjC_plus_plus => Language::ObjCpp,
        constants::DW_LANG_Rust => Language::Rust,
        constants::DW_LANG_Swift => Language::Swift,
        _ => Language::Unknown,
    }
}

/// Data of a specific DWARF section.
struct DwarfSectionData<'data, S> {
    data: Cow<'data, [u8]>,
    endianity: Endian,
    _ph: PhantomData<S>,
}

impl<'data, S> DwarfSectionData<'data, S>
where
    S: gimli::read::Section<Slice<'data>>,
{
    /// Loads data for this section from the object file.
    fn load<D>(dwarf: &D) -> Self
    where
        D: Dwarf<'data>,
    {
        DwarfSectionData {
            data: dwarf
                .section(&S::section_name()[1..])
                .map(|section| section.data)
                .unwrap_or_default(),
            endianity: dwarf.endianity(),
            _ph: PhantomData,
        }
    }

    /// Creates a gimli dwarf section object from the loaded data.
    fn to_gimli(&'data self) -> S {
        S::from(Slice::new(&self.data, self.endianity))
    }
}

impl<'d, S> fmt::Debug for DwarfSectionData<'d, S>
where
    S: gimli::read::Section<Slice<'d>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DwarfSectionData")
            .field("type", &S::section_name())
            .field("endianity", &self.endianity)
            .field("len()", &self.data.len())
            .finish()
    }
}

/// All DWARF sections that are needed by [`DwarfInfo`].
pub(crate) struct DwarfSections<'data> {
    debug_abbrev: DwarfSectionData<'data, gimli::read::DebugAbbrev<Slice<'data>>>,
    debug_addr: DwarfSectionData<'data, gimli::read::DebugAddr<Slice<'data>>>,
    debug_info: DwarfSectionData<'data, gimli::read::DebugInfo<Slice<'data>>>,
    debug_line: DwarfSectionData<'data, gimli::read::DebugLine<Slice<'data>>>,
    debug_line_str: DwarfSectionData<'data, gimli::read::DebugLineStr<Slice<'data>>>,
    debug_str: DwarfSectionData<'data, gimli::read::DebugStr<Slice<'data>>>,
    debug_str_offsets: DwarfSectionData<'data, gimli::read::DebugStrOffsets<Slice<'data>>>,
    debug_ranges: DwarfSectionData<'data, gimli::read::DebugRanges<Slice<'data>>>,
    debug_rnglists: DwarfSectionData<'data, gimli::read::DebugRngLists<Slice<'data>>>,
}

impl<'data> DwarfSections<'data> {
    /// Loads all sections from a DWARF object.
    pub(crate) fn from_dwarf<D>(dwarf: &D) -> Self
    where
        D: Dwarf<'data>,
    {
        DwarfSections {
            debug_abbrev: DwarfSectionData::load(dwarf),
            debug_addr: DwarfSectionData::load(dwarf),
            debug_info: DwarfSectionData::load(dwarf),
            debug_line: DwarfSectionData::load(dwarf),
            debug_line_str: DwarfSectionData::load(dwarf),
            debug_str: DwarfSectionData::load(dwarf),
            debug_str_offsets: DwarfSectionData::load(dwarf),
            debug_ranges: DwarfSectionData::load(dwarf),
            debug_rnglists: DwarfSectionData::load(dwarf),
        }
    }
}

/// A function DIE on the path from the compilation unit to the innermost
/// function covering an address.
struct FuncDie {
    offset: UnitOffset,
    inlined: bool,
    call_file: Option<u64>,
    call_line: u32,
    call_column: u32,
}

/// One raw frame of the inline expansion at an address.
///
/// The symbolizer turns these into logical frames by demangling the name and
/// attaching the physical address.
pub(crate) struct RawFrame<'d> {
    /// The resolved function name, if any.
    pub name: Option<Name<'d>>,
    /// `true` for inlined call sites.
    pub inlined: bool,
    /// Full source file path.
    pub file: Option<String>,
    /// Line number, zero if unknown.
    pub line: u32,
    /// Column number, zero if unknown.
    pub column: u32,
}

/// A compilation unit and the caches derived from it.
struct UnitCell<'d> {
    header: UnitHeader<'d>,
    data: OnceLock<Option<UnitData<'d>>>,
    ranges: OnceLock<Vec<Range>>,
    line: OnceLock<Option<LineTable<'d>>>,
}

struct UnitData<'d> {
    unit: Unit<'d>,
    language: Language,
}

/// Parsed DWARF debugging information for one module.
///
/// Parsing the unit headers happens eagerly; individual units, their ranges
/// and their line tables are materialized lazily and cached, so concurrent
/// queries need no further synchronization.
pub(crate) struct DwarfInfo<'data> {
    inner: DwarfInner<'data>,
    units: Vec<UnitCell<'data>>,
}

impl<'d> DwarfInfo<'d> {
    /// Parses DWARF information from its raw section data.
    pub(crate) fn parse(sections: &'d DwarfSections<'d>) -> Result<Self, DwarfError> {
        let inner = gimli::read::Dwarf {
            debug_abbrev: sections.debug_abbrev.to_gimli(),
            debug_addr: sections.debug_addr.to_gimli(),
            debug_aranges: Default::default(),
            debug_info: sections.debug_info.to_gimli(),
            debug_line: sections.debug_line.to_gimli(),
            debug_line_str: sections.debug_line_str.to_gimli(),
            debug_str: sections.debug_str.to_gimli(),
            debug_str_offsets: sections.debug_str_offsets.to_gimli(),
            debug_types: Default::default(),
            locations: Default::default(),
            ranges: RangeLists::new(
                sections.debug_ranges.to_gimli(),
                sections.debug_rnglists.to_gimli(),
            ),
            file_type: DwarfFileType::Main,
            sup: Default::default(),
        };

        let headers = inner.units().collect::<Vec<_>>()?;
        let units = headers
            .into_iter()
            .map(|header| UnitCell {
                header,
                data: OnceLock::new(),
                ranges: OnceLock::new(),
                line: OnceLock::new(),
            })
            .collect();

        Ok(DwarfInfo { inner, units })
    }

    /// Lazily materializes a compilation unit.
    fn get_unit(&self, index: usize) -> Option<&UnitData<'d>> {
        let cell = self.units.get(index)?;
        cell.data
            .get_or_init(|| {
                // For some older DWARF files the top-level DIE might be
                // missing, which would cause an error here. Treat those units
                // as empty.
                let unit = self.inner.unit(cell.header).ok()?;
                let language = unit_language(&unit);
                Some(UnitData { unit, language })
            })
            .as_ref()
    }

    /// Returns the code ranges covered by a compilation unit.
    fn unit_ranges(&self, index: usize) -> &[Range] {
        let cell = match self.units.get(index) {
            Some(cell) => cell,
            None => return &[],
        };

        cell.ranges.get_or_init(|| {
            let data = match self.get_unit(index) {
                Some(data) => data,
                None => return Vec::new(),
            };

            let mut ranges = Vec::new();
            if let Ok(mut iter) = self.inner.unit_ranges(&data.unit) {
                while let Ok(Some(range)) = iter.next() {
                    if range.end > range.begin {
                        ranges.push(range);
                    }
                }
            }
            ranges
        })
    }

    /// Returns the prepared line table of a compilation unit.
    fn line_table(&self, index: usize) -> Option<&LineTable<'d>> {
        let cell = self.units.get(index)?;
        cell.line
            .get_or_init(|| {
                let data = self.get_unit(index)?;
                let program = data.unit.line_program.clone()?;
                Some(LineTable::prepare(program))
            })
            .as_ref()
    }

    /// Finds the compilation unit covering the given address.
    fn find_unit(&self, address: u64) -> Option<usize> {
        (0..self.units.len()).find(|&index| {
            self.unit_ranges(index)
                .iter()
                .any(|range| range.begin <= address && address < range.end)
        })
    }

    /// Resolves an offset into a different compilation unit.
    fn find_unit_offset(
        &self,
        offset: DebugInfoOffset,
    ) -> Result<(UnitRef<'d, '_>, UnitOffset), DwarfError> {
        let section_offset = UnitSectionOffset::DebugInfoOffset(offset);
        let search_result = self
            .units
            .binary_search_by_key(&section_offset, |cell| cell.header.offset());

        let index = match search_result {
            Ok(index) => index,
            Err(0) => return Err(DwarfErrorKind::InvalidUnitRef(offset.0).into()),
            Err(next_index) => next_index - 1,
        };

        if let Some(data) = self.get_unit(index) {
            if let Some(unit_offset) = section_offset.to_unit_offset(&data.unit) {
                return Ok((
                    UnitRef {
                        info: self,
                        unit: &data.unit,
                    },
                    unit_offset,
                ));
            }
        }

        Err(DwarfErrorKind::InvalidUnitRef(offset.0).into())
    }

    /// Determines whether the code ranges of a DIE contain the address.
    fn die_contains(&self, unit: &Unit<'d>, entry: &Die<'d, '_>, address: u64) -> bool {
        let mut ranges = match self.inner.die_ranges(unit, entry) {
            Ok(ranges) => ranges,
            Err(_) => return false,
        };

        // Broken (inverted) ranges have been seen in emscripten output;
        // treat any error as "does not contain".
        while let Ok(Some(range)) = ranges.next() {
            if range.begin <= address && address < range.end {
                return true;
            }
        }
        false
    }

    /// Walks the DIE tree of a unit and collects the chain of function DIEs
    /// whose ranges contain the address, outermost first.
    ///
    /// Function DIEs containing the same address strictly nest, so the chain
    /// is the path from the outermost `subprogram` down to the innermost
    /// `inlined_subroutine`. The walk stops once it leaves the subtree of the
    /// outermost match.
    fn function_chain(&self, unit: &Unit<'d>, address: u64) -> Result<Vec<FuncDie>, DwarfError> {
        let mut chain = Vec::new();
        let mut entries = unit.entries();
        let mut depth = 0isize;
        let mut outer_depth = None;

        while let Some((delta, entry)) = entries.next_dfs()? {
            depth += delta;

            if let Some(outer) = outer_depth {
                if depth <= outer {
                    break;
                }
            }

            if !is_function(entry.tag()) || !self.die_contains(unit, entry, address) {
                continue;
            }

            if outer_depth.is_none() {
                outer_depth = Some(depth);
            }
            chain.push(read_func_die(entry));
        }

        Ok(chain)
    }

    /// Produces the inline expansion of the given address, innermost first.
    ///
    /// The innermost frame carries the source location from the line table at
    /// the address; each successively outer frame carries the call location
    /// recorded on the inner inlined DIE. All frames except the enclosing
    /// physical function are marked inlined.
    pub(crate) fn frames_for_address(&self, address: u64) -> Vec<RawFrame<'_>> {
        let index = match self.find_unit(address) {
            Some(index) => index,
            None => return Vec::new(),
        };
        let data = match self.get_unit(index) {
            Some(data) => data,
            None => return Vec::new(),
        };

        let unit_ref = UnitRef {
            info: self,
            unit: &data.unit,
        };

        let chain = match self.function_chain(&data.unit, address) {
            Ok(chain) => chain,
            Err(_) => return Vec::new(),
        };
        if chain.is_empty() {
            return Vec::new();
        }

        let line_table = self.line_table(index);
        let mut location = line_table.and_then(|table| {
            let row = table.row_for_address(address)?;
            Some((
                resolve_file(unit_ref, table, row.file_index),
                row.line,
                row.column,
            ))
        });

        let mut frames = Vec::with_capacity(chain.len());
        for func in chain.iter().rev() {
            let entry = match data.unit.entry(func.offset) {
                Ok(entry) => entry,
                Err(_) => break,
            };
            let name = unit_ref
                .resolve_function_name(&entry, data.language)
                .ok()
                .flatten();

            let (file, line, column) = match location.take() {
                Some((file, line, column)) => (file, line, column),
                None => (None, 0, 0),
            };

            let inlined = func.inlined;
            frames.push(RawFrame {
                name,
                inlined,
                file,
                line,
                column,
            });

            if !inlined {
                break;
            }

            // The next outer frame is located at this inlined call site.
            let call_file = match (func.call_file, line_table) {
                (Some(file_index), Some(table)) => resolve_file(unit_ref, table, file_index),
                _ => None,
            };
            location = Some((call_file, func.call_line, func.call_column));
        }

        frames
    }
}

impl<'slf, 'd: 'slf> AsSelf<'slf> for DwarfInfo<'d> {
    type Ref = DwarfInfo<'slf>;

    fn as_self(&'slf self) -> &Self::Ref {
        unsafe { std::mem::transmute(self) }
    }
}

impl fmt::Debug for DwarfInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DwarfInfo")
            .field("units", &self.units.len())
            .finish()
    }
}

/// Reads the declared source language from a unit's root DIE.
fn unit_language(unit: &Unit<'_>) -> Language {
    let mut entries = unit.entries();
    match entries.next_dfs() {
        Ok(Some((_, entry))) => match entry.attr_value(constants::DW_AT_language) {
            Ok(Some(AttributeValue::Language(language))) => language_from_dwarf(language),
            _ => Language::Unknown,
        },
        _ => Language::Unknown,
    }
}

fn is_function(tag: gimli::DwTag) -> bool {
    tag == constants::DW_TAG_subprogram
        || tag == constants::DW_TAG_inlined_subroutine
        || tag == constants::DW_TAG_entry_point
}

/// Extracts the offset, tag and call coordinates from a function DIE.
fn read_func_die(entry: &Die<'_, '_>) -> FuncDie {
    let mut call_file = None;
    let mut call_line = 0;
    let mut call_column = 0;

    let mut attrs = entry.attrs();
    while let Ok(Some(attr)) = attrs.next() {
        match attr.name() {
            constants::DW_AT_call_file => match attr.value() {
                AttributeValue::FileIndex(index) => call_file = Some(index),
                AttributeValue::Udata(index) => call_file = Some(index),
                _ => {}
            },
            constants::DW_AT_call_line => {
                if let AttributeValue::Udata(line) = attr.value() {
                    call_line = clamp_to_u32(line);
                }
            }
            constants::DW_AT_call_column => {
                if let AttributeValue::Udata(column) = attr.value() {
                    call_column = clamp_to_u32(column);
                }
            }
            _ => {}
        }
    }

    FuncDie {
        offset: entry.offset(),
        inlined: entry.tag() == constants::DW_TAG_inlined_subroutine,
        call_file,
        call_line,
        call_column,
    }
}

/// Resolves a file index into a full path, joined onto the compilation
/// directory.
fn resolve_file<'d>(unit_ref: UnitRef<'d, '_>, table: &LineTable<'d>, index: u64) -> Option<String> {
    let file = table.file(index)?;
    let name = unit_ref.slice_value(file.path_name())?;
    let dir = file
        .directory(&table.header)
        .and_then(|attr| unit_ref.slice_value(attr))
        .unwrap_or_default();
    let comp_dir = unit_ref
        .unit
        .comp_dir
        .map(|dir| dir.slice())
        .unwrap_or_default();

    Some(join_paths(comp_dir, dir, name))
}

/// Joins compilation directory, file directory and file name, honoring
/// absolute components.
fn join_paths(comp_dir: &[u8], dir: &[u8], name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    if name.starts_with('/') {
        return name.into_owned();
    }

    let dir = String::from_utf8_lossy(dir);
    let prefix = if dir.starts_with('/') {
        dir.into_owned()
    } else {
        let comp_dir = String::from_utf8_lossy(comp_dir);
        match (comp_dir.is_empty(), dir.is_empty()) {
            (true, _) => dir.into_owned(),
            (false, true) => comp_dir.into_owned(),
            (false, false) => format!("{}/{}", comp_dir.trim_end_matches('/'), dir),
        }
    };

    if prefix.is_empty() {
        name.into_owned()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_u32() {
        assert_eq!(clamp_to_u32(0), 0);
        assert_eq!(clamp_to_u32(1234), 1234);
        assert_eq!(clamp_to_u32(u64::MAX), u32::MAX);
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths(b"/src", b"", b"lib.rs"), "/src/lib.rs");
        assert_eq!(join_paths(b"/src", b"sub", b"lib.rs"), "/src/sub/lib.rs");
        assert_eq!(join_paths(b"/src", b"/abs", b"lib.rs"), "/abs/lib.rs");
        assert_eq!(join_paths(b"/src", b"sub", b"/abs/lib.rs"), "/abs/lib.rs");
        assert_eq!(join_paths(b"", b"", b"lib.rs"), "lib.rs");
    }
}
