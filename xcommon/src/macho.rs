//! Minimal Mach-O probing.
//!
//! Only the parts needed to pick a binary and a slice out of an app bundle
//! are decoded: the (fat) header, the file type and the encryption load
//! commands.

use anyhow::Result;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const MH_MAGIC: u32 = 0xfeed_face;
const MH_CIGAM: u32 = 0xcefa_edfe;
const MH_MAGIC_64: u32 = 0xfeed_facf;
const MH_CIGAM_64: u32 = 0xcffa_edfe;
const FAT_MAGIC: u32 = 0xcafe_babe;
const FAT_MAGIC_64: u32 = 0xcafe_babf;

/// Java class files share the fat magic. Real universal binaries never
/// carry this many slices, class files always report a larger major version.
const MAX_FAT_ARCHS: u32 = 20;

const LC_ENCRYPTION_INFO: u32 = 0x21;
const LC_ENCRYPTION_INFO_64: u32 = 0x2c;

pub const MH_EXECUTE: u32 = 0x2;
pub const MH_DYLIB: u32 = 0x6;

const CPU_ARCH_ABI64: u32 = 0x0100_0000;
const CPU_TYPE_X86: u32 = 7;
const CPU_TYPE_ARM: u32 = 12;
const CPU_SUBTYPE_MASK: u32 = 0x00ff_ffff;
const CPU_SUBTYPE_ARM_V7: u32 = 9;
const CPU_SUBTYPE_ARM_V7S: u32 = 11;
const CPU_SUBTYPE_ARM64E: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CpuArch {
    I386,
    X86_64,
    Armv7,
    Armv7s,
    Arm64,
    Arm64e,
    Other { cpu_type: u32, cpu_subtype: u32 },
}

impl CpuArch {
    /// Slice preference when a universal binary has to be narrowed down to
    /// one architecture. Device architectures come first.
    const PREFERENCE: [CpuArch; 6] = [
        Self::Arm64,
        Self::Arm64e,
        Self::Armv7s,
        Self::Armv7,
        Self::X86_64,
        Self::I386,
    ];

    pub fn from_raw(cpu_type: u32, cpu_subtype: u32) -> Self {
        let subtype = cpu_subtype & CPU_SUBTYPE_MASK;
        match (cpu_type, subtype) {
            (CPU_TYPE_X86, _) => Self::I386,
            (t, _) if t == CPU_TYPE_X86 | CPU_ARCH_ABI64 => Self::X86_64,
            (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7) => Self::Armv7,
            (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7S) => Self::Armv7s,
            (t, CPU_SUBTYPE_ARM64E) if t == CPU_TYPE_ARM | CPU_ARCH_ABI64 => Self::Arm64e,
            (t, _) if t == CPU_TYPE_ARM | CPU_ARCH_ABI64 => Self::Arm64,
            _ => Self::Other {
                cpu_type,
                cpu_subtype,
            },
        }
    }

    fn rank(self) -> usize {
        Self::PREFERENCE
            .iter()
            .position(|arch| *arch == self)
            .unwrap_or(Self::PREFERENCE.len())
    }
}

impl std::fmt::Display for CpuArch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::I386 => write!(f, "i386"),
            Self::X86_64 => write!(f, "x86_64"),
            Self::Armv7 => write!(f, "armv7"),
            Self::Armv7s => write!(f, "armv7s"),
            Self::Arm64 => write!(f, "arm64"),
            Self::Arm64e => write!(f, "arm64e"),
            Self::Other {
                cpu_type,
                cpu_subtype,
            } => write!(f, "{:#x}:{:#x}", cpu_type, cpu_subtype),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Slice {
    pub arch: CpuArch,
    pub file_type: u32,
    /// Whether an encryption load command with a non zero `cryptid` is
    /// present, as in binaries downloaded from the App Store.
    pub encrypted: bool,
}

impl Slice {
    pub fn is_executable(&self) -> bool {
        self.file_type == MH_EXECUTE
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachO {
    slices: Vec<Slice>,
}

impl MachO {
    /// Reads the headers of the file at `path`. Returns `None` if the file
    /// is not a Mach-O binary.
    pub fn probe(path: &Path) -> Result<Option<Self>> {
        let mut r = BufReader::new(File::open(path)?);
        Self::read(&mut r)
    }

    pub fn read<R: Read + Seek>(r: &mut R) -> Result<Option<Self>> {
        let magic = match r.read_u32::<BigEndian>() {
            Ok(magic) => magic,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match magic {
            FAT_MAGIC | FAT_MAGIC_64 => {
                let nfat_arch = r.read_u32::<BigEndian>()?;
                if nfat_arch == 0 || nfat_arch >= MAX_FAT_ARCHS {
                    return Ok(None);
                }
                let mut offsets = Vec::with_capacity(nfat_arch as usize);
                for _ in 0..nfat_arch {
                    let _cpu_type = r.read_u32::<BigEndian>()?;
                    let _cpu_subtype = r.read_u32::<BigEndian>()?;
                    if magic == FAT_MAGIC_64 {
                        offsets.push(r.read_u64::<BigEndian>()?);
                        let _size = r.read_u64::<BigEndian>()?;
                        let _align = r.read_u32::<BigEndian>()?;
                        let _reserved = r.read_u32::<BigEndian>()?;
                    } else {
                        offsets.push(r.read_u32::<BigEndian>()? as u64);
                        let _size = r.read_u32::<BigEndian>()?;
                        let _align = r.read_u32::<BigEndian>()?;
                    }
                }
                let mut slices = Vec::with_capacity(offsets.len());
                for offset in offsets {
                    r.seek(SeekFrom::Start(offset))?;
                    let magic = r.read_u32::<BigEndian>()?;
                    match read_thin(r, magic, offset)? {
                        Some(slice) => slices.push(slice),
                        None => anyhow::bail!("invalid fat slice at offset {}", offset),
                    }
                }
                Ok(Some(Self { slices }))
            }
            magic => Ok(read_thin(r, magic, 0)?.map(|slice| Self {
                slices: vec![slice],
            })),
        }
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn is_executable(&self) -> bool {
        self.slices.iter().any(Slice::is_executable)
    }

    /// The slice a disassembler should look at.
    pub fn preferred_slice(&self) -> Option<&Slice> {
        self.slices.iter().min_by_key(|slice| slice.arch.rank())
    }
}

/// Reads a thin header whose magic (read big endian) has already been
/// consumed. `base` is the file offset of the header.
fn read_thin<R: Read + Seek>(r: &mut R, magic: u32, base: u64) -> Result<Option<Slice>> {
    match magic {
        MH_MAGIC => read_header::<BigEndian, R>(r, base, false).map(Some),
        MH_MAGIC_64 => read_header::<BigEndian, R>(r, base, true).map(Some),
        MH_CIGAM => read_header::<LittleEndian, R>(r, base, false).map(Some),
        MH_CIGAM_64 => read_header::<LittleEndian, R>(r, base, true).map(Some),
        _ => Ok(None),
    }
}

fn read_header<B: ByteOrder, R: Read + Seek>(r: &mut R, base: u64, is_64: bool) -> Result<Slice> {
    let cpu_type = r.read_u32::<B>()?;
    let cpu_subtype = r.read_u32::<B>()?;
    let file_type = r.read_u32::<B>()?;
    let ncmds = r.read_u32::<B>()?;
    let _sizeofcmds = r.read_u32::<B>()?;
    let _flags = r.read_u32::<B>()?;
    let mut pos = base + if is_64 { 32 } else { 28 };
    let mut encrypted = false;
    for _ in 0..ncmds {
        r.seek(SeekFrom::Start(pos))?;
        let cmd = r.read_u32::<B>()?;
        let cmdsize = r.read_u32::<B>()?;
        anyhow::ensure!(cmdsize >= 8, "invalid load command size {}", cmdsize);
        if cmd == LC_ENCRYPTION_INFO || cmd == LC_ENCRYPTION_INFO_64 {
            let _cryptoff = r.read_u32::<B>()?;
            let _cryptsize = r.read_u32::<B>()?;
            let cryptid = r.read_u32::<B>()?;
            encrypted |= cryptid != 0;
        }
        pos += cmdsize as u64;
    }
    Ok(Slice {
        arch: CpuArch::from_raw(cpu_type, cpu_subtype),
        file_type,
        encrypted,
    })
}
