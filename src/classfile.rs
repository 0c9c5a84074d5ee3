//! Raw `.class` binary format deserialization (JVMS §4).
//!
//! This is the loader the core consumes but does not specify: it reads
//! the big-endian class file structure into an in-memory mirror of the
//! format, tag for tag, without interpreting any of it. Constant-pool
//! tags the interpreter never reads (`Class`, `Fieldref`,
//! `NameAndType`, ...) are still deserialized structurally so that
//! ordinary `javac` output (which emits a `Fieldref` for
//! `System.out` even though `getstatic` is a no-op here) parses
//! without failing.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{JvmError, Result};

const MAGIC: u32 = 0xCAFEBABE;

#[derive(Debug)]
pub struct RawClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: Vec<CpInfo>,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub enum CpInfo {
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    /// The slot following an 8-byte constant (`Long`/`Double`), unused per JVMS §4.4.5.
    Unusable,
}

#[derive(Debug)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub info: Vec<u8>,
}

fn read_cp_info(rdr: &mut Cursor<Vec<u8>>) -> Result<CpInfo> {
    let tag = rdr.read_u8()?;
    Ok(match tag {
        1 => {
            let length = rdr.read_u16::<BigEndian>()?;
            let mut buf = vec![0u8; length as usize];
            rdr.read_exact(&mut buf)?;
            CpInfo::Utf8(buf)
        }
        3 => CpInfo::Integer(rdr.read_u32::<BigEndian>()?),
        4 => CpInfo::Float(rdr.read_u32::<BigEndian>()?),
        5 => CpInfo::Long(rdr.read_u64::<BigEndian>()?),
        6 => CpInfo::Double(rdr.read_u64::<BigEndian>()?),
        7 => CpInfo::Class { name_index: rdr.read_u16::<BigEndian>()? },
        8 => CpInfo::String { string_index: rdr.read_u16::<BigEndian>()? },
        9 => CpInfo::Fieldref {
            class_index: rdr.read_u16::<BigEndian>()?,
            name_and_type_index: rdr.read_u16::<BigEndian>()?,
        },
        10 => CpInfo::Methodref {
            class_index: rdr.read_u16::<BigEndian>()?,
            name_and_type_index: rdr.read_u16::<BigEndian>()?,
        },
        11 => CpInfo::InterfaceMethodref {
            class_index: rdr.read_u16::<BigEndian>()?,
            name_and_type_index: rdr.read_u16::<BigEndian>()?,
        },
        12 => CpInfo::NameAndType {
            name_index: rdr.read_u16::<BigEndian>()?,
            descriptor_index: rdr.read_u16::<BigEndian>()?,
        },
        15 => CpInfo::MethodHandle {
            reference_kind: rdr.read_u8()?,
            reference_index: rdr.read_u16::<BigEndian>()?,
        },
        16 => CpInfo::MethodType { descriptor_index: rdr.read_u16::<BigEndian>()? },
        18 => CpInfo::InvokeDynamic {
            bootstrap_method_attr_index: rdr.read_u16::<BigEndian>()?,
            name_and_type_index: rdr.read_u16::<BigEndian>()?,
        },
        other => {
            return Err(JvmError::MalformedClass(format!(
                "unknown constant pool tag {other}"
            )))
        }
    })
}

fn read_attributes(rdr: &mut Cursor<Vec<u8>>, count: u16) -> Result<Vec<AttributeInfo>> {
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let attribute_name_index = rdr.read_u16::<BigEndian>()?;
        let attribute_length = rdr.read_u32::<BigEndian>()?;
        let mut info = vec![0u8; attribute_length as usize];
        rdr.read_exact(&mut info)?;
        attributes.push(AttributeInfo { attribute_name_index, info });
    }
    Ok(attributes)
}

fn read_member(rdr: &mut Cursor<Vec<u8>>) -> Result<MemberInfo> {
    let access_flags = rdr.read_u16::<BigEndian>()?;
    let name_index = rdr.read_u16::<BigEndian>()?;
    let descriptor_index = rdr.read_u16::<BigEndian>()?;
    let attributes_count = rdr.read_u16::<BigEndian>()?;
    let attributes = read_attributes(rdr, attributes_count)?;
    Ok(MemberInfo { access_flags, name_index, descriptor_index, attributes })
}

pub fn load(path: impl AsRef<Path>) -> Result<RawClassFile> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    parse_bytes(buffer)
}

pub fn parse_bytes(buffer: Vec<u8>) -> Result<RawClassFile> {
    let mut rdr = Cursor::new(buffer);

    let magic = rdr.read_u32::<BigEndian>()?;
    if magic != MAGIC {
        return Err(JvmError::MalformedClass(format!(
            "bad magic 0x{magic:08x}, expected 0x{MAGIC:08x}"
        )));
    }

    let minor_version = rdr.read_u16::<BigEndian>()?;
    let major_version = rdr.read_u16::<BigEndian>()?;
    if major_version > 55 {
        return Err(JvmError::MalformedClass(format!(
            "unsupported major_version {major_version} (this interpreter supports up to Java 11, major 55)"
        )));
    }

    let constant_pool_count = rdr.read_u16::<BigEndian>()?;
    let mut constant_pool = Vec::with_capacity(constant_pool_count as usize);
    let mut i = 1u16;
    while i < constant_pool_count {
        let entry = read_cp_info(&mut rdr)?;
        let wide = matches!(entry, CpInfo::Long(_) | CpInfo::Double(_));
        constant_pool.push(entry);
        i += 1;
        if wide {
            // Long/Double occupy two constant pool slots (JVMS §4.4.5).
            constant_pool.push(CpInfo::Unusable);
            i += 1;
        }
    }

    let access_flags = rdr.read_u16::<BigEndian>()?;
    let this_class = rdr.read_u16::<BigEndian>()?;
    let super_class = rdr.read_u16::<BigEndian>()?;

    let interfaces_count = rdr.read_u16::<BigEndian>()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(rdr.read_u16::<BigEndian>()?);
    }

    let fields_count = rdr.read_u16::<BigEndian>()?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        fields.push(read_member(&mut rdr)?);
    }

    let methods_count = rdr.read_u16::<BigEndian>()?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    for _ in 0..methods_count {
        methods.push(read_member(&mut rdr)?);
    }

    let attributes_count = rdr.read_u16::<BigEndian>()?;
    let attributes = read_attributes(&mut rdr, attributes_count)?;

    Ok(RawClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds the smallest legal class file byte buffer: no fields, no methods,
    /// a constant pool holding only the two Class entries this_class/super_class need.
    fn minimal_class_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // minor
        buf.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)
        buf.extend_from_slice(&4u16.to_be_bytes()); // constant_pool_count (3 entries + 1)
        // #1 Utf8 "Main"
        buf.push(1);
        buf.extend_from_slice(&4u16.to_be_bytes());
        buf.extend_from_slice(b"Main");
        // #2 Class -> #1
        buf.push(7);
        buf.extend_from_slice(&1u16.to_be_bytes());
        // #3 Utf8 "java/lang/Object"
        buf.push(1);
        buf.extend_from_slice(&16u16.to_be_bytes());
        buf.extend_from_slice(b"java/lang/Object");
        buf.extend_from_slice(&0u16.to_be_bytes()); // access_flags
        buf.extend_from_slice(&2u16.to_be_bytes()); // this_class -> #2
        buf.extend_from_slice(&2u16.to_be_bytes()); // super_class -> #2 (doesn't matter, unused)
        buf.extend_from_slice(&0u16.to_be_bytes()); // interfaces_count
        buf.extend_from_slice(&0u16.to_be_bytes()); // fields_count
        buf.extend_from_slice(&0u16.to_be_bytes()); // methods_count
        buf.extend_from_slice(&0u16.to_be_bytes()); // attributes_count
        buf
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_class_bytes();
        bytes[0] = 0;
        assert!(matches!(parse_bytes(bytes), Err(JvmError::MalformedClass(_))));
    }

    #[test]
    fn rejects_too_new_major_version() {
        let mut bytes = minimal_class_bytes();
        bytes[6..8].copy_from_slice(&99u16.to_be_bytes());
        assert!(matches!(parse_bytes(bytes), Err(JvmError::MalformedClass(_))));
    }

    #[test]
    fn parses_minimal_class() {
        let class = parse_bytes(minimal_class_bytes()).expect("should parse");
        assert_eq!(class.constant_pool.len(), 3);
        assert!(matches!(class.constant_pool[1], CpInfo::Class { name_index: 1 }));
        assert_eq!(class.methods.len(), 0);
    }

    #[test]
    fn long_constant_occupies_two_slots() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&52u16.to_be_bytes());
        buf.extend_from_slice(&3u16.to_be_bytes()); // count = 3 (1 long takes slots #1 and #2)
        buf.push(5); // CONSTANT_Long
        buf.extend_from_slice(&42u64.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // access_flags
        buf.extend_from_slice(&0u16.to_be_bytes()); // this_class (unused by this test)
        buf.extend_from_slice(&0u16.to_be_bytes()); // super_class
        buf.extend_from_slice(&0u16.to_be_bytes()); // interfaces_count
        buf.extend_from_slice(&0u16.to_be_bytes()); // fields_count
        buf.extend_from_slice(&0u16.to_be_bytes()); // methods_count
        buf.extend_from_slice(&0u16.to_be_bytes()); // attributes_count
        let class = parse_bytes(buf).expect("should parse");
        assert_eq!(class.constant_pool.len(), 2);
        assert!(matches!(class.constant_pool[1], CpInfo::Unusable));
    }
}
