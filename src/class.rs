//! The read-only class view the interpreter consumes.
//!
//! Resolves the raw, tag-indexed constant pool produced by
//! [`crate::classfile`] into a small set of constants the core actually
//! cares about, and the method table into [`Method`] records carrying
//! already-parsed descriptors and the raw `Code` attribute bytes.

use std::fmt;

use crate::classfile::{AttributeInfo, CpInfo, MemberInfo, RawClassFile};
use crate::error::{JvmError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Class { name: String },
    MethodRef { class_name: String, name: String, descriptor: String },
    /// Kept only so unrelated constant pool slots resolve without error;
    /// the core never reads one.
    Other,
}

/// A method's parsed `(param_types)return_type` descriptor (JVMS §4.3.3).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub raw: String,
    pub parameter_count: u16,
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Counts the top-level parameter types in a method descriptor string,
/// e.g. `(I[II)V` has 3 parameters: `I`, `[I`, `I`.
pub fn parse_parameter_count(descriptor: &str) -> Result<u16> {
    let body = descriptor
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(|| JvmError::MalformedClass(format!("bad method descriptor `{descriptor}`")))?;

    let mut count = 0u16;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                // Array prefixes count toward the single parameter they qualify, not
                // an extra parameter of their own; skip them and count the base type.
                continue;
            }
            'L' => {
                // Reference type: consume up to and including the terminating ';'.
                while chars.next().map(|c| c != ';').unwrap_or(false) {}
                count += 1;
            }
            'I' | 'B' | 'C' | 'S' | 'Z' | 'J' | 'F' | 'D' => count += 1,
            other => {
                return Err(JvmError::MalformedClass(format!(
                    "unrecognized descriptor character `{other}` in `{descriptor}`"
                )))
            }
        }
    }
    Ok(count)
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
}

pub struct ClassView {
    pub name: String,
    constant_pool: Vec<Constant>,
    methods: Vec<Method>,
}

fn utf8_at(pool: &[CpInfo], index: u16) -> Result<String> {
    let idx = index as usize;
    match pool.get(idx.wrapping_sub(1)) {
        Some(CpInfo::Utf8(bytes)) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        Some(_) => Err(JvmError::MalformedClass(format!(
            "constant pool entry {index} is not Utf8"
        ))),
        None => Err(JvmError::ConstantPoolIndexOutOfBounds { index: idx, size: pool.len() }),
    }
}

fn class_name_at(pool: &[CpInfo], index: u16) -> Result<String> {
    let idx = index as usize;
    match pool.get(idx.wrapping_sub(1)) {
        Some(CpInfo::Class { name_index }) => utf8_at(pool, *name_index),
        Some(_) => Err(JvmError::MalformedClass(format!(
            "constant pool entry {index} is not a Class"
        ))),
        None => Err(JvmError::ConstantPoolIndexOutOfBounds { index: idx, size: pool.len() }),
    }
}

fn resolve_constant(pool: &[CpInfo], raw: &CpInfo) -> Result<Constant> {
    Ok(match raw {
        CpInfo::Utf8(bytes) => Constant::Utf8(String::from_utf8_lossy(bytes).into_owned()),
        CpInfo::Integer(bits) => Constant::Integer(*bits as i32),
        CpInfo::Class { name_index } => Constant::Class { name: utf8_at(pool, *name_index)? },
        CpInfo::Methodref { class_index, name_and_type_index } => {
            let class_name = class_name_at(pool, *class_index)?;
            let (name, descriptor) = name_and_type_at(pool, *name_and_type_index)?;
            Constant::MethodRef { class_name, name, descriptor }
        }
        _ => Constant::Other,
    })
}

fn name_and_type_at(pool: &[CpInfo], index: u16) -> Result<(String, String)> {
    let idx = index as usize;
    match pool.get(idx.wrapping_sub(1)) {
        Some(CpInfo::NameAndType { name_index, descriptor_index }) => {
            Ok((utf8_at(pool, *name_index)?, utf8_at(pool, *descriptor_index)?))
        }
        Some(_) => Err(JvmError::MalformedClass(format!(
            "constant pool entry {index} is not a NameAndType"
        ))),
        None => Err(JvmError::ConstantPoolIndexOutOfBounds { index: idx, size: pool.len() }),
    }
}

fn find_code_attribute<'a>(
    attributes: &'a [AttributeInfo],
    pool: &[CpInfo],
) -> Result<Option<&'a AttributeInfo>> {
    for attr in attributes {
        if utf8_at(pool, attr.attribute_name_index)? == "Code" {
            return Ok(Some(attr));
        }
    }
    Ok(None)
}

fn parse_method(info: &MemberInfo, pool: &[CpInfo]) -> Result<Method> {
    use byteorder::{BigEndian, ReadBytesExt};
    use std::io::Cursor;

    let name = utf8_at(pool, info.name_index)?;
    let raw_descriptor = utf8_at(pool, info.descriptor_index)?;
    let parameter_count = parse_parameter_count(&raw_descriptor)?;
    let descriptor = MethodDescriptor { raw: raw_descriptor, parameter_count };

    let code_attr = find_code_attribute(&info.attributes, pool)?;
    let (max_stack, max_locals, code) = match code_attr {
        Some(attr) => {
            let mut rdr = Cursor::new(&attr.info);
            let max_stack = rdr.read_u16::<BigEndian>()?;
            let max_locals = rdr.read_u16::<BigEndian>()?;
            let code_length = rdr.read_u32::<BigEndian>()?;
            let mut code = vec![0u8; code_length as usize];
            std::io::Read::read_exact(&mut rdr, &mut code)?;
            (max_stack, max_locals, code)
        }
        // Native/abstract methods have no Code attribute; this subset never calls them.
        None => (0, 0, Vec::new()),
    };

    Ok(Method { name, descriptor, max_stack, max_locals, code })
}

impl ClassView {
    pub fn from_raw(raw: RawClassFile) -> Result<ClassView> {
        let name = class_name_at(&raw.constant_pool, raw.this_class)?;

        let mut constant_pool = Vec::with_capacity(raw.constant_pool.len());
        for entry in &raw.constant_pool {
            constant_pool.push(resolve_constant(&raw.constant_pool, entry)?);
        }

        let mut methods = Vec::with_capacity(raw.methods.len());
        for method_info in &raw.methods {
            methods.push(parse_method(method_info, &raw.constant_pool)?);
        }

        Ok(ClassView { name, constant_pool, methods })
    }

    /// Linear scan over the method table by name and descriptor.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor.raw == descriptor)
    }

    /// Resolves a `CONSTANT_Methodref` at 1-based constant pool index `index`
    /// to the corresponding method in this class.
    pub fn method_from_constant_index(&self, index: u16) -> Result<&Method> {
        let idx = index as usize;
        let constant = self
            .constant_pool
            .get(idx.wrapping_sub(1))
            .ok_or(JvmError::ConstantPoolIndexOutOfBounds { index: idx, size: self.constant_pool.len() })?;

        let Constant::MethodRef { name, descriptor, .. } = constant else {
            return Err(JvmError::NotAMethodRef { index: idx });
        };

        self.find_method(name, descriptor)
            .ok_or_else(|| JvmError::MethodNotFound { name: name.clone() })
    }

    /// Returns the `bytes` field of the `CONSTANT_Integer` at 1-based index `index`.
    pub fn integer_constant(&self, index: u16) -> Result<i32> {
        let idx = index as usize;
        match self.constant_pool.get(idx.wrapping_sub(1)) {
            Some(Constant::Integer(value)) => Ok(*value),
            Some(_) => Err(JvmError::NotAnInteger { index: idx }),
            None => Err(JvmError::ConstantPoolIndexOutOfBounds { index: idx, size: self.constant_pool.len() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_count_counts_arrays_once() {
        assert_eq!(parse_parameter_count("([Ljava/lang/String;)V").unwrap(), 1);
        assert_eq!(parse_parameter_count("(II)I").unwrap(), 2);
        assert_eq!(parse_parameter_count("([I[II)V").unwrap(), 3);
        assert_eq!(parse_parameter_count("()V").unwrap(), 0);
    }

    #[test]
    fn parameter_count_rejects_junk() {
        assert!(parse_parameter_count("(Q)V").is_err());
    }
}
