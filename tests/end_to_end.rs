//! Crate-level scenarios assembled directly against `ClassView`/`execute`,
//! bypassing the loader entirely (no `.class` fixture files needed).

use tinyjvm::class::ClassView;
use tinyjvm::classfile::{AttributeInfo, CpInfo, MemberInfo, RawClassFile};
use tinyjvm::heap::Heap;
use tinyjvm::interpreter::execute;
use tinyjvm::opcodes::*;

fn code_attribute_bytes(max_stack: u16, max_locals: u16, code: &[u8]) -> Vec<u8> {
    let mut info = Vec::new();
    info.extend_from_slice(&max_stack.to_be_bytes());
    info.extend_from_slice(&max_locals.to_be_bytes());
    info.extend_from_slice(&(code.len() as u32).to_be_bytes());
    info.extend_from_slice(code);
    info
}

/// A class with a single static method, built the way `main.rs` builds one
/// from a loaded file: constant pool -> methods -> `ClassView::from_raw`.
fn single_method_class(name: &str, descriptor: &str, max_stack: u16, max_locals: u16, code: Vec<u8>) -> ClassView {
    let raw = RawClassFile {
        minor_version: 0,
        major_version: 52,
        constant_pool: vec![
            CpInfo::Utf8(b"Main".to_vec()),
            CpInfo::Class { name_index: 1 },
            CpInfo::Utf8(name.as_bytes().to_vec()),
            CpInfo::Utf8(descriptor.as_bytes().to_vec()),
            CpInfo::Utf8(b"Code".to_vec()),
        ],
        access_flags: 0,
        this_class: 2,
        super_class: 2,
        interfaces: vec![],
        fields: vec![],
        methods: vec![MemberInfo {
            access_flags: 0x0009,
            name_index: 3,
            descriptor_index: 4,
            attributes: vec![AttributeInfo {
                attribute_name_index: 5,
                info: code_attribute_bytes(max_stack, max_locals, &code),
            }],
        }],
        attributes: vec![],
    };
    ClassView::from_raw(raw).unwrap()
}

#[test]
fn main_with_no_body_returns_cleanly() {
    let code = vec![RETURN];
    let class = single_method_class("main", "([Ljava/lang/String;)V", 0, 1, code);
    let method = class.find_method("main", "([Ljava/lang/String;)V").unwrap();
    let mut heap = Heap::new();
    let result = execute(method, &[0], &class, &mut heap).unwrap();
    assert_eq!(result, None);
}

#[test]
fn dup_iadd_doubles_the_top_of_stack() {
    // bipush 21; dup; iadd; ireturn
    let code = vec![BIPUSH, 21, DUP, IADD, IRETURN];
    let class = single_method_class("compute", "()I", 2, 0, code);
    let method = class.find_method("compute", "()I").unwrap();
    let mut heap = Heap::new();
    assert_eq!(execute(method, &[], &class, &mut heap).unwrap(), Some(42));
}

#[test]
fn newarray_store_then_load_round_trips_through_the_heap() {
    // bipush 3; newarray int; dup; iconst_1; bipush 7; iastore; iconst_1; iaload; ireturn
    let code = vec![
        BIPUSH, 3, NEWARRAY, 10, DUP, ICONST_0 + 1, BIPUSH, 7, IASTORE, ICONST_0 + 1, IALOAD, IRETURN,
    ];
    let class = single_method_class("compute", "()I", 4, 0, code);
    let method = class.find_method("compute", "()I").unwrap();
    let mut heap = Heap::new();
    assert_eq!(execute(method, &[], &class, &mut heap).unwrap(), Some(7));
}

#[test]
fn unknown_opcode_surfaces_as_a_typed_error() {
    let code = vec![0xff];
    let class = single_method_class("compute", "()V", 0, 0, code);
    let method = class.find_method("compute", "()V").unwrap();
    let mut heap = Heap::new();
    let err = execute(method, &[], &class, &mut heap).unwrap_err();
    assert!(matches!(err, tinyjvm::error::JvmError::UnknownOpcode { opcode: 0xff, pc: 0 }));
}

#[test]
fn division_by_zero_is_fatal_not_a_panic() {
    let code = vec![ICONST_0 + 1, ICONST_0, IDIV, IRETURN];
    let class = single_method_class("compute", "()I", 2, 0, code);
    let method = class.find_method("compute", "()I").unwrap();
    let mut heap = Heap::new();
    let err = execute(method, &[], &class, &mut heap).unwrap_err();
    assert!(matches!(err, tinyjvm::error::JvmError::DivideByZero));
}

#[test]
fn method_lookup_is_exact_on_name_and_descriptor() {
    let class = single_method_class("add", "(II)I", 2, 2, vec![ILOAD_0, ILOAD_0, IADD, IRETURN]);
    assert!(class.find_method("add", "(II)I").is_some());
    assert!(class.find_method("add", "(I)I").is_none());
    assert!(class.find_method("sub", "(II)I").is_none());
}
