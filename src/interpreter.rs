//! The fetch-dispatch-execute loop.
//!
//! `execute` runs one method to completion, recursing into itself for
//! `invokestatic`. State is exactly `(pc, stack, locals, heap)`; there is
//! no explicit state machine beyond the program counter.

use tracing::{debug, trace};

use crate::class::ClassView;
use crate::error::{JvmError, Result};
use crate::frame::Frame;
use crate::heap::Heap;
use crate::opcodes::*;

fn byte_at(code: &[u8], pc: usize) -> Result<u8> {
    code.get(pc).copied().ok_or(JvmError::TruncatedInstruction { pc })
}

fn sign_extend_i16(high: u8, low: u8) -> i16 {
    (((high as u16) << 8) | low as u16) as i16
}

/// Runs `method` to completion and returns its return value (`None` for
/// void, `Some` for `ireturn`/`areturn`).
pub fn execute(
    method: &crate::class::Method,
    args: &[i32],
    class: &ClassView,
    heap: &mut Heap,
) -> Result<Option<i32>> {
    debug!(method = %method.name, args = ?args, "entering frame");
    let mut frame = Frame::new(method, args);
    let code = &method.code;

    while frame.pc < code.len() {
        let opcode = byte_at(code, frame.pc)?;
        trace!(pc = frame.pc, opcode = %format!("0x{opcode:02x}"), sp = frame.stack_depth(), "dispatch");

        match opcode {
            NOP => {
                frame.pc += 1;
            }

            ICONST_M1..=ICONST_5 => {
                frame.push(opcode as i32 - ICONST_0 as i32)?;
                frame.pc += 1;
            }

            BIPUSH => {
                let value = byte_at(code, frame.pc + 1)? as i8 as i32;
                frame.push(value)?;
                frame.pc += 2;
            }

            SIPUSH => {
                let b1 = byte_at(code, frame.pc + 1)?;
                let b2 = byte_at(code, frame.pc + 2)?;
                frame.push(sign_extend_i16(b1, b2) as i32)?;
                frame.pc += 3;
            }

            LDC => {
                let index = byte_at(code, frame.pc + 1)? as u16;
                frame.push(class.integer_constant(index)?)?;
                frame.pc += 2;
            }

            ILOAD | ALOAD => {
                let index = byte_at(code, frame.pc + 1)? as usize;
                frame.push(frame.local(index)?)?;
                frame.pc += 2;
            }

            ILOAD_0..=ILOAD_3 => {
                let index = (opcode - ILOAD_0) as usize;
                frame.push(frame.local(index)?)?;
                frame.pc += 1;
            }

            ALOAD_0..=ALOAD_3 => {
                let index = (opcode - ALOAD_0) as usize;
                frame.push(frame.local(index)?)?;
                frame.pc += 1;
            }

            ISTORE | ASTORE => {
                let index = byte_at(code, frame.pc + 1)? as usize;
                let value = frame.pop()?;
                frame.set_local(index, value)?;
                frame.pc += 2;
            }

            ISTORE_0..=ISTORE_3 => {
                let index = (opcode - ISTORE_0) as usize;
                let value = frame.pop()?;
                frame.set_local(index, value)?;
                frame.pc += 1;
            }

            ASTORE_0..=ASTORE_3 => {
                let index = (opcode - ASTORE_0) as usize;
                let value = frame.pop()?;
                frame.set_local(index, value)?;
                frame.pc += 1;
            }

            IINC => {
                let index = byte_at(code, frame.pc + 1)? as usize;
                let delta = byte_at(code, frame.pc + 2)? as i8 as i32;
                let value = frame.local(index)?;
                frame.set_local(index, value.wrapping_add(delta))?;
                frame.pc += 3;
            }

            IADD => binary_op(&mut frame, |a, b| a.wrapping_add(b))?,
            ISUB => binary_op(&mut frame, |a, b| a.wrapping_sub(b))?,
            IMUL => binary_op(&mut frame, |a, b| a.wrapping_mul(b))?,

            IDIV => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                if b == 0 {
                    return Err(JvmError::DivideByZero);
                }
                frame.push(a.wrapping_div(b))?;
                frame.pc += 1;
            }

            IREM => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                if b == 0 {
                    return Err(JvmError::DivideByZero);
                }
                frame.push(a.wrapping_rem(b))?;
                frame.pc += 1;
            }

            INEG => {
                let a = frame.pop()?;
                frame.push(a.wrapping_neg())?;
                frame.pc += 1;
            }

            ISHL => binary_op(&mut frame, |a, b| a.wrapping_shl(b as u32 & 31))?,
            ISHR => binary_op(&mut frame, |a, b| a.wrapping_shr(b as u32 & 31))?,
            IUSHR => binary_op(&mut frame, |a, b| {
                ((a as u32).wrapping_shr(b as u32 & 31)) as i32
            })?,
            IAND => binary_op(&mut frame, |a, b| a & b)?,
            IOR => binary_op(&mut frame, |a, b| a | b)?,
            IXOR => binary_op(&mut frame, |a, b| a ^ b)?,

            DUP => {
                frame.push(frame.peek()?)?;
                frame.pc += 1;
            }

            IFEQ..=IFLE => {
                let value = frame.pop()?;
                let taken = match opcode {
                    IFEQ => value == 0,
                    0x9a => value != 0, // ifne
                    0x9b => value < 0,  // iflt
                    0x9c => value >= 0, // ifge
                    0x9d => value > 0,  // ifgt
                    IFLE => value <= 0,
                    _ => unreachable!(),
                };
                branch_or_skip(&mut frame, code, taken)?;
            }

            IF_ICMPEQ..=IF_ICMPLE => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let taken = match opcode {
                    IF_ICMPEQ => a == b,
                    0xa0 => a != b, // if_icmpne
                    0xa1 => a < b,  // if_icmplt
                    0xa2 => a >= b, // if_icmpge
                    0xa3 => a > b,  // if_icmpgt
                    IF_ICMPLE => a <= b,
                    _ => unreachable!(),
                };
                branch_or_skip(&mut frame, code, taken)?;
            }

            GOTO => {
                let b1 = byte_at(code, frame.pc + 1)?;
                let b2 = byte_at(code, frame.pc + 2)?;
                let offset = sign_extend_i16(b1, b2) as i64;
                frame.pc = (frame.pc as i64 + offset) as usize;
            }

            RETURN => {
                debug!(method = %method.name, "leaving frame (void)");
                return Ok(None);
            }

            IRETURN | ARETURN => {
                let value = frame.pop()?;
                debug!(method = %method.name, value, "leaving frame");
                return Ok(Some(value));
            }

            GETSTATIC => {
                // Modeled only as the receiver half of System.out.println(int); the
                // field itself is never materialized.
                frame.pc += 3;
            }

            INVOKEVIRTUAL => {
                let value = frame.pop()?;
                println!("{value}");
                frame.pc += 3;
            }

            INVOKESTATIC => {
                let b1 = byte_at(code, frame.pc + 1)?;
                let b2 = byte_at(code, frame.pc + 2)?;
                let index = ((b1 as u16) << 8) | b2 as u16;

                let callee = class.method_from_constant_index(index)?;
                let param_count = callee.descriptor.parameter_count as usize;
                let mut callee_args = vec![0i32; param_count];
                for slot in callee_args.iter_mut().rev() {
                    *slot = frame.pop()?;
                }

                let result = execute(callee, &callee_args, class, heap)?;
                if let Some(value) = result {
                    frame.push(value)?;
                }
                frame.pc += 3;
            }

            NEWARRAY => {
                let length = frame.pop()?;
                let reference = heap.new_int_array(length);
                frame.push(reference)?;
                frame.pc += 2;
            }

            ARRAYLENGTH => {
                let reference = frame.pop()?;
                frame.push(heap.array_length(reference)?)?;
                frame.pc += 1;
            }

            IASTORE => {
                let value = frame.pop()?;
                let index = frame.pop()?;
                let reference = frame.pop()?;
                heap.array_store(reference, index, value)?;
                frame.pc += 1;
            }

            IALOAD => {
                let index = frame.pop()?;
                let reference = frame.pop()?;
                frame.push(heap.array_load(reference, index)?)?;
                frame.pc += 1;
            }

            other => return Err(JvmError::UnknownOpcode { opcode: other, pc: frame.pc }),
        }
    }

    // Well-formed methods always return explicitly; falling off the end is
    // treated as a defensive void return.
    Ok(None)
}

fn binary_op(frame: &mut Frame, f: impl FnOnce(i32, i32) -> i32) -> Result<()> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    frame.push(f(a, b))?;
    frame.pc += 1;
    Ok(())
}

/// Conditional branch opcodes are always 3 bytes (opcode + signed 16-bit
/// offset); the offset is relative to the branch opcode's own address.
fn branch_or_skip(frame: &mut Frame, code: &[u8], taken: bool) -> Result<()> {
    if taken {
        let branch_pc = frame.pc;
        let b1 = byte_at(code, branch_pc + 1)?;
        let b2 = byte_at(code, branch_pc + 2)?;
        let offset = sign_extend_i16(b1, b2) as i64;
        frame.pc = (branch_pc as i64 + offset) as usize;
    } else {
        frame.pc += 3;
    }
    Ok(())
}
