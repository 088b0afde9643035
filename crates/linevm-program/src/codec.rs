//! Length-prefixed binary codec matching the persisted-state layout from the
//! spec: each instruction is `(opcode_id, args_len, args, tags_len, tags)`.
//!
//! Tags are opaque to this crate, so they're serialized via `bincode`
//! (gated behind the `codec` feature, which implies `serde`) rather than
//! hand-rolled per field.

use crate::{Instruction, Program, Tag};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of input while decoding")]
    Truncated,
    #[error("tag (de)serialization failed: {0}")]
    Tag(String),
}

pub trait ToBytes {
    fn to_bytes(&self) -> Vec<u8>;
}

pub trait FromBytes: Sized {
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError>;
}

#[cfg(feature = "codec")]
impl<T> ToBytes for Instruction<T>
where
    T: Tag + serde::Serialize,
{
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.opcode_id.to_le_bytes());

        out.extend_from_slice(&(self.args.len() as u32).to_le_bytes());
        for arg in &self.args {
            out.extend_from_slice(&arg.to_le_bytes());
        }

        let tag_bytes = bincode::serialize(&self.tags).unwrap_or_default();
        out.extend_from_slice(&(tag_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&tag_bytes);

        out
    }
}

#[cfg(feature = "codec")]
impl<T> FromBytes for Instruction<T>
where
    T: Tag + serde::de::DeserializeOwned,
{
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (instr, rest) = decode_one(bytes)?;
        if !rest.is_empty() {
            return Err(CodecError::Truncated);
        }
        Ok(instr)
    }
}

#[cfg(feature = "codec")]
fn decode_one<T>(bytes: &[u8]) -> Result<(Instruction<T>, &[u8]), CodecError>
where
    T: Tag + serde::de::DeserializeOwned,
{
    let mut cursor = bytes;

    let opcode_id = take_u32(&mut cursor)?;

    let args_len = take_u32(&mut cursor)? as usize;
    let mut args = Vec::with_capacity(args_len);
    for _ in 0..args_len {
        args.push(take_i32(&mut cursor)?);
    }

    let tags_len = take_u32(&mut cursor)? as usize;
    if cursor.len() < tags_len {
        return Err(CodecError::Truncated);
    }
    let (tag_bytes, rest) = cursor.split_at(tags_len);
    let tags: Vec<T> =
        bincode::deserialize(tag_bytes).map_err(|e| CodecError::Tag(e.to_string()))?;

    Ok((Instruction::new(opcode_id, args, tags), rest))
}

fn take_u32<'a>(cursor: &mut &'a [u8]) -> Result<u32, CodecError> {
    if cursor.len() < 4 {
        return Err(CodecError::Truncated);
    }
    let (head, tail) = cursor.split_at(4);
    *cursor = tail;
    Ok(u32::from_le_bytes(head.try_into().unwrap()))
}

fn take_i32<'a>(cursor: &mut &'a [u8]) -> Result<i32, CodecError> {
    take_u32(cursor).map(|v| v as i32)
}

#[cfg(feature = "codec")]
impl<T> ToBytes for Program<T>
where
    T: Tag + serde::Serialize,
{
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.size() as u32).to_le_bytes());
        for pos in self.iter_positions() {
            out.extend_from_slice(&self[pos].to_bytes());
        }
        out
    }
}

#[cfg(feature = "codec")]
impl<T> FromBytes for Program<T>
where
    T: Tag + serde::de::DeserializeOwned,
{
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = bytes;
        let count = take_u32(&mut cursor)? as usize;
        let mut instructions = Vec::with_capacity(count);
        for _ in 0..count {
            let (instr, rest) = decode_one(cursor)?;
            instructions.push(instr);
            cursor = rest;
        }
        Ok(Program::from_instructions(instructions))
    }
}
