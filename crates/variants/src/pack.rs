//! Serializes a finished batch into the binary shader container and reads
//! it back. One container holds one base shader for one stage: the global
//! parameter tables shared by every variation, then each variation's name,
//! parameter-presence flags, and bytecode.
//!
//! The presence flags are positional against the global tables rather than
//! self-describing; a reader must parse the tables first to know how many
//! flags follow per job. That keeps per-job records compact at the cost of
//! sequential, stateful parsing.
//!
//! All integers are little-endian and strings are u32-length-prefixed
//! UTF-8. Bytecode is stored verbatim, except that the packer strips the
//! backend's debug-comment block (see `strip_debug_comments`) unless told
//! otherwise.
use std::borrow::Cow;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::backend::ShaderModel;
use crate::registry::{ParamRegistry, Parameter};
use crate::spec::CompileJob;
use crate::ShaderStage;

pub const CONTAINER_MAGIC: &[u8; 4] = b"SHDB";

/// Comment token opcode in a D3D9 shader token stream.
const COMMENT_OPCODE: u32 = 0xfffe;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("bad container magic")]
    BadMagic,

    #[error("unknown stage code {0}")]
    UnknownStage(u16),

    #[error("unknown shader model tier {0}")]
    UnknownTier(u16),

    #[error("string payload is not valid UTF-8")]
    BadString(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Writes the container to `path`, creating parent directories. Callers
/// must only reach this point with a fully validated, error-free batch; a
/// failed batch never produces a partial output file.
pub fn pack_batch(
    path: &Path,
    stage: ShaderStage,
    model: ShaderModel,
    registry: &ParamRegistry,
    jobs: &[CompileJob],
    strip_comments: bool,
) -> Result<(), PackError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(fs::File::create(path)?);
    write_container(&mut out, stage, model, registry, jobs, strip_comments)?;
    out.flush()?;
    Ok(())
}

pub fn write_container<W: Write>(
    out: &mut W,
    stage: ShaderStage,
    model: ShaderModel,
    registry: &ParamRegistry,
    jobs: &[CompileJob],
    strip_comments: bool,
) -> Result<(), PackError> {
    // Freeze the registry sets into vectors; presence flags below index
    // into these in the same order.
    let constants: Vec<&Parameter> = registry.constants.iter().collect();
    let texture_units: Vec<&Parameter> = registry.texture_units.iter().collect();

    out.write_all(CONTAINER_MAGIC)?;
    write_u16(out, stage.code())?;
    write_u16(out, model.tier())?;

    write_u32(out, constants.len() as u32)?;
    for parameter in &constants {
        write_string(out, &parameter.name)?;
        out.write_all(&[parameter.register as u8])?;
    }

    write_u32(out, texture_units.len() as u32)?;
    for parameter in &texture_units {
        write_string(out, &parameter.name)?;
        out.write_all(&[parameter.register as u8])?;
    }

    write_u32(out, jobs.len() as u32)?;
    for job in jobs {
        write_string(out, &job.name)?;
        for parameter in &constants {
            out.write_all(&[u8::from(job.constants.contains(*parameter))])?;
        }
        for parameter in &texture_units {
            out.write_all(&[u8::from(job.texture_units.contains(*parameter))])?;
        }

        let bytecode: Cow<'_, [u8]> = if strip_comments {
            Cow::Owned(strip_debug_comments(&job.bytecode))
        } else {
            Cow::Borrowed(&job.bytecode)
        };
        write_u32(out, bytecode.len() as u32)?;
        out.write_all(&bytecode)?;
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedJob {
    pub name: String,
    pub constants_present: Vec<bool>,
    pub texture_units_present: Vec<bool>,
    pub bytecode: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PackedBatch {
    pub stage: ShaderStage,
    pub model: ShaderModel,
    pub constants: Vec<Parameter>,
    pub texture_units: Vec<Parameter>,
    pub jobs: Vec<PackedJob>,
}

pub fn read_container<R: Read>(input: &mut R) -> Result<PackedBatch, PackError> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if &magic != CONTAINER_MAGIC {
        return Err(PackError::BadMagic);
    }

    let stage_code = read_u16(input)?;
    let stage = ShaderStage::from_code(stage_code).ok_or(PackError::UnknownStage(stage_code))?;
    let tier = read_u16(input)?;
    let model = ShaderModel::from_tier(tier).ok_or(PackError::UnknownTier(tier))?;

    let constants = read_parameter_table(input)?;
    let texture_units = read_parameter_table(input)?;

    let job_count = read_u32(input)? as usize;
    let mut jobs = Vec::with_capacity(job_count);
    for _ in 0..job_count {
        let name = read_string(input)?;
        let constants_present = read_flags(input, constants.len())?;
        let texture_units_present = read_flags(input, texture_units.len())?;
        let bytecode_len = read_u32(input)? as usize;
        let mut bytecode = vec![0u8; bytecode_len];
        input.read_exact(&mut bytecode)?;
        jobs.push(PackedJob {
            name,
            constants_present,
            texture_units_present,
            bytecode,
        });
    }

    Ok(PackedBatch {
        stage,
        model,
        constants,
        texture_units,
        jobs,
    })
}

/// Drops the backend-inserted debug-comment block from a D3D9 token
/// stream. Only a comment token at word index 1 is recognized, which is
/// where the compiler places its metadata block; matching the opcode
/// anywhere else would risk false positives on instruction words. The
/// comment header word plus its declared payload words are skipped and
/// every other word is copied verbatim. Trailing bytes beyond the last
/// whole word are dropped.
pub fn strip_debug_comments(source: &[u8]) -> Vec<u8> {
    let word_count = source.len() / 4;
    let mut out = Vec::with_capacity(source.len());

    let mut index = 0;
    while index < word_count {
        let at = index * 4;
        let word = u32::from_le_bytes([source[at], source[at + 1], source[at + 2], source[at + 3]]);
        let opcode = word & 0xffff;
        let comment_words = (word >> 16) as usize;

        if index == 1 && opcode == COMMENT_OPCODE {
            index += comment_words + 1;
        } else {
            out.extend_from_slice(&source[at..at + 4]);
            index += 1;
        }
    }

    out
}

fn write_u16<W: Write>(out: &mut W, value: u16) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_u32<W: Write>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_string<W: Write>(out: &mut W, value: &str) -> io::Result<()> {
    write_u32(out, value.len() as u32)?;
    out.write_all(value.as_bytes())
}

fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(input: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_string<R: Read>(input: &mut R) -> Result<String, PackError> {
    let len = read_u32(input)? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn read_parameter_table<R: Read>(input: &mut R) -> Result<Vec<Parameter>, PackError> {
    let count = read_u32(input)? as usize;
    let mut parameters = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_string(input)?;
        let register = read_u8(input)? as u32;
        parameters.push(Parameter::new(name, register));
    }
    Ok(parameters)
}

fn read_flags<R: Read>(input: &mut R, count: usize) -> Result<Vec<bool>, PackError> {
    let mut flags = Vec::with_capacity(count);
    for _ in 0..count {
        flags.push(read_u8(input)? != 0);
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParamRegistry;
    use crate::spec::CompileJob;

    fn words(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn demo_batch() -> (ParamRegistry, Vec<CompileJob>) {
        let mut base = CompileJob::new(ShaderStage::Fragment, String::new(), Vec::new());
        base.bytecode = words(&[0xffff0200, 0x0000ffff]);
        base.constants.insert(Parameter::new("MatDiffColor", 2));
        base.texture_units.insert(Parameter::new("DiffMap", 0));

        let mut lit = CompileJob::new(ShaderStage::Fragment, "Dir".into(), vec!["DIRLIGHT".into()]);
        lit.bytecode = words(&[0xffff0200, 0x10000042, 0x0000ffff]);
        lit.constants.insert(Parameter::new("MatDiffColor", 2));
        lit.constants.insert(Parameter::new("LightDir", 5));
        lit.texture_units.insert(Parameter::new("DiffMap", 0));
        lit.texture_units.insert(Parameter::new("NormalMap", 1));

        let registry = ParamRegistry::merge_jobs([&base, &lit]);
        (registry, vec![base, lit])
    }

    #[test]
    fn container_round_trips() {
        let (registry, jobs) = demo_batch();
        let mut buffer = Vec::new();
        write_container(
            &mut buffer,
            ShaderStage::Fragment,
            ShaderModel::Sm3,
            &registry,
            &jobs,
            false,
        )
        .unwrap();

        let batch = read_container(&mut buffer.as_slice()).unwrap();
        assert_eq!(batch.stage, ShaderStage::Fragment);
        assert_eq!(batch.model, ShaderModel::Sm3);

        // Tables come out in the registry's deterministic order.
        let constant_names: Vec<_> = batch.constants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(constant_names, vec!["MatDiffColor", "LightDir"]);
        assert_eq!(batch.constants[0].register, 2);
        assert_eq!(batch.constants[1].register, 5);

        assert_eq!(batch.jobs.len(), 2);
        assert_eq!(batch.jobs[0].name, "");
        assert_eq!(batch.jobs[1].name, "Dir");

        // Presence flags are positional against the global tables.
        assert_eq!(batch.jobs[0].constants_present, vec![true, false]);
        assert_eq!(batch.jobs[1].constants_present, vec![true, true]);
        assert_eq!(batch.jobs[0].texture_units_present, vec![true, false]);
        assert_eq!(batch.jobs[1].texture_units_present, vec![true, true]);

        assert_eq!(batch.jobs[0].bytecode, jobs[0].bytecode);
        assert_eq!(batch.jobs[1].bytecode, jobs[1].bytecode);
    }

    #[test]
    fn pack_batch_writes_through_the_filesystem() {
        let (registry, jobs) = demo_batch();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Shaders/Basic.ps3");

        pack_batch(
            &path,
            ShaderStage::Fragment,
            ShaderModel::Sm3,
            &registry,
            &jobs,
            false,
        )
        .unwrap();

        let mut file = fs::File::open(&path).unwrap();
        let batch = read_container(&mut file).unwrap();
        assert_eq!(batch.jobs.len(), 2);
    }

    #[test]
    fn strips_comment_block_at_word_one() {
        let payload_len = 3u32;
        let comment = COMMENT_OPCODE | (payload_len << 16);
        let stream = words(&[
            0xffff0300, // version token
            comment,
            0x11111111,
            0x22222222,
            0x33333333, // comment payload
            0xdeadbeef,
            0x0000ffff,
        ]);

        let stripped = strip_debug_comments(&stream);
        // Exactly payload + header words removed.
        assert_eq!(stripped.len(), stream.len() - 4 * (payload_len as usize + 1));
        assert_eq!(stripped, words(&[0xffff0300, 0xdeadbeef, 0x0000ffff]));
    }

    #[test]
    fn comment_opcode_elsewhere_is_untouched() {
        let stream = words(&[0xffff0200, 0xdeadbeef, COMMENT_OPCODE, 0x0000ffff]);
        assert_eq!(strip_debug_comments(&stream), stream);
    }

    #[test]
    fn oversized_comment_length_cannot_overrun() {
        let comment = COMMENT_OPCODE | (0x7fff << 16);
        let stream = words(&[0xffff0200, comment, 0xdeadbeef]);
        assert_eq!(strip_debug_comments(&stream), words(&[0xffff0200]));
    }

    #[test]
    fn rejects_bad_magic() {
        let err = read_container(&mut &b"NOPE\x00\x00"[..]).unwrap_err();
        assert!(matches!(err, PackError::BadMagic));
    }

    #[test]
    fn truncated_container_is_an_io_error() {
        let (registry, jobs) = demo_batch();
        let mut buffer = Vec::new();
        write_container(
            &mut buffer,
            ShaderStage::Fragment,
            ShaderModel::Sm2,
            &registry,
            &jobs,
            false,
        )
        .unwrap();
        buffer.truncate(buffer.len() / 2);

        let err = read_container(&mut buffer.as_slice()).unwrap_err();
        assert!(matches!(err, PackError::Io(_)));
    }
}
