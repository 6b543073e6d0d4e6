//! Persisted DOF vectors.
//!
//! A DOF vector is written as a small header followed by its scalars, all
//! little-endian:
//!
//! ```text
//!   b"DOFV"  u32 version  u32 space tag  u32 name length  name (UTF-8)
//!   u64 count  count × f64
//! ```
//!
//! Vectors are only written from a fully compacted index space. Readers
//! check version, space tag and DOF count against the destination space
//! before consuming any scalar.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::data::function::DiscreteFunction;
use crate::data::registry::ContainerRegistry;
use crate::data::space::DiscreteSpace;
use crate::dof_error::DofError;
use crate::topology::index_source::EntityIndexSource;

/// Leading bytes of every persisted DOF vector.
pub const DOF_VECTOR_MAGIC: &[u8; 4] = b"DOFV";

/// Format version written by this crate.
pub const DOF_VECTOR_VERSION: u32 = 1;

/// Metadata preceding the scalars of a persisted DOF vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DofVectorHeader {
    pub version: u32,
    pub space_tag: u32,
    pub name: String,
    pub count: u64,
}

impl DofVectorHeader {
    fn encode(&self, out: &mut BytesMut) {
        out.put_slice(DOF_VECTOR_MAGIC);
        out.put_u32_le(self.version);
        out.put_u32_le(self.space_tag);
        out.put_u32_le(self.name.len() as u32);
        out.put_slice(self.name.as_bytes());
        out.put_u64_le(self.count);
    }

    fn decode(input: &mut Bytes) -> Result<Self, DofError> {
        let need = |input: &Bytes, n: usize, what: &str| {
            if input.remaining() < n {
                Err(DofError::Io(format!("truncated header: missing {what}")))
            } else {
                Ok(())
            }
        };
        need(input, 4, "magic")?;
        if &input[..4] != DOF_VECTOR_MAGIC {
            return Err(DofError::Io(format!(
                "bad magic {:?}, expected {:?}",
                &input[..4],
                DOF_VECTOR_MAGIC
            )));
        }
        input.advance(4);
        need(input, 12, "version, space tag and name length")?;
        let version = input.get_u32_le();
        let space_tag = input.get_u32_le();
        let name_len = input.get_u32_le() as usize;
        need(input, name_len, "name")?;
        let name = String::from_utf8(input.split_to(name_len).to_vec())
            .map_err(|e| DofError::Io(format!("name is not UTF-8: {e}")))?;
        need(input, 8, "dof count")?;
        let count = input.get_u64_le();
        Ok(Self {
            version,
            space_tag,
            name,
            count,
        })
    }
}

/// Write `values` as DOF vector `name` of `space`.
///
/// # Errors
/// - `NotCompacted` if `source` still has uncompressed holes,
/// - `VectorSizeMismatch` if `values` does not match the space size,
/// - `Io` on write failure.
pub fn write_dof_vector<W, S>(
    mut writer: W,
    source: &S,
    space: &DiscreteSpace,
    name: &str,
    values: &[f64],
) -> Result<(), DofError>
where
    W: Write,
    S: EntityIndexSource + ?Sized,
{
    if source.needs_compress() {
        return Err(DofError::NotCompacted);
    }
    if values.len() != space.size() {
        return Err(DofError::VectorSizeMismatch {
            expected: space.size(),
            found: values.len(),
        });
    }
    let header = DofVectorHeader {
        version: DOF_VECTOR_VERSION,
        space_tag: space.config().space_tag,
        name: name.to_owned(),
        count: values.len() as u64,
    };
    let mut out = BytesMut::with_capacity(24 + name.len() + 8 * values.len());
    header.encode(&mut out);
    for &v in values {
        out.put_f64_le(v);
    }
    writer.write_all(&out)?;
    log::debug!(
        "wrote dof vector `{name}` ({} dofs, space tag {})",
        values.len(),
        header.space_tag
    );
    Ok(())
}

/// Read a DOF vector of `space` into `dst`, returning its header.
///
/// # Errors
/// - `VersionMismatch`, `SpaceMismatch`, `SizeMismatch` when the header
///   disagrees with this crate or `space`,
/// - `VectorSizeMismatch` if `dst` does not match the space size,
/// - `Io` on a malformed or truncated stream.
pub fn read_dof_vector<R: Read>(
    mut reader: R,
    space: &DiscreteSpace,
    dst: &mut [f64],
) -> Result<DofVectorHeader, DofError> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let mut input = Bytes::from(raw);
    let header = DofVectorHeader::decode(&mut input)?;
    if header.version != DOF_VECTOR_VERSION {
        return Err(DofError::VersionMismatch {
            expected: DOF_VECTOR_VERSION,
            found: header.version,
        });
    }
    let tag = space.config().space_tag;
    if header.space_tag != tag {
        return Err(DofError::SpaceMismatch {
            expected: tag,
            found: header.space_tag,
        });
    }
    if header.count != space.size() as u64 {
        return Err(DofError::SizeMismatch {
            name: header.name,
            expected: space.size() as u64,
            found: header.count,
        });
    }
    if dst.len() != space.size() {
        return Err(DofError::VectorSizeMismatch {
            expected: space.size(),
            found: dst.len(),
        });
    }
    if input.remaining() < 8 * dst.len() {
        return Err(DofError::Io(format!(
            "truncated payload: {} bytes for {} dofs",
            input.remaining(),
            dst.len()
        )));
    }
    for v in dst.iter_mut() {
        *v = input.get_f64_le();
    }
    if input.has_remaining() {
        log::warn!(
            "dof vector `{}`: {} trailing bytes ignored",
            header.name,
            input.remaining()
        );
    }
    Ok(header)
}

/// Write function `f` of `space` under its own name.
pub fn write_function<W, S>(
    writer: W,
    source: &S,
    space: &DiscreteSpace,
    registry: &ContainerRegistry,
    f: &DiscreteFunction,
) -> Result<(), DofError>
where
    W: Write,
    S: EntityIndexSource + ?Sized,
{
    write_dof_vector(writer, source, space, f.name(), f.dofs(registry)?)
}

/// Read a persisted vector into function `f` of `space`.
pub fn read_function<R: Read>(
    reader: R,
    space: &DiscreteSpace,
    registry: &mut ContainerRegistry,
    f: &DiscreteFunction,
) -> Result<DofVectorHeader, DofError> {
    read_dof_vector(reader, space, f.dofs_mut(registry)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpaceConfig;
    use crate::data::block_layout::DofLayout;
    use crate::topology::adaptive::CompactionPolicy;
    use crate::topology::geometry::GeometryType;
    use crate::topology::interval::IntervalMesh;

    fn space(mesh: &IntervalMesh, tag: u32) -> DiscreteSpace {
        let layout = DofLayout::lagrange(1, 1, &[GeometryType::Line]).unwrap();
        let config = SpaceConfig {
            space_tag: tag,
            ..SpaceConfig::default()
        };
        DiscreteSpace::new(mesh, layout, config).unwrap()
    }

    #[test]
    fn header_layout_is_little_endian() {
        let mesh = IntervalMesh::new(1, CompactionPolicy::default());
        let sp = space(&mesh, 7);
        let mut out = Vec::new();
        write_dof_vector(&mut out, &mesh, &sp, "u", &[1.0, 2.0]).unwrap();
        assert_eq!(&out[..4], b"DOFV");
        assert_eq!(&out[4..8], &1u32.to_le_bytes());
        assert_eq!(&out[8..12], &7u32.to_le_bytes());
        assert_eq!(&out[12..16], &1u32.to_le_bytes());
        assert_eq!(out[16], b'u');
        assert_eq!(&out[17..25], &2u64.to_le_bytes());
        assert_eq!(out.len(), 25 + 16);
    }

    #[test]
    fn truncated_payload_is_io_error() {
        let mesh = IntervalMesh::new(1, CompactionPolicy::default());
        let sp = space(&mesh, 0);
        let mut out = Vec::new();
        write_dof_vector(&mut out, &mesh, &sp, "u", &[1.0, 2.0]).unwrap();
        out.truncate(out.len() - 3);
        let mut dst = [0.0; 2];
        assert!(matches!(
            read_dof_vector(&out[..], &sp, &mut dst),
            Err(DofError::Io(_))
        ));
        assert!(matches!(
            read_dof_vector(&b"NOPE"[..], &sp, &mut dst),
            Err(DofError::Io(_))
        ));
    }
}
