//! Scene-index reader.
//!
//! Unlike the lenient stage parser, the reader is strict: the index
//! is produced by this system, so a bad magic or an unsupported
//! version is fatal. Version-1 files store source-frame values and
//! are converted on load; version-2 files are already in the target
//! frame.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

use usdi_math::{convert, Quat, Transform, Vec3};

use crate::varint::{read_string7, read_varint};
use crate::{IndexError, IndexResult, MAGIC};

/// One mesh entry decoded from the index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexRecord {
    /// Source stage path, resolved through the source table.
    pub source_path: String,

    /// Dense index into [`SceneIndex::sources`].
    pub source_index: usize,

    pub name: String,
    pub prim_path: String,

    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    pub has_skeleton: bool,
    pub extent: Option<(Vec3, Vec3)>,
}

impl IndexRecord {
    /// The record's world placement as a decomposed transform.
    pub fn transform(&self) -> Transform {
        Transform {
            translation: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

/// A fully decoded scene index.
#[derive(Clone, Debug, Default)]
pub struct SceneIndex {
    pub version: u64,

    /// Deduplicated source paths, lexicographically sorted.
    pub sources: Vec<String>,

    /// Mesh records in traversal order.
    pub records: Vec<IndexRecord>,
}

impl SceneIndex {
    /// Load an index file, optionally capping the number of records.
    pub fn load(path: impl AsRef<Path>, max_meshes: Option<usize>) -> IndexResult<SceneIndex> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes, max_meshes)
    }

    /// Decode an index from bytes.
    pub fn decode(bytes: &[u8], max_meshes: Option<usize>) -> IndexResult<SceneIndex> {
        let mut reader = Cursor::new(bytes);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| IndexError::Corrupt("file shorter than magic".into()))?;
        if magic != MAGIC {
            return Err(IndexError::BadMagic);
        }

        let version = read_varint(&mut reader)?;
        if version != 1 && version != 2 {
            return Err(IndexError::UnsupportedVersion(version));
        }

        let source_count = read_varint(&mut reader)? as usize;
        let mut sources = Vec::with_capacity(source_count);
        for _ in 0..source_count {
            sources.push(read_string7(&mut reader)?);
        }

        let mesh_count = read_varint(&mut reader)? as usize;
        let keep = max_meshes.unwrap_or(mesh_count).min(mesh_count);
        let mut records = Vec::with_capacity(keep);

        for _ in 0..keep {
            records.push(read_record(&mut reader, version, &sources)?);
        }

        Ok(SceneIndex {
            version,
            sources,
            records,
        })
    }

    /// Group records by their source stage, preserving index order
    /// within each group.
    pub fn group_by_source_file(&self) -> HashMap<&str, Vec<&IndexRecord>> {
        let mut groups: HashMap<&str, Vec<&IndexRecord>> = HashMap::new();
        for record in &self.records {
            groups
                .entry(record.source_path.as_str())
                .or_default()
                .push(record);
        }
        groups
    }

    /// Map each distinct geometry (`source|mesh-name`) to the world
    /// transforms of its occurrences, in index order. This is the
    /// instancing view: one geometry, many placements.
    pub fn geometry_instances(&self) -> HashMap<String, Vec<Transform>> {
        let mut instances: HashMap<String, Vec<Transform>> = HashMap::new();
        for record in &self.records {
            let key = format!("{}|{}", record.source_path, record.name);
            instances.entry(key).or_default().push(record.transform());
        }
        instances
    }
}

fn read_record(reader: &mut Cursor<&[u8]>, version: u64, sources: &[String]) -> IndexResult<IndexRecord> {
    let source_index = read_varint(reader)? as usize;
    let source_path = sources
        .get(source_index)
        .cloned()
        .ok_or_else(|| IndexError::Corrupt(format!("source index {} out of range", source_index)))?;

    let name = read_string7(reader)?;
    let prim_path = read_string7(reader)?;

    let mut position = read_vec3(reader)?;
    let mut rotation = read_quat(reader)?;
    let mut scale = read_vec3(reader)?;

    let flags = read_u8(reader)?;
    let has_skeleton = flags & 0b01 != 0;
    let mut extent = if flags & 0b10 != 0 {
        Some((read_vec3(reader)?, read_vec3(reader)?))
    } else {
        None
    };

    if version == 1 {
        // Legacy records are in source coordinates.
        position = convert::point_to_target(position);
        rotation = convert::quat_to_target(rotation);
        scale = convert::scale_to_target(scale);
        extent = extent.map(|(min, max)| convert::extent_to_target(min, max));
    }

    Ok(IndexRecord {
        source_path,
        source_index,
        name,
        prim_path,
        position,
        rotation,
        scale,
        has_skeleton,
        extent,
    })
}

fn read_u8(reader: &mut impl Read) -> IndexResult<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_f32(reader: &mut impl Read) -> IndexResult<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_vec3(reader: &mut impl Read) -> IndexResult<Vec3> {
    Ok(Vec3::new(read_f32(reader)?, read_f32(reader)?, read_f32(reader)?))
}

fn read_quat(reader: &mut impl Read) -> IndexResult<Quat> {
    Ok(Quat::from_xyzw(
        read_f32(reader)?,
        read_f32(reader)?,
        read_f32(reader)?,
        read_f32(reader)?,
    ))
}
