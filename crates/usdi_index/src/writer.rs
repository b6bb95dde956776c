//! Streaming scene-index writer.
//!
//! The traverser hands the writer batches of mesh records through the
//! flush callback; each batch is serialized to a numbered shard file
//! in the temp directory so the traversal never holds more than one
//! batch in memory. Finalization merges the shards, in creation
//! order, into the final binary index with a deduplicated and sorted
//! source-path table.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
#[cfg(test)]
use std::path::Path;
use std::path::PathBuf;

use usdi_core::{MeshRecord, MeshSink};
use usdi_math::{Quat, Vec3};

use crate::varint::{write_string7, write_varint};
use crate::{IndexError, IndexResult, FORMAT_VERSION, MAGIC};

/// Writer configuration.
#[derive(Clone, Debug)]
pub struct IndexWriterConfig {
    /// How many records the traversal buffers between flushes.
    pub flush_every_n_meshes: usize,

    /// Directory for transient shard files; exclusively owned by one
    /// writer and removed after successful finalization.
    pub temp_dir: PathBuf,

    /// Final index path.
    pub output_path: PathBuf,
}

/// Summary of a finalized index.
#[derive(Clone, Debug)]
pub struct IndexSummary {
    pub mesh_count: u64,
    pub source_count: usize,
    pub output_path: PathBuf,
}

/// Streaming shard writer; implements [`MeshSink`] so it can be
/// plugged straight into a traversal.
pub struct IndexWriter {
    config: IndexWriterConfig,

    /// Shard files in creation order.
    shards: Vec<PathBuf>,

    total_records: u64,

    /// Union of source paths across all spilled records. BTreeSet
    /// keeps the final table sorted and deduplicated.
    source_paths: BTreeSet<String>,

    /// First spill failure; emission halts and finalize reports it.
    failed: Option<io::Error>,
}

impl IndexWriter {
    /// Create a writer, creating its temp directory.
    pub fn new(config: IndexWriterConfig) -> IndexResult<Self> {
        fs::create_dir_all(&config.temp_dir)?;
        Ok(Self {
            config,
            shards: Vec::new(),
            total_records: 0,
            source_paths: BTreeSet::new(),
            failed: None,
        })
    }

    pub fn config(&self) -> &IndexWriterConfig {
        &self.config
    }

    /// Serialize one batch of records into the next shard file.
    pub fn spill(&mut self, batch: &[MeshRecord]) -> io::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let shard_path = self
            .config
            .temp_dir
            .join(format!("shard_{:05}.bin", self.shards.len()));
        let mut writer = BufWriter::new(File::create(&shard_path)?);

        writer.write_all(&(batch.len() as i32).to_le_bytes())?;
        for record in batch {
            write_shard_record(&mut writer, record)?;
            self.source_paths.insert(record.source_path.clone());
        }
        writer.flush()?;

        self.total_records += batch.len() as u64;
        self.shards.push(shard_path);
        log::debug!(
            "spilled shard {} ({} records)",
            self.shards.len(),
            batch.len()
        );
        Ok(())
    }

    /// Merge all shards into the final index.
    ///
    /// On success the temp directory is removed. On failure shards
    /// are left in place for diagnosis.
    pub fn finalize(self) -> IndexResult<IndexSummary> {
        if let Some(err) = self.failed {
            return Err(IndexError::Io(err));
        }

        let sources: Vec<String> = self.source_paths.iter().cloned().collect();
        let source_index: HashMap<&str, u64> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i as u64))
            .collect();

        let mut out = BufWriter::new(File::create(&self.config.output_path)?);
        out.write_all(&MAGIC)?;
        write_varint(&mut out, FORMAT_VERSION)?;

        write_varint(&mut out, sources.len() as u64)?;
        for source in &sources {
            write_string7(&mut out, source)?;
        }

        write_varint(&mut out, self.total_records)?;
        for shard_path in &self.shards {
            let mut reader = BufReader::new(File::open(shard_path)?);
            let count = read_i32(&mut reader)?;
            for _ in 0..count {
                let record = read_shard_record(&mut reader)?;
                let index = source_index
                    .get(record.source_path.as_str())
                    .copied()
                    .ok_or_else(|| {
                        IndexError::Corrupt(format!(
                            "shard references unknown source {}",
                            record.source_path
                        ))
                    })?;
                write_index_record(&mut out, index, &record)?;
            }
        }
        out.flush()?;
        drop(out);

        if let Err(err) = fs::remove_dir_all(&self.config.temp_dir) {
            log::warn!(
                "index finalized but temp dir {} was not removed: {}",
                self.config.temp_dir.display(),
                err
            );
        }

        log::info!(
            "wrote scene index {} ({} meshes, {} sources)",
            self.config.output_path.display(),
            self.total_records,
            sources.len()
        );

        Ok(IndexSummary {
            mesh_count: self.total_records,
            source_count: sources.len(),
            output_path: self.config.output_path,
        })
    }
}

impl MeshSink for IndexWriter {
    fn on_flush(&mut self, batch: &[MeshRecord]) -> bool {
        if self.failed.is_some() {
            return false;
        }
        match self.spill(batch) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("shard spill failed: {}", err);
                self.failed = Some(err);
                false
            }
        }
    }
}

// ----------------------------------------------------------------------
// Shard format (transient, little-endian, i32 string-length prefixes)
// ----------------------------------------------------------------------

fn write_shard_string<W: Write>(writer: &mut W, s: &str) -> io::Result<()> {
    writer.write_all(&(s.len() as i32).to_le_bytes())?;
    writer.write_all(s.as_bytes())
}

fn write_shard_record<W: Write>(writer: &mut W, record: &MeshRecord) -> io::Result<()> {
    write_shard_string(writer, &record.source_path)?;
    write_shard_string(writer, &record.name)?;
    write_shard_string(writer, &record.prim_path)?;
    write_vec3(writer, record.position)?;
    write_quat(writer, record.rotation)?;
    write_vec3(writer, record.scale)?;
    writer.write_all(&[record.has_skeleton as u8])?;
    writer.write_all(&[record.extent.is_some() as u8])?;
    if let Some((min, max)) = record.extent {
        write_vec3(writer, min)?;
        write_vec3(writer, max)?;
    }
    Ok(())
}

fn read_shard_record<R: Read>(reader: &mut R) -> IndexResult<MeshRecord> {
    let source_path = read_shard_string(reader)?;
    let name = read_shard_string(reader)?;
    let prim_path = read_shard_string(reader)?;
    let position = read_vec3(reader)?;
    let rotation = read_quat(reader)?;
    let scale = read_vec3(reader)?;
    let has_skeleton = read_u8(reader)? != 0;
    let extent = if read_u8(reader)? != 0 {
        Some((read_vec3(reader)?, read_vec3(reader)?))
    } else {
        None
    };

    Ok(MeshRecord {
        source_path,
        name,
        prim_path,
        position,
        rotation,
        scale,
        has_skeleton,
        extent,
    })
}

fn read_shard_string<R: Read>(reader: &mut R) -> IndexResult<String> {
    let len = read_i32(reader)?;
    if len < 0 {
        return Err(IndexError::Corrupt("negative string length in shard".into()));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| IndexError::Corrupt("shard string is not UTF-8".into()))
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn write_f32<W: Write>(writer: &mut W, value: f32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn read_f32<R: Read>(reader: &mut R) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn write_vec3<W: Write>(writer: &mut W, v: Vec3) -> io::Result<()> {
    write_f32(writer, v.x)?;
    write_f32(writer, v.y)?;
    write_f32(writer, v.z)
}

fn read_vec3<R: Read>(reader: &mut R) -> io::Result<Vec3> {
    Ok(Vec3::new(read_f32(reader)?, read_f32(reader)?, read_f32(reader)?))
}

fn write_quat<W: Write>(writer: &mut W, q: Quat) -> io::Result<()> {
    write_f32(writer, q.x)?;
    write_f32(writer, q.y)?;
    write_f32(writer, q.z)?;
    write_f32(writer, q.w)
}

fn read_quat<R: Read>(reader: &mut R) -> io::Result<Quat> {
    Ok(Quat::from_xyzw(
        read_f32(reader)?,
        read_f32(reader)?,
        read_f32(reader)?,
        read_f32(reader)?,
    ))
}

/// Serialize one record into the final index stream.
fn write_index_record<W: Write>(writer: &mut W, source_index: u64, record: &MeshRecord) -> io::Result<()> {
    write_varint(writer, source_index)?;
    write_string7(writer, &record.name)?;
    write_string7(writer, &record.prim_path)?;
    write_vec3(writer, record.position)?;
    write_quat(writer, record.rotation)?;
    write_vec3(writer, record.scale)?;

    let mut flags = 0u8;
    if record.has_skeleton {
        flags |= 0b01;
    }
    if record.extent.is_some() {
        flags |= 0b10;
    }
    writer.write_all(&[flags])?;

    if let Some((min, max)) = record.extent {
        write_vec3(writer, min)?;
        write_vec3(writer, max)?;
    }
    Ok(())
}
