//! JSON-lines offline store
//!
//! Samples taken while no client is connected are appended to a file, one
//! serialized [`SensorSample`] per line. The store is bounded like the flash
//! region it stands in for: once [`MAX_BUFFERED_READINGS`] records are held,
//! further samples are refused with [`StorageError::Full`] and the dispatcher
//! counts them as storage failures.
//!
//! JSON has no NaN or infinity, so non-finite readings are stored as 0 with
//! `SENSOR_ERROR` set, the same convention the wire frame uses.
//!
//! Lines that fail to parse on read are skipped with a warning; a torn final
//! line after a crash must not hide the rest of the history.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use vibemon_core::constants::buffers::MAX_BUFFERED_READINGS;
use vibemon_core::errors::StorageError;
use vibemon_core::sample::{AlertFlags, SensorSample};
use vibemon_core::traits::OfflineStore;

use crate::HostError;

pub struct JsonLinesStore {
    path: PathBuf,
    writer: BufWriter<File>,
    len: u32,
    capacity: u32,
}

impl JsonLinesStore {
    /// Open (or create) a store with the default capacity
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        Self::with_capacity(path, MAX_BUFFERED_READINGS)
    }

    /// Open (or create) a store holding at most `capacity` records
    ///
    /// Records already in the file count against the capacity.
    pub fn with_capacity(path: impl AsRef<Path>, capacity: u32) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();
        let len = if path.exists() { count_lines(&path)? } else { 0 };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Offline store {} holds {} records", path.display(), len);

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            len,
            capacity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored records
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Read every stored sample, oldest first
    pub fn read_all(&mut self) -> Result<Vec<SensorSample>, HostError> {
        self.writer.flush()?;
        read_samples(&self.path)
    }

    /// Remove every record, typically after uploading them
    pub fn clear(&mut self) -> Result<(), HostError> {
        self.writer.flush()?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        drop(file);

        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.len = 0;
        Ok(())
    }

    fn append(&mut self, sample: &SensorSample) -> Result<(), HostError> {
        serde_json::to_writer(&mut self.writer, &storable(sample))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl OfflineStore for JsonLinesStore {
    fn buffer(&mut self, sample: &SensorSample) -> Result<(), StorageError> {
        if self.len >= self.capacity {
            return Err(StorageError::Full {
                capacity: self.capacity,
            });
        }

        self.append(sample).map_err(|e| {
            warn!("Offline write to {} failed: {}", self.path.display(), e);
            StorageError::Io {
                reason: "write failed",
            }
        })?;
        self.len += 1;
        Ok(())
    }
}

/// Copy of `sample` with every non-finite field zeroed
fn storable(sample: &SensorSample) -> SensorSample {
    let mut stored = *sample;
    let mut replaced = false;

    for value in [
        &mut stored.accel.x,
        &mut stored.accel.y,
        &mut stored.accel.z,
        &mut stored.gyro.x,
        &mut stored.gyro.y,
        &mut stored.gyro.z,
        &mut stored.temperature,
        &mut stored.vibration_rms,
        &mut stored.vibration_peak,
        &mut stored.battery_voltage,
    ] {
        if !value.is_finite() {
            *value = 0.0;
            replaced = true;
        }
    }

    if replaced {
        debug!("Sample {} has non-finite fields, stored as 0", sample.timestamp);
        stored.flags |= AlertFlags::SENSOR_ERROR;
    }
    stored
}

/// Parse a JSON-lines file, skipping malformed lines
pub fn read_samples(path: impl AsRef<Path>) -> Result<Vec<SensorSample>, HostError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut samples = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(sample) => samples.push(sample),
            Err(e) => warn!("Skipping line {}: {}", number + 1, e),
        }
    }

    Ok(samples)
}

fn count_lines(path: &Path) -> Result<u32, HostError> {
    let text = fs::read_to_string(path)?;
    let count = text.lines().filter(|l| !l.trim().is_empty()).count();
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}
