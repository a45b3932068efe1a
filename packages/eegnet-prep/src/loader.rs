//! Recording discovery and loading.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::edf::EdfReader;
use crate::error::{PipelineError, Result};
use crate::types::{Annotation, Channel, ChannelKind, Recording};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Edf,
    Json,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<FileType> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "edf" => Some(FileType::Edf),
            "json" => Some(FileType::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<FileType> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| PipelineError::UnsupportedFileType(path.display().to_string()))
    }
}

/// On-disk JSON form of a [`Recording`]. Samples are in volts, one row per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFile {
    pub sample_rate: f64,
    pub channels: Vec<Channel>,
    pub data: Vec<Vec<f64>>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl RecordingFile {
    pub fn into_recording(self, aux_channels: &[String]) -> Result<Recording> {
        let n_channels = self.data.len();
        let n_samples = self.data.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, row)) = self
            .data
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != n_samples)
        {
            return Err(PipelineError::Parse(format!(
                "Channel row {} has {} samples, row 0 has {}",
                i,
                row.len(),
                n_samples
            )));
        }
        let flat: Vec<f64> = self.data.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((n_channels, n_samples), flat)
            .map_err(|e| PipelineError::Shape(e.to_string()))?;

        let channels = self
            .channels
            .into_iter()
            .map(|mut c| {
                if aux_channels.iter().any(|a| *a == c.name) {
                    c.kind = ChannelKind::Auxiliary;
                }
                c
            })
            .collect();

        Recording::new(channels, data, self.sample_rate, self.annotations)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

impl From<&Recording> for RecordingFile {
    fn from(recording: &Recording) -> Self {
        Self {
            sample_rate: recording.sample_rate(),
            channels: recording.channels().to_vec(),
            data: recording.data().rows().into_iter().map(|r| r.to_vec()).collect(),
            annotations: recording.annotations().to_vec(),
        }
    }
}

/// Load one file. Channels named in `aux_channels` are typed auxiliary.
pub fn load_recording<P: AsRef<Path>>(path: P, aux_channels: &[String]) -> Result<Recording> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.display().to_string()));
    }

    log::info!("Loading {}", path.display());
    match FileType::from_path(path)? {
        FileType::Edf => EdfReader::open(path)?.to_recording(aux_channels),
        FileType::Json => {
            let content = std::fs::read_to_string(path)?;
            let file: RecordingFile = serde_json::from_str(&content)
                .map_err(|e| PipelineError::Parse(format!("{}: {}", path.display(), e)))?;
            file.into_recording(aux_channels)
        }
    }
}

/// Load files in the given order and join them end-to-end.
pub fn load_many<P: AsRef<Path>>(paths: &[P], aux_channels: &[String]) -> Result<Recording> {
    let parts = paths
        .iter()
        .map(|p| load_recording(p, aux_channels))
        .collect::<Result<Vec<_>>>()?;
    if parts.len() > 1 {
        log::info!("Concatenating {} recordings", parts.len());
    }
    Recording::concatenate(parts)
}

/// Session files of one subject (`A0{subject}*.edf` / `.json`), sorted by path.
pub fn subject_files<P: AsRef<Path>>(data_dir: P, subject: u32) -> Result<Vec<PathBuf>> {
    let data_dir = data_dir.as_ref();
    if !data_dir.is_dir() {
        return Err(PipelineError::FileNotFound(data_dir.display().to_string()));
    }

    let pattern = data_dir.join(format!("A0{}*", subject));
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern)
        .map_err(|e| PipelineError::InvalidConfig(format!("Invalid pattern '{}': {}", pattern, e)))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|p| p.is_file() && FileType::from_path(p).is_ok())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(PipelineError::FileNotFound(format!(
            "no recordings for subject {} in {}",
            subject,
            data_dir.display()
        )));
    }
    Ok(files)
}

/// Every session of one subject, concatenated.
pub fn load_subject<P: AsRef<Path>>(
    data_dir: P,
    subject: u32,
    aux_channels: &[String],
) -> Result<Recording> {
    let files = subject_files(data_dir, subject)?;
    log::info!("Subject {}: {} file(s)", subject, files.len());
    load_many(&files, aux_channels)
}
