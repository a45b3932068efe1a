// EDF / EDF+ reader and a minimal writer for fixtures.
// Format: https://www.edfplus.info/specs/edf.html, https://www.edfplus.info/specs/edfplus.html

use ndarray::Array2;
use rayon::prelude::*;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::types::{Annotation, Channel, Recording};

const ANNOTATION_LABEL: &str = "EDF Annotations";
const TAL_ONSET_END: u8 = 0x14;
const TAL_DURATION: u8 = 0x15;

#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub version: String,
    pub patient_id: String,
    pub recording_id: String,
    pub start_date: String,
    pub start_time: String,
    pub header_bytes: usize,
    /// "EDF+C" / "EDF+D" for EDF+ files
    pub reserved: String,
    /// -1 while a writer has not finalized the file
    pub num_data_records: i64,
    pub record_duration: f64,
    pub num_signals: usize,
}

#[derive(Debug, Clone)]
pub struct EdfSignalHeader {
    pub label: String,
    pub transducer_type: String,
    pub physical_dimension: String,
    pub physical_minimum: f64,
    pub physical_maximum: f64,
    pub digital_minimum: i64,
    pub digital_maximum: i64,
    pub prefiltering: String,
    pub samples_per_record: usize,
    pub reserved: String,
}

impl EdfSignalHeader {
    pub fn sample_rate(&self, record_duration: f64) -> f64 {
        self.samples_per_record as f64 / record_duration
    }

    pub fn gain(&self) -> f64 {
        (self.physical_maximum - self.physical_minimum)
            / (self.digital_maximum - self.digital_minimum) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_maximum - self.gain() * self.digital_maximum as f64
    }

    pub fn is_annotation(&self) -> bool {
        self.label == ANNOTATION_LABEL
    }

    /// Label without the padding dots some exporters add
    pub fn clean_label(&self) -> String {
        self.label.trim_matches('.').trim().to_string()
    }

    /// Multiplier from the declared physical dimension to volts
    pub fn volts_per_unit(&self) -> f64 {
        match self.physical_dimension.trim() {
            "V" => 1.0,
            "mV" => 1e-3,
            "uV" | "µV" | "μV" => 1e-6,
            "nV" => 1e-9,
            other => {
                log::debug!(
                    "Signal '{}' has physical dimension '{}'; leaving values unscaled",
                    self.label,
                    other
                );
                1.0
            }
        }
    }
}

/// Whole-file EDF reader.
pub struct EdfReader {
    pub header: EdfHeader,
    pub signal_headers: Vec<EdfSignalHeader>,
    data: Vec<u8>,
    num_records: usize,
}

impl EdfReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
            .map_err(|e| PipelineError::Parse(format!("{}: {}", path.display(), e)))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> std::result::Result<Self, String> {
        let mut cursor = Cursor::new(bytes.as_slice());
        let header = Self::read_header(&mut cursor)?;
        let signal_headers = Self::read_signal_headers(&mut cursor, header.num_signals)?;

        if header.header_bytes > bytes.len() {
            return Err(format!(
                "Header declares {} bytes but file has {}",
                header.header_bytes,
                bytes.len()
            ));
        }
        let record_size: usize = signal_headers.iter().map(|s| s.samples_per_record * 2).sum();
        if record_size == 0 {
            return Err("Data records are empty".to_string());
        }
        let available = (bytes.len() - header.header_bytes) / record_size;
        let num_records = if header.num_data_records < 0 {
            available
        } else {
            let declared = header.num_data_records as usize;
            if declared > available {
                log::warn!(
                    "EDF header declares {} records but only {} are present",
                    declared,
                    available
                );
            }
            declared.min(available)
        };

        let data = bytes[header.header_bytes..header.header_bytes + num_records * record_size].to_vec();

        Ok(Self {
            header,
            signal_headers,
            data,
            num_records,
        })
    }

    fn read_fixed_string<R: Read>(reader: &mut R, size: usize) -> std::result::Result<String, String> {
        let mut buffer = vec![0u8; size];
        reader
            .read_exact(&mut buffer)
            .map_err(|e| format!("Truncated header: {}", e))?;
        Ok(String::from_utf8_lossy(&buffer).trim().to_string())
    }

    fn read_strings<R: Read>(
        reader: &mut R,
        n: usize,
        size: usize,
    ) -> std::result::Result<Vec<String>, String> {
        (0..n).map(|_| Self::read_fixed_string(reader, size)).collect()
    }

    fn read_number<R: Read, T: std::str::FromStr>(
        reader: &mut R,
        size: usize,
        field: &str,
    ) -> std::result::Result<T, String>
    where
        T::Err: std::fmt::Display,
    {
        let s = Self::read_fixed_string(reader, size)?;
        s.parse::<T>()
            .map_err(|e| format!("Invalid {} '{}': {}", field, s, e))
    }

    fn read_header<R: Read>(reader: &mut R) -> std::result::Result<EdfHeader, String> {
        let header = EdfHeader {
            version: Self::read_fixed_string(reader, 8)?,
            patient_id: Self::read_fixed_string(reader, 80)?,
            recording_id: Self::read_fixed_string(reader, 80)?,
            start_date: Self::read_fixed_string(reader, 8)?,
            start_time: Self::read_fixed_string(reader, 8)?,
            header_bytes: Self::read_number(reader, 8, "header bytes")?,
            reserved: Self::read_fixed_string(reader, 44)?,
            num_data_records: Self::read_number(reader, 8, "number of data records")?,
            record_duration: Self::read_number(reader, 8, "record duration")?,
            num_signals: Self::read_number(reader, 4, "number of signals")?,
        };
        if !(header.record_duration > 0.0) {
            return Err(format!(
                "Record duration must be positive, got {}",
                header.record_duration
            ));
        }
        log::debug!(
            "EDF header: {} records of {} s, {} signals",
            header.num_data_records,
            header.record_duration,
            header.num_signals
        );
        Ok(header)
    }

    /// Signal headers are stored field-major: every label, then every
    /// transducer type, and so on.
    fn read_signal_headers<R: Read>(
        reader: &mut R,
        n: usize,
    ) -> std::result::Result<Vec<EdfSignalHeader>, String> {
        let labels = Self::read_strings(reader, n, 16)?;
        let transducers = Self::read_strings(reader, n, 80)?;
        let dimensions = Self::read_strings(reader, n, 8)?;
        let physical_min: Vec<f64> = (0..n)
            .map(|_| Self::read_number(reader, 8, "physical minimum"))
            .collect::<std::result::Result<_, _>>()?;
        let physical_max: Vec<f64> = (0..n)
            .map(|_| Self::read_number(reader, 8, "physical maximum"))
            .collect::<std::result::Result<_, _>>()?;
        let digital_min: Vec<i64> = (0..n)
            .map(|_| Self::read_number(reader, 8, "digital minimum"))
            .collect::<std::result::Result<_, _>>()?;
        let digital_max: Vec<i64> = (0..n)
            .map(|_| Self::read_number(reader, 8, "digital maximum"))
            .collect::<std::result::Result<_, _>>()?;
        let prefiltering = Self::read_strings(reader, n, 80)?;
        let samples: Vec<usize> = (0..n)
            .map(|_| Self::read_number(reader, 8, "samples per record"))
            .collect::<std::result::Result<_, _>>()?;
        let reserved = Self::read_strings(reader, n, 32)?;

        let mut headers = Vec::with_capacity(n);
        for i in 0..n {
            if digital_max[i] <= digital_min[i] {
                return Err(format!(
                    "Signal '{}' has digital range {}..{}",
                    labels[i], digital_min[i], digital_max[i]
                ));
            }
            headers.push(EdfSignalHeader {
                label: labels[i].clone(),
                transducer_type: transducers[i].clone(),
                physical_dimension: dimensions[i].clone(),
                physical_minimum: physical_min[i],
                physical_maximum: physical_max[i],
                digital_minimum: digital_min[i],
                digital_maximum: digital_max[i],
                prefiltering: prefiltering[i].clone(),
                samples_per_record: samples[i],
                reserved: reserved[i].clone(),
            });
        }
        Ok(headers)
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    pub fn is_edf_plus(&self) -> bool {
        self.header.reserved.starts_with("EDF+")
    }

    fn record_size(&self) -> usize {
        self.signal_headers.iter().map(|s| s.samples_per_record * 2).sum()
    }

    /// Byte offset of signal `index` inside one data record
    fn signal_offset(&self, index: usize) -> usize {
        self.signal_headers[..index]
            .iter()
            .map(|s| s.samples_per_record * 2)
            .sum()
    }

    fn signal_bytes(&self, index: usize, record: usize) -> &[u8] {
        let start = record * self.record_size() + self.signal_offset(index);
        let len = self.signal_headers[index].samples_per_record * 2;
        &self.data[start..start + len]
    }

    /// Physical samples of one signal across all records, in volts.
    pub fn read_signal(&self, index: usize) -> Vec<f64> {
        let header = &self.signal_headers[index];
        let gain = header.gain() * header.volts_per_unit();
        let offset = header.offset() * header.volts_per_unit();

        let mut out = Vec::with_capacity(self.num_records * header.samples_per_record);
        for record in 0..self.num_records {
            out.extend(
                self.signal_bytes(index, record)
                    .chunks_exact(2)
                    .map(|b| gain * i16::from_le_bytes([b[0], b[1]]) as f64 + offset),
            );
        }
        out
    }

    /// EDF+ annotations as (onset seconds, text), in file order.
    pub fn read_annotations(&self) -> Vec<(f64, String)> {
        let mut annotations = Vec::new();
        for (index, _) in self
            .signal_headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_annotation())
        {
            for record in 0..self.num_records {
                parse_tals(self.signal_bytes(index, record), &mut annotations);
            }
        }
        annotations
    }

    /// Convert to a [`Recording`]. Names in `aux_channels` are typed auxiliary.
    pub fn to_recording(&self, aux_channels: &[String]) -> Result<Recording> {
        let signal_indices: Vec<usize> = self
            .signal_headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_annotation())
            .map(|(i, _)| i)
            .collect();

        let first = signal_indices
            .first()
            .ok_or_else(|| PipelineError::Parse("EDF file has no data signals".into()))?;
        let duration = self.header.record_duration;
        let sample_rate = self.signal_headers[*first].sample_rate(duration);
        for &i in &signal_indices {
            let rate = self.signal_headers[i].sample_rate(duration);
            if rate != sample_rate {
                return Err(PipelineError::Parse(format!(
                    "Signal '{}' is sampled at {} Hz, '{}' at {} Hz",
                    self.signal_headers[i].label,
                    rate,
                    self.signal_headers[*first].label,
                    sample_rate
                )));
            }
        }

        let signals: Vec<Vec<f64>> = signal_indices
            .par_iter()
            .map(|&i| self.read_signal(i))
            .collect();
        let n_samples = signals.first().map(|s| s.len()).unwrap_or(0);
        let flat: Vec<f64> = signals.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((signal_indices.len(), n_samples), flat)
            .map_err(|e| PipelineError::Shape(e.to_string()))?;

        let channels: Vec<Channel> = signal_indices
            .iter()
            .map(|&i| {
                let name = self.signal_headers[i].clean_label();
                if aux_channels.iter().any(|a| *a == name) {
                    Channel::auxiliary(name)
                } else {
                    Channel::eeg(name)
                }
            })
            .collect();

        let mut annotations = Vec::new();
        for (onset_secs, text) in self.read_annotations() {
            let onset = (onset_secs * sample_rate).round();
            if onset < 0.0 || onset as usize >= n_samples {
                log::warn!(
                    "Ignoring annotation '{}' at {} s outside the recording",
                    text,
                    onset_secs
                );
                continue;
            }
            annotations.push(Annotation::new(text, onset as usize));
        }

        log::info!(
            "Read EDF: {} channels × {} samples at {} Hz, {} annotations",
            channels.len(),
            n_samples,
            sample_rate,
            annotations.len()
        );

        Recording::new(channels, data, sample_rate, annotations)
    }
}

/// Decode the time-stamped annotation lists of one record.
fn parse_tals(bytes: &[u8], out: &mut Vec<(f64, String)>) {
    for tal in bytes.split(|&b| b == 0).filter(|t| !t.is_empty()) {
        let mut fields = tal.split(|&b| b == TAL_ONSET_END);
        let timing = match fields.next() {
            Some(t) => t,
            None => continue,
        };
        let onset_bytes = timing.split(|&b| b == TAL_DURATION).next().unwrap_or(timing);
        let onset = match std::str::from_utf8(onset_bytes)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
        {
            Some(v) => v,
            None => {
                log::debug!("Skipping TAL with unreadable onset");
                continue;
            }
        };
        for text in fields.filter(|f| !f.is_empty()) {
            out.push((onset, String::from_utf8_lossy(text).trim().to_string()));
        }
    }
}

/// Writes a [`Recording`] as EDF+C with one data record per second.
pub struct EdfWriter {
    physical_dimension: String,
    volts_per_unit: f64,
}

impl Default for EdfWriter {
    fn default() -> Self {
        Self {
            physical_dimension: "uV".to_string(),
            volts_per_unit: 1e-6,
        }
    }
}

impl EdfWriter {
    pub fn write<P: AsRef<Path>>(&self, path: P, recording: &Recording) -> Result<()> {
        let bytes = self.encode(recording)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn encode(&self, recording: &Recording) -> Result<Vec<u8>> {
        let rate = recording.sample_rate();
        if rate.fract() != 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "EDF records of 1 s need an integer sample rate, got {}",
                rate
            )));
        }
        let per_record = rate as usize;
        let n_samples = recording.n_samples();
        if n_samples % per_record != 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "{} samples do not fill whole 1 s records of {}",
                n_samples, per_record
            )));
        }
        let num_records = n_samples / per_record;

        let mut signals: Vec<EdfSignalHeader> = recording
            .channels()
            .iter()
            .zip(recording.data().rows())
            .map(|(channel, row)| {
                let (lo, hi) = row.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
                let (lo, hi) = (lo / self.volts_per_unit, hi / self.volts_per_unit);
                let margin = ((hi - lo).abs() * 0.01).max(1.0);
                let physical_minimum = parse_field(&format_field(lo - margin));
                let physical_maximum = parse_field(&format_field(hi + margin));
                EdfSignalHeader {
                    label: channel.name.clone(),
                    transducer_type: String::new(),
                    physical_dimension: self.physical_dimension.clone(),
                    physical_minimum,
                    physical_maximum,
                    digital_minimum: -32768,
                    digital_maximum: 32767,
                    prefiltering: String::new(),
                    samples_per_record: per_record,
                    reserved: String::new(),
                }
            })
            .collect();

        // One TAL block per record: time keeping first, then that second's events
        let mut tal_blocks: Vec<Vec<u8>> = (0..num_records)
            .map(|r| format!("+{}\x14\x14\0", r).into_bytes())
            .collect();
        for annotation in recording.annotations() {
            let record = annotation.onset / per_record;
            let onset = annotation.onset as f64 / rate;
            tal_blocks[record]
                .extend(format!("+{}\x14{}\x14\0", onset, annotation.code).into_bytes());
        }
        let tal_samples = tal_blocks.iter().map(|b| b.len()).max().unwrap_or(0).div_ceil(2);
        signals.push(EdfSignalHeader {
            label: ANNOTATION_LABEL.to_string(),
            transducer_type: String::new(),
            physical_dimension: String::new(),
            physical_minimum: -1.0,
            physical_maximum: 1.0,
            digital_minimum: -32768,
            digital_maximum: 32767,
            prefiltering: String::new(),
            samples_per_record: tal_samples,
            reserved: String::new(),
        });

        let header = EdfHeader {
            version: "0".to_string(),
            patient_id: "X X X X".to_string(),
            recording_id: "Startdate X X X X".to_string(),
            start_date: "01.01.00".to_string(),
            start_time: "00.00.00".to_string(),
            header_bytes: 256 * (signals.len() + 1),
            reserved: "EDF+C".to_string(),
            num_data_records: num_records as i64,
            record_duration: 1.0,
            num_signals: signals.len(),
        };

        let mut out = Vec::with_capacity(header.header_bytes + num_records * per_record * 2 * signals.len());
        write_header(&mut out, &header, &signals);

        let data = recording.data();
        for (record, tal) in tal_blocks.iter().enumerate() {
            for (row, signal) in data.rows().into_iter().zip(&signals) {
                let gain = signal.gain();
                let offset = signal.offset();
                for t in record * per_record..(record + 1) * per_record {
                    let physical = row[t] / self.volts_per_unit;
                    let digital = ((physical - offset) / gain)
                        .round()
                        .clamp(signal.digital_minimum as f64, signal.digital_maximum as f64)
                        as i16;
                    out.extend_from_slice(&digital.to_le_bytes());
                }
            }
            let mut block = tal.clone();
            block.resize(tal_samples * 2, 0);
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}

fn write_fixed_string(out: &mut Vec<u8>, s: &str, size: usize) {
    let mut buffer = vec![b' '; size];
    let bytes = s.as_bytes();
    let len = bytes.len().min(size);
    buffer[..len].copy_from_slice(&bytes[..len]);
    out.extend_from_slice(&buffer);
}

fn write_header(out: &mut Vec<u8>, header: &EdfHeader, signals: &[EdfSignalHeader]) {
    write_fixed_string(out, &header.version, 8);
    write_fixed_string(out, &header.patient_id, 80);
    write_fixed_string(out, &header.recording_id, 80);
    write_fixed_string(out, &header.start_date, 8);
    write_fixed_string(out, &header.start_time, 8);
    write_fixed_string(out, &header.header_bytes.to_string(), 8);
    write_fixed_string(out, &header.reserved, 44);
    write_fixed_string(out, &header.num_data_records.to_string(), 8);
    write_fixed_string(out, &format_field(header.record_duration), 8);
    write_fixed_string(out, &header.num_signals.to_string(), 4);

    let fields: [(fn(&EdfSignalHeader) -> String, usize); 10] = [
        (|s: &EdfSignalHeader| s.label.clone(), 16),
        (|s: &EdfSignalHeader| s.transducer_type.clone(), 80),
        (|s: &EdfSignalHeader| s.physical_dimension.clone(), 8),
        (|s: &EdfSignalHeader| format_field(s.physical_minimum), 8),
        (|s: &EdfSignalHeader| format_field(s.physical_maximum), 8),
        (|s: &EdfSignalHeader| s.digital_minimum.to_string(), 8),
        (|s: &EdfSignalHeader| s.digital_maximum.to_string(), 8),
        (|s: &EdfSignalHeader| s.prefiltering.clone(), 80),
        (|s: &EdfSignalHeader| s.samples_per_record.to_string(), 8),
        (|s: &EdfSignalHeader| s.reserved.clone(), 32),
    ];
    for (field, size) in fields {
        for signal in signals {
            write_fixed_string(out, &field(signal), size);
        }
    }
}

/// Shortest decimal rendering of `v` that fits an 8-byte header field
fn format_field(v: f64) -> String {
    let plain = v.to_string();
    if plain.len() <= 8 {
        return plain;
    }
    for precision in (0..8).rev() {
        let s = format!("{:.*}", precision, v);
        if s.len() <= 8 {
            return s;
        }
    }
    format!("{:.0}", v)
}

fn parse_field(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn recording() -> Recording {
        let channels = vec![
            Channel::eeg("EEG-C3"),
            Channel::eeg("EEG-C4"),
            Channel::eeg("EOG-left"),
        ];
        let data = Array2::from_shape_fn((3, 500), |(c, t)| {
            (c as f64 + 1.0) * 30e-6 * (2.0 * PI * 10.0 * t as f64 / 250.0).sin()
        });
        Recording::new(
            channels,
            data,
            250.0,
            vec![Annotation::new("768", 10), Annotation::new("769", 260)],
        )
        .unwrap()
    }

    #[test]
    fn test_signal_header_calculations() {
        let header = EdfSignalHeader {
            label: ".EEG-Fz..".to_string(),
            transducer_type: String::new(),
            physical_dimension: "uV".to_string(),
            physical_minimum: -100.0,
            physical_maximum: 100.0,
            digital_minimum: -32768,
            digital_maximum: 32767,
            prefiltering: String::new(),
            samples_per_record: 250,
            reserved: String::new(),
        };
        assert_eq!(header.sample_rate(1.0), 250.0);
        assert!((header.gain() - 200.0 / 65535.0).abs() < 1e-12);
        assert_eq!(header.volts_per_unit(), 1e-6);
        assert_eq!(header.clean_label(), "EEG-Fz");
    }

    #[test]
    fn test_written_file_reads_back() {
        let original = recording();
        let bytes = EdfWriter::default().encode(&original).unwrap();
        let reader = EdfReader::from_bytes(bytes).unwrap();
        assert!(reader.is_edf_plus());
        assert_eq!(reader.num_records(), 2);

        let aux = vec!["EOG-left".to_string()];
        let rec = reader.to_recording(&aux).unwrap();
        assert_eq!(rec.channel_names(), vec!["EEG-C3", "EEG-C4", "EOG-left"]);
        assert_eq!(rec.channels()[2].kind, crate::types::ChannelKind::Auxiliary);
        assert_eq!(rec.sample_rate(), 250.0);
        assert_eq!(rec.n_samples(), 500);
        assert_eq!(rec.annotations(), original.annotations());

        // 16-bit quantization over a ~±100 µV range
        let max_err = (rec.data() - original.data())
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(max_err < 1e-8, "max error {}", max_err);
    }

    #[test]
    fn test_parse_tals() {
        let bytes = b"+0\x14\x14\0+1.5\x150.2\x14770\x14\0+3\x14771\x14772\x14\0\0\0";
        let mut out = Vec::new();
        parse_tals(bytes, &mut out);
        assert_eq!(
            out,
            vec![
                (1.5, "770".to_string()),
                (3.0, "771".to_string()),
                (3.0, "772".to_string()),
            ]
        );
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        assert!(EdfReader::from_bytes(vec![b' '; 100]).is_err());
    }

    #[test]
    fn test_format_field_fits() {
        assert_eq!(format_field(-100.0), "-100");
        assert!(format_field(-123.456789).len() <= 8);
        assert!(format_field(1.0e-7).len() <= 8);
    }
}
