//! pprof profile encoding
//!
//! Snapshot profiles are built as `perftools.profiles.Profile` messages and
//! written gzip-compressed, which is what `pprof` expects on disk. Only the
//! fields the snapshots fill in are declared; the tags match `profile.proto`.

use std::collections::HashMap;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;

use crate::domain::ProfileWriteError;

#[derive(Clone, PartialEq, Message)]
pub struct Profile {
    #[prost(message, repeated, tag = "1")]
    pub sample_type: Vec<ValueType>,
    #[prost(message, repeated, tag = "2")]
    pub sample: Vec<Sample>,
    #[prost(message, repeated, tag = "4")]
    pub location: Vec<Location>,
    #[prost(message, repeated, tag = "5")]
    pub function: Vec<Function>,
    #[prost(string, repeated, tag = "6")]
    pub string_table: Vec<String>,
    #[prost(int64, tag = "9")]
    pub time_nanos: i64,
    #[prost(message, optional, tag = "11")]
    pub period_type: Option<ValueType>,
    #[prost(int64, tag = "12")]
    pub period: i64,
    #[prost(int64, tag = "14")]
    pub default_sample_type: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValueType {
    #[prost(int64, tag = "1")]
    pub ty: i64,
    #[prost(int64, tag = "2")]
    pub unit: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Sample {
    #[prost(uint64, repeated, tag = "1")]
    pub location_id: Vec<u64>,
    #[prost(int64, repeated, tag = "2")]
    pub value: Vec<i64>,
    #[prost(message, repeated, tag = "3")]
    pub label: Vec<Label>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Label {
    #[prost(int64, tag = "1")]
    pub key: i64,
    #[prost(int64, tag = "2")]
    pub str: i64,
    #[prost(int64, tag = "3")]
    pub num: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Location {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, repeated, tag = "4")]
    pub line: Vec<Line>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Line {
    #[prost(uint64, tag = "1")]
    pub function_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Function {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(int64, tag = "2")]
    pub name: i64,
    #[prost(int64, tag = "3")]
    pub system_name: i64,
}

/// A label attached to one sample
#[derive(Debug, Clone)]
pub enum LabelValue<'a> {
    Str(&'a str),
    Num(i64),
}

/// Incrementally assembles a [`Profile`], interning strings and frames.
#[derive(Debug)]
pub struct ProfileBuilder {
    profile: Profile,
    strings: HashMap<String, i64>,
    frames: HashMap<String, u64>,
}

impl ProfileBuilder {
    /// Start a profile whose samples carry one value per `(type, unit)` pair.
    #[must_use]
    pub fn new(sample_types: &[(&str, &str)]) -> Self {
        let mut builder = Self {
            profile: Profile::default(),
            strings: HashMap::new(),
            frames: HashMap::new(),
        };
        // string_table[0] must be ""
        builder.string("");
        for (ty, unit) in sample_types {
            let value_type = builder.value_type(ty, unit);
            builder.profile.sample_type.push(value_type);
        }
        builder.profile.time_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX));
        builder
    }

    /// Every sample stands for `period` units of `ty`
    #[must_use]
    pub fn period(mut self, ty: &str, unit: &str, period: i64) -> Self {
        self.profile.period_type = Some(self.value_type(ty, unit));
        self.profile.period = period;
        self
    }

    #[must_use]
    pub fn default_sample_type(mut self, ty: &str) -> Self {
        self.profile.default_sample_type = self.string(ty);
        self
    }

    /// Add one sample. `frames` are leaf first, like pprof stacks.
    pub fn sample(&mut self, frames: &[&str], values: Vec<i64>, labels: &[(&str, LabelValue<'_>)]) {
        let location_id = frames.iter().map(|frame| self.location(frame)).collect();
        let label = labels
            .iter()
            .map(|(key, value)| {
                let key = self.string(key);
                match value {
                    LabelValue::Str(s) => Label { key, str: self.string(s), num: 0 },
                    LabelValue::Num(n) => Label { key, str: 0, num: *n },
                }
            })
            .collect();
        self.profile.sample.push(Sample { location_id, value: values, label });
    }

    #[must_use]
    pub fn build(self) -> Profile {
        self.profile
    }

    fn value_type(&mut self, ty: &str, unit: &str) -> ValueType {
        ValueType { ty: self.string(ty), unit: self.string(unit) }
    }

    fn string(&mut self, s: &str) -> i64 {
        if let Some(&index) = self.strings.get(s) {
            return index;
        }
        let index = i64::try_from(self.profile.string_table.len()).unwrap_or(i64::MAX);
        self.profile.string_table.push(s.to_string());
        self.strings.insert(s.to_string(), index);
        index
    }

    /// Locations and functions are 1:1 here, sharing the same ID
    fn location(&mut self, frame: &str) -> u64 {
        if let Some(&id) = self.frames.get(frame) {
            return id;
        }
        let id = self.profile.function.len() as u64 + 1;
        let name = self.string(frame);
        self.profile.function.push(Function { id, name, system_name: name });
        self.profile.location.push(Location { id, line: vec![Line { function_id: id }] });
        self.frames.insert(frame.to_string(), id);
        id
    }
}

/// Write `bytes` gzip-compressed into `out`
///
/// # Errors
/// Returns the I/O error from compressing or writing.
pub fn write_gzip(bytes: &[u8], out: &mut dyn Write) -> Result<(), ProfileWriteError> {
    let mut encoder = GzEncoder::new(out, Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Encode `profile` and write it gzip-compressed into `out`
///
/// # Errors
/// Returns the I/O error from compressing or writing.
pub fn write_profile(profile: &Profile, out: &mut dyn Write) -> Result<(), ProfileWriteError> {
    write_gzip(&profile.encode_to_vec(), out)
}

#[cfg(test)]
pub(crate) fn decode(bytes: &[u8]) -> Profile {
    use std::io::Read;

    let mut raw = Vec::new();
    flate2::read::GzDecoder::new(bytes).read_to_end(&mut raw).unwrap();
    Profile::decode(raw.as_slice()).unwrap()
}
