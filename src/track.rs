//! Strand-multiplexed **packed track** values.
//!
//! Genome-track formats such as bigWig carry one value per coordinate and have no
//! strand axis. Both strands' IPD ratios are therefore folded into one `u32`:
//!
//! ```text
//! packed = round(ipdRatio_forward * 100) << 16 | round(ipdRatio_reverse * 100)
//! ```
//!
//! Each half is fixed-point with two decimals, so a ratio must lie in `0..=655.35`.
//! Anything else is [`TrackError::EncodingOverflow`], never clamped or wrapped.
//! A half of `0` means "no signal", which cannot be told apart from a true zero ratio.
//!
//! # Examples
//! ```
//! use kinetrack::track::{encode_pair, decode_pair};
//! let v = encode_pair("chr1", 1, 1.0, 2.0).unwrap();
//! assert_eq!(v, (100 << 16) | 200);
//! assert_eq!(decode_pair(v), (1.0, 2.0));
//! ```
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::TrackError;
use crate::record::{Strand, StrandRecord};

/// Fixed-point scale applied to each ratio.
pub const IPD_SCALE: f64 = 100.0;

/// Largest ratio representable in one 16-bit half.
pub const MAX_ENCODABLE_RATIO: f64 = u16::MAX as f64 / IPD_SCALE;

/// Worst-case absolute error of a decoded ratio: half a quantization step.
pub const PACKED_TOLERANCE: f64 = 0.5 / IPD_SCALE;

/// Scale one ratio to its 16-bit field, or `None` if it is not representable.
pub fn scale_ratio(value: f64) -> Option<u16> {
    if !value.is_finite() || value < 0.0 || value > MAX_ENCODABLE_RATIO {
        return None;
    }
    Some((value * IPD_SCALE).round() as u16)
}

/// Forward field in the high 16 bits, reverse field in the low 16.
pub fn pack_halves(forward: u16, reverse: u16) -> u32 {
    ((forward as u32) << 16) | reverse as u32
}

/// Encode both strands' ratios for the coordinate `reference:position`.
pub fn encode_pair(reference: &str, position: u32, forward: f64, reverse: f64) -> Result<u32, TrackError> {
    let overflow = |strand, value| TrackError::EncodingOverflow {
        reference: reference.to_string(),
        position,
        strand,
        value,
    };
    let hi = scale_ratio(forward).ok_or_else(|| overflow(Strand::Forward, forward))?;
    let lo = scale_ratio(reverse).ok_or_else(|| overflow(Strand::Reverse, reverse))?;
    Ok(pack_halves(hi, lo))
}

/// Decode into `(ipdRatio_forward, ipdRatio_reverse)`.
pub fn decode_pair(packed: u32) -> (f64, f64) {
    let forward = (packed >> 16) as f64 / IPD_SCALE;
    let reverse = (packed % 65536) as f64 / IPD_SCALE;
    (forward, reverse)
}

/// Decoded ratio of one strand.
pub fn decode_strand(packed: u32, strand: Strand) -> f64 {
    let (f, r) = decode_pair(packed);
    match strand {
        Strand::Forward => f,
        Strand::Reverse => r,
    }
}

/// Packed values keyed by `(reference, 1-based position)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackedTrack {
    values: BTreeMap<(String, u32), u32>,
}

impl PackedTrack {
    pub fn new() -> Self { Self::default() }

    /// Fold a paired record stream; the first failure aborts.
    pub fn fold<I: IntoIterator<Item = StrandRecord>>(records: I) -> Result<Self, TrackError> {
        let mut track = PackedTrack::new();
        track.fold_with(records, Err)?;
        Ok(track)
    }

    /// Fold a paired record stream, skipping coordinates that overflow.
    ///
    /// Pairing violations still abort. Skipped coordinates are returned alongside the track.
    pub fn fold_lenient<I: IntoIterator<Item = StrandRecord>>(records: I) -> Result<(Self, Vec<TrackError>), TrackError> {
        let mut track = PackedTrack::new();
        let mut skipped = Vec::new();
        track.fold_with(records, |e| {
            log::warn!("skipping coordinate: {}", e);
            skipped.push(e);
            Ok(())
        })?;
        Ok((track, skipped))
    }

    fn fold_with<I, F>(&mut self, records: I, mut on_overflow: F) -> Result<(), TrackError>
    where
        I: IntoIterator<Item = StrandRecord>,
        F: FnMut(TrackError) -> Result<(), TrackError>,
    {
        let mut it = records.into_iter().peekable();
        while let Some(first) = it.next() {
            let unpaired = |reason| TrackError::StreamPairing {
                reference: first.reference.clone(),
                position: first.position,
                strand: first.strand,
                reason,
            };
            let same_coord = it
                .peek()
                .map(|n| n.reference == first.reference && n.position == first.position)
                .unwrap_or(false);
            if !same_coord {
                return Err(unpaired("partner strand record missing"));
            }
            let second = match it.next() {
                Some(s) => s,
                None => return Err(unpaired("partner strand record missing")),
            };
            if second.strand == first.strand {
                return Err(unpaired("both records at coordinate carry the same strand"));
            }
            let key = (first.reference.clone(), first.position);
            if self.values.contains_key(&key) {
                return Err(unpaired("coordinate emitted more than once"));
            }
            let (fwd, rev) = if first.strand == Strand::Forward { (&first, &second) } else { (&second, &first) };
            match encode_pair(&key.0, key.1, fwd.ipd_ratio(), rev.ipd_ratio()) {
                Ok(v) => { self.values.insert(key, v); }
                Err(e) => on_overflow(e)?,
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, reference: impl Into<String>, position: u32, packed: u32) {
        self.values.insert((reference.into(), position), packed);
    }

    pub fn get(&self, reference: &str, position: u32) -> Option<u32> {
        self.values.get(&(reference.to_string(), position)).copied()
    }

    /// Decoded `(forward, reverse)` ratios at a coordinate.
    pub fn decode_at(&self, reference: &str, position: u32) -> Option<(f64, f64)> {
        self.get(reference, position).map(decode_pair)
    }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// `(reference, position, packed)` in reference then position order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32, u32)> + '_ {
        self.values.iter().map(|((r, p), v)| (r.as_str(), *p, *v))
    }

    /// Write as bedGraph: `ref  pos-1  pos  packed`, one line per coordinate.
    pub fn write_bedgraph<W: Write>(&self, w: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').has_headers(false).from_writer(w);
        for (reference, position, packed) in self.iter() {
            let Some(start) = position.checked_sub(1) else {
                anyhow::bail!("packed value at {}:0 has no 1-based position", reference);
            };
            wtr.write_record(&[
                reference.to_string(),
                start.to_string(),
                position.to_string(),
                packed.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_bedgraph_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        let f = File::create(p).with_context(|| format!("creating {}", p.display()))?;
        self.write_bedgraph(BufWriter::new(f))
    }

    /// Read a bedGraph written by [`PackedTrack::write_bedgraph`]. Only single-base
    /// intervals are accepted.
    pub fn read_bedgraph<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .from_path(p)
            .with_context(|| format!("opening {}", p.display()))?;
        let mut track = PackedTrack::new();
        for (i, rec) in rdr.records().enumerate() {
            let r = rec?;
            if r.len() < 4 {
                anyhow::bail!("{}: line {} has {} fields, expected 4", p.display(), i + 1, r.len());
            }
            let start: u32 = r[1].parse().with_context(|| format!("{}: bad start on line {}", p.display(), i + 1))?;
            let end: u32 = r[2].parse().with_context(|| format!("{}: bad end on line {}", p.display(), i + 1))?;
            let packed: u32 = r[3].parse().with_context(|| format!("{}: bad value on line {}", p.display(), i + 1))?;
            if start.checked_add(1) != Some(end) {
                anyhow::bail!("{}: line {} spans {}-{}, expected a single base", p.display(), i + 1, start, end);
            }
            track.insert(&r[0], end, packed);
        }
        Ok(track)
    }
}
