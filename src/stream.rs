//! Ordered, restartable production of [`StrandRecord`]s over reference windows.
//!
//! ### Ordering contract
//! - Windows are visited in the order given; within a window positions strictly increase.
//! - Both strands of a position are adjacent, in the caller's [`StrandOrder`].
//! - No coverage on either strand: nothing is emitted for that position.
//! - Coverage on one strand only: the covered record plus a [`StrandRecord::sentinel`]
//!   for the other strand, so consumers never see a silent half pair.
//!
//! A window is re-derivable from its key alone: two streams built from the same
//! source, windows and order yield identical records. Encoders running in parallel
//! each build their own stream instead of sharing a cursor.
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::record::{complement, Measurement, Strand, StrandOrder, StrandRecord};

/// 0-based half-open window `[start, end)` on one reference; covers 1-based positions
/// `start + 1 ..= end`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReferenceWindow {
    pub reference: String,
    pub start: u32,
    pub end: u32,
}

impl ReferenceWindow {
    pub fn new(reference: impl Into<String>, start: u32, end: u32) -> Self {
        ReferenceWindow { reference: reference.into(), start, end }
    }

    /// Parse `refName:start-end`. Reference names may contain `:`; the last one splits.
    pub fn parse(spec: &str) -> Result<Self> {
        let (reference, range) = spec
            .rsplit_once(':')
            .with_context(|| format!("reference window {spec:?} is not of the form refName:start-end"))?;
        let (s, e) = range
            .split_once('-')
            .with_context(|| format!("reference window {spec:?} has no start-end range"))?;
        let start: u32 = s.trim().parse().with_context(|| format!("bad window start in {spec:?}"))?;
        let end: u32 = e.trim().parse().with_context(|| format!("bad window end in {spec:?}"))?;
        if reference.is_empty() {
            bail!("reference window {spec:?} has an empty reference name");
        }
        if start > end {
            bail!("reference window {spec:?} has start > end");
        }
        Ok(ReferenceWindow::new(reference, start, end))
    }

    /// Number of positions covered.
    pub fn len(&self) -> u32 { self.end - self.start }

    pub fn is_empty(&self) -> bool { self.start == self.end }

    /// Split into consecutive sub-windows of at most `stride` positions.
    pub fn chunks(&self, stride: u32) -> Result<Vec<ReferenceWindow>> {
        if stride == 0 {
            bail!("reference stride must be positive");
        }
        let mut out = Vec::new();
        let mut s = self.start;
        while s < self.end {
            let e = s.saturating_add(stride).min(self.end);
            out.push(ReferenceWindow::new(self.reference.clone(), s, e));
            s = e;
        }
        Ok(out)
    }
}

impl fmt::Display for ReferenceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.reference, self.start, self.end)
    }
}

/// Seam to the statistical engine.
///
/// `None` means the engine has no result (no coverage) for that strand.
pub trait KineticSource: Send + Sync {
    fn measure(&self, reference: &str, position: u32, strand: Strand) -> Option<Measurement>;
}

/// Materialized engine output, replayable as a [`KineticSource`].
#[derive(Clone, Debug, Default)]
pub struct MeasurementTable {
    values: HashMap<(String, u32, Strand), Measurement>,
    extents: BTreeMap<String, u32>,
}

impl MeasurementTable {
    pub fn new() -> Self { Self::default() }

    /// Build from records; sentinels carry no measurement and are skipped.
    pub fn from_records<I: IntoIterator<Item = StrandRecord>>(records: I) -> Self {
        let mut t = MeasurementTable::new();
        for r in records {
            if r.is_sentinel() { continue; }
            t.insert(r);
        }
        t
    }

    /// Load a previously written tabular file.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let rows = crate::tabular::read_rows(path)?;
        Ok(Self::from_records(rows.into_iter().map(|r| r.record)))
    }

    pub fn insert(&mut self, r: StrandRecord) {
        let ext = self.extents.entry(r.reference.clone()).or_insert(0);
        *ext = (*ext).max(r.position);
        self.values.insert(
            (r.reference, r.position, r.strand),
            Measurement { base: r.base, fields: r.fields },
        );
    }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// One window per reference, spanning position 1 to the last measured position.
    pub fn references(&self) -> Vec<ReferenceWindow> {
        self.extents.iter().map(|(r, &end)| ReferenceWindow::new(r.clone(), 0, end)).collect()
    }
}

impl KineticSource for MeasurementTable {
    fn measure(&self, reference: &str, position: u32, strand: Strand) -> Option<Measurement> {
        self.values.get(&(reference.to_string(), position, strand)).copied()
    }
}

/// Pull-based iterator over the strand records of a list of windows.
pub struct RecordStream<'a, S: KineticSource + ?Sized> {
    source: &'a S,
    windows: Vec<ReferenceWindow>,
    order: StrandOrder,
    current: usize,
    cursor: u64,
    pending: VecDeque<StrandRecord>,
}

impl<'a, S: KineticSource + ?Sized> RecordStream<'a, S> {
    pub fn new(source: &'a S, windows: Vec<ReferenceWindow>, order: StrandOrder) -> Self {
        let cursor = windows.first().map(|w| w.start as u64 + 1).unwrap_or(0);
        RecordStream { source, windows, order, current: 0, cursor, pending: VecDeque::with_capacity(2) }
    }

    /// Fresh stream over a single window.
    pub fn window(source: &'a S, window: ReferenceWindow, order: StrandOrder) -> Self {
        Self::new(source, vec![window], order)
    }

    pub fn order(&self) -> StrandOrder { self.order }

    fn emit_position(&mut self, reference: &str, position: u32) {
        let [first, second] = self.order.strands();
        let a = self.source.measure(reference, position, first);
        let b = self.source.measure(reference, position, second);
        match (a, b) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                self.pending.push_back(StrandRecord::new(reference, position, first, a));
                self.pending.push_back(StrandRecord::new(reference, position, second, b));
            }
            (Some(a), None) => {
                log::debug!("{}:{} has no {} result; emitting sentinel", reference, position, second);
                self.pending.push_back(StrandRecord::new(reference, position, first, a));
                self.pending.push_back(StrandRecord::sentinel(reference, position, second, complement(a.base)));
            }
            (None, Some(b)) => {
                log::debug!("{}:{} has no {} result; emitting sentinel", reference, position, first);
                self.pending.push_back(StrandRecord::sentinel(reference, position, first, complement(b.base)));
                self.pending.push_back(StrandRecord::new(reference, position, second, b));
            }
        }
    }
}

impl<S: KineticSource + ?Sized> Iterator for RecordStream<'_, S> {
    type Item = StrandRecord;

    fn next(&mut self) -> Option<StrandRecord> {
        loop {
            if let Some(r) = self.pending.pop_front() {
                return Some(r);
            }
            let (reference, end) = {
                let w = self.windows.get(self.current)?;
                (w.reference.clone(), w.end as u64)
            };
            if self.cursor > end {
                self.current += 1;
                if let Some(w) = self.windows.get(self.current) {
                    self.cursor = w.start as u64 + 1;
                }
                continue;
            }
            let position = self.cursor as u32;
            self.cursor += 1;
            self.emit_position(&reference, position);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::{Base, KineticFields};

    pub(crate) fn rec(reference: &str, position: u32, strand: Strand, base: Base, ipd: f64) -> StrandRecord {
        StrandRecord {
            reference: reference.to_string(),
            position,
            strand,
            base,
            fields: KineticFields {
                score: 3,
                t_mean: ipd * 0.5,
                t_err: 0.1,
                model_prediction: 0.5,
                ipd_ratio: ipd,
                coverage: 12,
                fraction: None,
            },
        }
    }

    /// The four-record scenario: positions 1 and 2, both strands.
    pub(crate) fn scenario_table() -> MeasurementTable {
        MeasurementTable::from_records(vec![
            rec("chr1", 1, Strand::Forward, Base::A, 1.00),
            rec("chr1", 1, Strand::Reverse, Base::T, 2.00),
            rec("chr1", 2, Strand::Forward, Base::C, 0.50),
            rec("chr1", 2, Strand::Reverse, Base::G, 0.00),
        ])
    }

    #[test]
    fn parses_windows_with_colons_in_names() {
        let w = ReferenceWindow::parse("gi|12057207|gb|AE001439.1|:0-200").unwrap();
        assert_eq!(w.reference, "gi|12057207|gb|AE001439.1|");
        assert_eq!((w.start, w.end), (0, 200));
        assert_eq!(w.to_string(), "gi|12057207|gb|AE001439.1|:0-200");
        let w = ReferenceWindow::parse("a:b:5-7").unwrap();
        assert_eq!(w.reference, "a:b");
        assert!(ReferenceWindow::parse("chr1").is_err());
        assert!(ReferenceWindow::parse("chr1:9-3").is_err());
        assert!(ReferenceWindow::parse(":1-3").is_err());
    }

    #[test]
    fn chunks_cover_window_exactly() {
        let w = ReferenceWindow::new("chr1", 0, 250);
        let c = w.chunks(100).unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!((c[2].start, c[2].end), (200, 250));
        assert!(w.chunks(0).is_err());
        assert!(ReferenceWindow::new("chr1", 4, 4).chunks(10).unwrap().is_empty());
    }

    #[test]
    fn forward_then_reverse_by_default() {
        let t = scenario_table();
        let out: Vec<_> = RecordStream::window(&t, ReferenceWindow::new("chr1", 0, 2), StrandOrder::default()).collect();
        let keys: Vec<_> = out.iter().map(|r| (r.position, r.strand)).collect();
        assert_eq!(keys, vec![
            (1, Strand::Forward), (1, Strand::Reverse),
            (2, Strand::Forward), (2, Strand::Reverse),
        ]);
    }

    #[test]
    fn reverse_first_is_honoured() {
        let t = scenario_table();
        let out: Vec<_> = RecordStream::window(&t, ReferenceWindow::new("chr1", 0, 2), StrandOrder::ReverseFirst).collect();
        assert_eq!(out[0].strand, Strand::Reverse);
        assert_eq!(out[1].strand, Strand::Forward);
        assert_eq!(out[0].position, out[1].position);
    }

    #[test]
    fn uncovered_positions_emit_nothing() {
        let mut t = scenario_table();
        t.insert(rec("chr1", 6, Strand::Forward, Base::A, 1.5));
        t.insert(rec("chr1", 6, Strand::Reverse, Base::T, 1.5));
        let out: Vec<_> = RecordStream::window(&t, ReferenceWindow::new("chr1", 0, 6), StrandOrder::default()).collect();
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|r| r.position != 5 && r.position != 3));
    }

    #[test]
    fn half_pair_gets_sentinel() {
        let t = MeasurementTable::from_records(vec![rec("chr1", 3, Strand::Reverse, Base::G, 1.2)]);
        let out: Vec<_> = RecordStream::window(&t, ReferenceWindow::new("chr1", 0, 5), StrandOrder::default()).collect();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_sentinel());
        assert_eq!(out[0].strand, Strand::Forward);
        assert_eq!(out[0].base, Base::C);
        assert!(!out[1].is_sentinel());
    }

    #[test]
    fn windows_are_restartable_and_chunkable() {
        let t = scenario_table();
        let whole = ReferenceWindow::new("chr1", 0, 2);
        let a: Vec<_> = RecordStream::window(&t, whole.clone(), StrandOrder::default()).collect();
        let b: Vec<_> = RecordStream::window(&t, whole.clone(), StrandOrder::default()).collect();
        assert_eq!(a, b);
        let chunked: Vec<_> = RecordStream::new(&t, whole.chunks(1).unwrap(), StrandOrder::default()).collect();
        assert_eq!(a, chunked);
    }

    #[test]
    fn table_reports_reference_extents() {
        let t = scenario_table();
        assert_eq!(t.references(), vec![ReferenceWindow::new("chr1", 0, 2)]);
        assert_eq!(t.len(), 4);
    }
}
