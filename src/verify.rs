//! Cross-format **consistency checker**.
//!
//! Given the tabular rows, the columnar records and the packed track produced from
//! one stream, this checks that:
//! - tabular row `i` and columnar row `i` agree on reference, position, strand and base,
//!   and the columnar `ipdRatio` rendered with three decimals equals the tabular text;
//! - each coordinate carries exactly one row per strand (sentinels included);
//! - the packed value at each row's coordinate decodes, for that row's strand, to within
//!   half a quantization step of the columnar ratio (plus the three-decimal rounding of
//!   the tabular ratio);
//! - every packed coordinate has tabular rows.
//!
//! Mismatches are collected, not raised; the caller decides what a failure means.
use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;

use crate::record::StrandRecord;
use crate::tabular::{fmt_float, TabularRow};
use crate::track::{decode_strand, PackedTrack, PACKED_TOLERANCE};

/// Extra slack for ratios read back from three-decimal text.
pub const TEXT_TOLERANCE: f64 = 0.0005;

const EPS: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq)]
pub struct Mismatch {
    /// Emission-order row index, when the mismatch is tied to a row.
    pub row: Option<usize>,
    pub reference: String,
    pub position: u32,
    pub detail: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsistencyReport {
    pub rows_checked: usize,
    pub coordinates_checked: usize,
    pub mismatches: Vec<Mismatch>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool { self.mismatches.is_empty() }

    pub fn to_json(&self) -> serde_json::Value {
        let mismatches: Vec<serde_json::Value> = self
            .mismatches
            .iter()
            .map(|m| {
                serde_json::json!({
                    "row": m.row,
                    "reference": m.reference,
                    "position": m.position,
                    "detail": m.detail,
                })
            })
            .collect();
        serde_json::json!({
            "consistent": self.is_consistent(),
            "rows_checked": self.rows_checked,
            "coordinates_checked": self.coordinates_checked,
            "mismatches": mismatches,
        })
    }

    fn push(&mut self, row: Option<usize>, r: &StrandRecord, detail: String) {
        self.mismatches.push(Mismatch { row, reference: r.reference.clone(), position: r.position, detail });
    }
}

/// Compare all three representations of one stream.
pub fn check(rows: &[TabularRow], columnar: &[StrandRecord], track: &PackedTrack) -> ConsistencyReport {
    let mut report = ConsistencyReport { rows_checked: rows.len(), coordinates_checked: track.len(), ..Default::default() };

    if rows.len() != columnar.len() {
        report.mismatches.push(Mismatch {
            row: None,
            reference: String::new(),
            position: 0,
            detail: format!("tabular has {} rows, columnar has {}", rows.len(), columnar.len()),
        });
    }

    for (i, (t, c)) in rows.iter().zip(columnar.iter()).enumerate() {
        let tr = &t.record;
        if tr.reference != c.reference || tr.position != c.position {
            report.push(Some(i), tr, format!("columnar row is {}:{}", c.reference, c.position));
        }
        if tr.strand != c.strand {
            report.push(Some(i), tr, format!("strand {} vs columnar {}", tr.strand, c.strand));
        }
        if tr.base != c.base {
            report.push(Some(i), tr, format!("base {} vs columnar {}", tr.base, c.base));
        }
        let col_text = fmt_float(c.ipd_ratio());
        if col_text != t.ipd_ratio_text {
            report.push(Some(i), tr, format!("ipdRatio {} vs columnar {}", t.ipd_ratio_text, col_text));
        }
    }

    let mut strands_at: HashMap<(&str, u32), Vec<usize>> = HashMap::new();
    for (i, t) in rows.iter().enumerate() {
        strands_at.entry((t.record.reference.as_str(), t.record.position)).or_default().push(i);
    }
    let mut coords: Vec<_> = strands_at.iter().collect();
    coords.sort_by_key(|(_, idx)| idx[0]);
    for (_, idx) in coords {
        let first = &rows[idx[0]].record;
        let paired = idx.len() == 2 && rows[idx[0]].record.strand != rows[idx[1]].record.strand;
        if !paired {
            report.push(Some(idx[0]), first, format!("coordinate has {} rows, expected one per strand", idx.len()));
        }
    }

    for (i, t) in rows.iter().enumerate() {
        let tr = &t.record;
        let Some(packed) = track.get(&tr.reference, tr.position) else {
            report.push(Some(i), tr, "no packed track value".to_string());
            continue;
        };
        let decoded = decode_strand(packed, tr.strand);
        if (decoded - tr.ipd_ratio()).abs() > PACKED_TOLERANCE + TEXT_TOLERANCE + EPS {
            report.push(Some(i), tr, format!("packed {} ratio {:.2} vs tabular {}", tr.strand, decoded, t.ipd_ratio_text));
        }
        if let Some(c) = columnar.get(i) {
            if c.reference == tr.reference && c.position == tr.position && c.strand == tr.strand
                && (decoded - c.ipd_ratio()).abs() > PACKED_TOLERANCE + EPS
            {
                report.push(Some(i), tr, format!("packed {} ratio {:.2} vs columnar {}", tr.strand, decoded, c.ipd_ratio()));
            }
        }
    }

    for (reference, position, _) in track.iter() {
        if !strands_at.contains_key(&(reference, position)) {
            report.mismatches.push(Mismatch {
                row: None,
                reference: reference.to_string(),
                position,
                detail: "packed coordinate has no tabular rows".to_string(),
            });
        }
    }

    report
}

/// Load persisted outputs and [`check`] them.
pub fn check_files<P: AsRef<Path>>(csv: P, ipc: P, bedgraph: P) -> Result<ConsistencyReport> {
    let rows = crate::tabular::read_rows(csv)?;
    let frame = crate::columnar::read_ipc(ipc)?;
    let columnar = crate::columnar::records_from_frame(&frame)?;
    let track = PackedTrack::read_bedgraph(bedgraph)?;
    Ok(check(&rows, &columnar, &track))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{run, EmitPlan};
    use crate::record::{Base, Strand, StrandOrder};
    use crate::stream::tests::{rec, scenario_table};
    use crate::stream::{MeasurementTable, RecordStream, ReferenceWindow};
    use tempfile::TempDir;

    fn plan(dir: &TempDir, windows: Vec<ReferenceWindow>) -> EmitPlan {
        EmitPlan {
            windows,
            order: StrandOrder::default(),
            with_fractions: false,
            skip_overflow: false,
            csv: Some(dir.path().join("out.csv")),
            columnar: Some(dir.path().join("out.arrow")),
            track: Some(dir.path().join("out.bedgraph")),
            threads: Some(3),
        }
    }

    fn in_memory(t: &MeasurementTable, w: &ReferenceWindow) -> (Vec<TabularRow>, Vec<StrandRecord>, PackedTrack) {
        let records: Vec<_> = RecordStream::window(t, w.clone(), StrandOrder::default()).collect();
        let rows = records
            .iter()
            .map(|r| TabularRow { record: r.clone(), ipd_ratio_text: fmt_float(r.ipd_ratio()) })
            .collect();
        let track = PackedTrack::fold(records.clone()).unwrap();
        (rows, records, track)
    }

    #[test]
    fn four_record_scenario_agrees_across_formats() {
        let dir = TempDir::new().unwrap();
        let p = plan(&dir, vec![ReferenceWindow::new("chr1", 0, 2)]);
        let summary = run(&scenario_table(), &p).unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.track_entries, 2);

        let rows = crate::tabular::read_rows(p.csv.as_ref().unwrap()).unwrap();
        let bases: String = rows.iter().map(|r| r.record.base.as_char()).collect();
        assert_eq!(bases, "ATCG");
        let flags: Vec<_> = rows.iter().map(|r| r.record.strand.flag()).collect();
        assert_eq!(flags, vec![0, 1, 0, 1]);

        let track = PackedTrack::read_bedgraph(p.track.as_ref().unwrap()).unwrap();
        assert_eq!(track.get("chr1", 1), Some((100 << 16) | 200));
        assert_eq!(track.get("chr1", 2), Some((50 << 16) | 0));

        let report = check_files(p.csv.unwrap(), p.columnar.unwrap(), p.track.unwrap()).unwrap();
        assert!(report.is_consistent(), "{:?}", report.mismatches);
        assert_eq!(report.rows_checked, 4);
        assert_eq!(report.coordinates_checked, 2);
    }

    #[test]
    fn missing_coverage_produces_nothing_anywhere() {
        let mut t = MeasurementTable::new();
        for pos in [4u32, 6] {
            t.insert(rec("chr1", pos, Strand::Forward, Base::A, 1.25));
            t.insert(rec("chr1", pos, Strand::Reverse, Base::T, 0.75));
        }
        let dir = TempDir::new().unwrap();
        let p = plan(&dir, vec![ReferenceWindow::new("chr1", 3, 6)]);
        run(&t, &p).unwrap();
        let rows = crate::tabular::read_rows(p.csv.as_ref().unwrap()).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.record.position != 5));
        let frame = crate::columnar::read_ipc(p.columnar.as_ref().unwrap()).unwrap();
        let tpl: Vec<_> = frame.column("tpl").unwrap().u32().unwrap().into_no_null_iter().collect();
        assert!(!tpl.contains(&5));
        let track = PackedTrack::read_bedgraph(p.track.as_ref().unwrap()).unwrap();
        assert_eq!(track.get("chr1", 5), None);
        assert_eq!(track.len(), 2);
        let report = check_files(p.csv.unwrap(), p.columnar.unwrap(), p.track.unwrap()).unwrap();
        assert!(report.is_consistent(), "{:?}", report.mismatches);
    }

    #[test]
    fn sentinel_pairs_stay_consistent() {
        let t = MeasurementTable::from_records(vec![rec("chr1", 2, Strand::Forward, Base::C, 3.333)]);
        let (rows, cols, track) = in_memory(&t, &ReferenceWindow::new("chr1", 0, 3));
        assert_eq!(rows.len(), 2);
        assert!(rows[1].record.is_sentinel());
        assert_eq!(track.get("chr1", 2), Some(333 << 16));
        assert!(check(&rows, &cols, &track).is_consistent());
    }

    #[test]
    fn detects_corrupted_track_value() {
        let (rows, cols, mut track) = in_memory(&scenario_table(), &ReferenceWindow::new("chr1", 0, 2));
        track.insert("chr1", 1, (100 << 16) | 210);
        let report = check(&rows, &cols, &track);
        assert!(!report.is_consistent());
        assert!(report.mismatches.iter().all(|m| m.position == 1 && m.row == Some(1)));
        assert_eq!(report.to_json()["consistent"], serde_json::json!(false));
    }

    #[test]
    fn detects_row_misalignment_and_orphan_coordinates() {
        let (rows, mut cols, mut track) = in_memory(&scenario_table(), &ReferenceWindow::new("chr1", 0, 2));
        cols.swap(0, 1);
        track.insert("chr1", 9, 100);
        let report = check(&rows, &cols, &track);
        let details: Vec<_> = report.mismatches.iter().map(|m| m.detail.as_str()).collect();
        assert!(details.iter().any(|d| d.starts_with("strand")));
        assert!(details.iter().any(|d| d.starts_with("base")));
        assert!(details.contains(&"packed coordinate has no tabular rows"));
    }

    #[test]
    fn detects_half_pair_and_row_count() {
        let (mut rows, cols, track) = in_memory(&scenario_table(), &ReferenceWindow::new("chr1", 0, 2));
        rows.pop();
        let report = check(&rows, &cols, &track);
        let details: Vec<_> = report.mismatches.iter().map(|m| m.detail.clone()).collect();
        assert!(details.iter().any(|d| d.contains("tabular has 3 rows, columnar has 4")));
        assert!(details.iter().any(|d| d.contains("coordinate has 1 rows")));
    }

    #[test]
    fn three_decimal_text_is_within_tolerance() {
        let t = MeasurementTable::from_records(vec![
            rec("chr1", 1, Strand::Forward, Base::A, 1.2349),
            rec("chr1", 1, Strand::Reverse, Base::T, 0.0051),
        ]);
        let dir = TempDir::new().unwrap();
        let p = plan(&dir, vec![ReferenceWindow::new("chr1", 0, 1)]);
        run(&t, &p).unwrap();
        let report = check_files(p.csv.unwrap(), p.columnar.unwrap(), p.track.unwrap()).unwrap();
        assert!(report.is_consistent(), "{:?}", report.mismatches);
    }
}
