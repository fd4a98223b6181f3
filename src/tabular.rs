//! Row-oriented **tabular** output (`--csv`).
//!
//! Column order is fixed and shared with existing consumers:
//!
//! | idx | column            | format        |
//! |-----|-------------------|---------------|
//! | 0   | `refName`         | text          |
//! | 1   | `tpl`             | 1-based int   |
//! | 2   | `strand`          | 0 fwd / 1 rev |
//! | 3   | `base`            | A/C/G/T/N     |
//! | 4   | `score`           | int           |
//! | 5   | `tMean`           | `%.3f`        |
//! | 6   | `tErr`            | `%.3f`        |
//! | 7   | `modelPrediction` | `%.3f`        |
//! | 8   | `ipdRatio`        | `%.3f`        |
//! | 9   | `coverage`        | int           |
//!
//! With methylated fractions enabled, `frac`, `fracLow`, `fracUp` follow (`%.3f`,
//! empty where a record has none).
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::record::{Base, KineticFields, MethylFraction, Strand, StrandRecord};

pub const COLUMNS: [&str; 10] = [
    "refName", "tpl", "strand", "base", "score", "tMean", "tErr", "modelPrediction", "ipdRatio", "coverage",
];

pub const FRACTION_COLUMNS: [&str; 3] = ["frac", "fracLow", "fracUp"];

/// Index of `ipdRatio` in a row.
pub const IPD_RATIO_COLUMN: usize = 8;

/// Three-decimal rendering shared by every text output.
pub fn fmt_float(v: f64) -> String { format!("{:.3}", v) }

/// Streaming writer; rows appear in the order records are written.
pub struct TabularWriter<W: Write> {
    inner: csv::Writer<W>,
    with_fractions: bool,
    rows: usize,
}

impl TabularWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, with_fractions: bool) -> Result<Self> {
        let p = path.as_ref();
        let f = File::create(p).with_context(|| format!("creating {}", p.display()))?;
        TabularWriter::new(BufWriter::new(f), with_fractions)
    }
}

impl<W: Write> TabularWriter<W> {
    pub fn new(w: W, with_fractions: bool) -> Result<Self> {
        let mut inner = csv::WriterBuilder::new().has_headers(false).from_writer(w);
        let mut header: Vec<&str> = COLUMNS.to_vec();
        if with_fractions {
            header.extend_from_slice(&FRACTION_COLUMNS);
        }
        inner.write_record(&header)?;
        Ok(TabularWriter { inner, with_fractions, rows: 0 })
    }

    pub fn write(&mut self, r: &StrandRecord) -> Result<()> {
        let f = &r.fields;
        let mut row = vec![
            r.reference.clone(),
            r.position.to_string(),
            r.strand.flag().to_string(),
            r.base.to_string(),
            f.score.to_string(),
            fmt_float(f.t_mean),
            fmt_float(f.t_err),
            fmt_float(f.model_prediction),
            fmt_float(f.ipd_ratio),
            f.coverage.to_string(),
        ];
        if self.with_fractions {
            match f.fraction {
                Some(m) => row.extend([fmt_float(m.frac), fmt_float(m.frac_low), fmt_float(m.frac_up)]),
                None => row.extend([String::new(), String::new(), String::new()]),
            }
        }
        self.inner.write_record(&row)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize { self.rows }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.inner.into_inner().map_err(|e| anyhow::anyhow!("flushing tabular output: {}", e.error()))
    }
}

/// Write every record of `records`; returns the row count.
pub fn write_all<W: Write, I: IntoIterator<Item = StrandRecord>>(w: W, records: I, with_fractions: bool) -> Result<usize> {
    let mut tw = TabularWriter::new(w, with_fractions)?;
    for r in records {
        tw.write(&r)?;
    }
    let n = tw.rows();
    tw.finish()?;
    Ok(n)
}

/// One parsed row, with the `ipdRatio` text exactly as written.
#[derive(Clone, Debug, PartialEq)]
pub struct TabularRow {
    pub record: StrandRecord,
    pub ipd_ratio_text: String,
}

fn parse_f64(s: &str, col: &str, line: usize) -> Result<f64> {
    s.trim().parse().with_context(|| format!("line {line}: bad {col} {s:?}"))
}

fn parse_u32(s: &str, col: &str, line: usize) -> Result<u32> {
    s.trim().parse().with_context(|| format!("line {line}: bad {col} {s:?}"))
}

/// Parse a table written by [`TabularWriter`]. Quotes around `refName` are accepted.
pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<TabularRow>> {
    let p = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(p)
        .with_context(|| format!("opening {}", p.display()))?;
    let with_fractions = rdr.headers()?.iter().any(|h| h == FRACTION_COLUMNS[0]);
    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let r = rec?;
        let line = i + 2;
        if r.len() < COLUMNS.len() {
            bail!("{}: line {} has {} fields, expected at least {}", p.display(), line, r.len(), COLUMNS.len());
        }
        let flag = parse_u32(&r[2], "strand", line)?;
        let strand = Strand::from_flag(flag).with_context(|| format!("line {line}: strand flag {flag} is not 0 or 1"))?;
        let base = r[3]
            .chars()
            .next()
            .and_then(Base::from_char)
            .with_context(|| format!("line {line}: bad base {:?}", &r[3]))?;
        let fraction = if with_fractions && r.len() >= COLUMNS.len() + 3 && !r[10].is_empty() {
            Some(MethylFraction {
                frac: parse_f64(&r[10], "frac", line)?,
                frac_low: parse_f64(&r[11], "fracLow", line)?,
                frac_up: parse_f64(&r[12], "fracUp", line)?,
            })
        } else {
            None
        };
        let fields = KineticFields {
            score: parse_u32(&r[4], "score", line)?,
            t_mean: parse_f64(&r[5], "tMean", line)?,
            t_err: parse_f64(&r[6], "tErr", line)?,
            model_prediction: parse_f64(&r[7], "modelPrediction", line)?,
            ipd_ratio: parse_f64(&r[IPD_RATIO_COLUMN], "ipdRatio", line)?,
            coverage: parse_u32(&r[9], "coverage", line)?,
            fraction,
        };
        out.push(TabularRow {
            record: StrandRecord {
                reference: r[0].trim_matches('"').to_string(),
                position: parse_u32(&r[1], "tpl", line)?,
                strand,
                base,
                fields,
            },
            ipd_ratio_text: r[IPD_RATIO_COLUMN].to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StrandOrder;
    use crate::stream::tests::scenario_table;
    use crate::stream::{RecordStream, ReferenceWindow};

    #[test]
    fn column_layout_and_formatting() {
        let t = scenario_table();
        let mut buf = Vec::new();
        let n = write_all(&mut buf, RecordStream::window(&t, ReferenceWindow::new("chr1", 0, 2), StrandOrder::default()), false).unwrap();
        assert_eq!(n, 4);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "refName,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage");
        assert_eq!(lines[1], "chr1,1,0,A,3,0.500,0.100,0.500,1.000,12");
        let f: Vec<_> = lines[2].split(',').collect();
        assert_eq!((f[1], f[2], f[3], f[IPD_RATIO_COLUMN]), ("1", "1", "T", "2.000"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn fraction_columns_are_optional() {
        let mut r = crate::stream::tests::rec("chr1", 1, Strand::Forward, Base::A, 1.0);
        r.fields.fraction = Some(MethylFraction { frac: 0.5, frac_low: 0.25, frac_up: 0.75 });
        let plain = crate::stream::tests::rec("chr1", 1, Strand::Reverse, Base::T, 1.0);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        write_all(File::create(tmp.path()).unwrap(), vec![r.clone(), plain.clone()], true).unwrap();
        let rows = read_rows(tmp.path()).unwrap();
        assert_eq!(rows[0].record, r);
        assert_eq!(rows[1].record.fields.fraction, None);
        let header = std::fs::read_to_string(tmp.path()).unwrap();
        assert!(header.starts_with("refName,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage,frac,fracLow,fracUp\n"));
    }

    #[test]
    fn reads_quoted_reference_names() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "refName,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage\n\"gi|1|x|\",7,1,G,20,1.100,0.200,0.900,1.222,31\n",
        )
        .unwrap();
        let rows = read_rows(tmp.path()).unwrap();
        assert_eq!(rows[0].record.reference, "gi|1|x|");
        assert_eq!(rows[0].record.strand, Strand::Reverse);
        assert_eq!(rows[0].ipd_ratio_text, "1.222");
        assert_eq!(rows[0].record.fields.coverage, 31);
    }

    #[test]
    fn rejects_bad_strand_flag() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "refName,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage\nchr1,1,2,A,0,0,0,0,0,1\n",
        )
        .unwrap();
        assert!(read_rows(tmp.path()).is_err());
    }
}
