//! **Columnar** store (`--columnar`): parallel, same-length arrays built with polars.
//!
//! Row `i` of every column is the `i`-th record of the stream, the same record as
//! row `i` of the tabular output. Column names follow [`crate::tabular::COLUMNS`].
//! Floats are stored at full precision; only the text output rounds to three decimals.
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::record::{Base, KineticFields, MethylFraction, Strand, StrandRecord};

/// Build the frame; `frac`/`fracLow`/`fracUp` columns are added when `with_fractions`.
pub fn build_frame<I: IntoIterator<Item = StrandRecord>>(records: I, with_fractions: bool) -> Result<DataFrame> {
    let mut ref_v: Vec<String> = Vec::new();
    let mut tpl_v: Vec<u32> = Vec::new();
    let mut strand_v: Vec<u32> = Vec::new();
    let mut base_v: Vec<String> = Vec::new();
    let mut score_v: Vec<u32> = Vec::new();
    let mut tmean_v: Vec<f64> = Vec::new();
    let mut terr_v: Vec<f64> = Vec::new();
    let mut pred_v: Vec<f64> = Vec::new();
    let mut ipd_v: Vec<f64> = Vec::new();
    let mut cov_v: Vec<u32> = Vec::new();
    let mut frac_v: Vec<Option<f64>> = Vec::new();
    let mut frac_low_v: Vec<Option<f64>> = Vec::new();
    let mut frac_up_v: Vec<Option<f64>> = Vec::new();

    for r in records {
        let f = &r.fields;
        tpl_v.push(r.position);
        strand_v.push(r.strand.flag());
        base_v.push(r.base.to_string());
        score_v.push(f.score);
        tmean_v.push(f.t_mean);
        terr_v.push(f.t_err);
        pred_v.push(f.model_prediction);
        ipd_v.push(f.ipd_ratio);
        cov_v.push(f.coverage);
        frac_v.push(f.fraction.map(|m| m.frac));
        frac_low_v.push(f.fraction.map(|m| m.frac_low));
        frac_up_v.push(f.fraction.map(|m| m.frac_up));
        ref_v.push(r.reference);
    }

    let mut df = df!(
        "refName"         => ref_v,
        "tpl"             => tpl_v,
        "strand"          => strand_v,
        "base"            => base_v,
        "score"           => score_v,
        "tMean"           => tmean_v,
        "tErr"            => terr_v,
        "modelPrediction" => pred_v,
        "ipdRatio"        => ipd_v,
        "coverage"        => cov_v,
    )?;
    if with_fractions {
        df.with_column(Series::new("frac", frac_v))?;
        df.with_column(Series::new("fracLow", frac_low_v))?;
        df.with_column(Series::new("fracUp", frac_up_v))?;
    }
    Ok(df)
}

/// Persist as Arrow IPC.
pub fn write_ipc<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> Result<()> {
    let p = path.as_ref();
    let mut f = File::create(p).with_context(|| format!("creating {}", p.display()))?;
    IpcWriter::new(&mut f).finish(df)?;
    Ok(())
}

pub fn read_ipc<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let p = path.as_ref();
    let f = File::open(p).with_context(|| format!("opening {}", p.display()))?;
    Ok(IpcReader::new(f).finish()?)
}

/// Reassemble the records of a frame, in row order.
pub fn records_from_frame(df: &DataFrame) -> Result<Vec<StrandRecord>> {
    let refs = df.column("refName")?.str()?;
    let tpl = df.column("tpl")?.u32()?;
    let strand = df.column("strand")?.u32()?;
    let base = df.column("base")?.str()?;
    let score = df.column("score")?.u32()?;
    let tmean = df.column("tMean")?.f64()?;
    let terr = df.column("tErr")?.f64()?;
    let pred = df.column("modelPrediction")?.f64()?;
    let ipd = df.column("ipdRatio")?.f64()?;
    let cov = df.column("coverage")?.u32()?;
    let fractions = match (df.column("frac"), df.column("fracLow"), df.column("fracUp")) {
        (Ok(a), Ok(b), Ok(c)) => Some((a.f64()?, b.f64()?, c.f64()?)),
        _ => None,
    };

    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let missing = |col: &str| anyhow::anyhow!("columnar row {i}: null {col}");
        let flag = strand.get(i).ok_or_else(|| missing("strand"))?;
        let b = base.get(i).ok_or_else(|| missing("base"))?;
        let fraction = fractions.and_then(|(a, l, u)| match (a.get(i), l.get(i), u.get(i)) {
            (Some(frac), Some(frac_low), Some(frac_up)) => Some(MethylFraction { frac, frac_low, frac_up }),
            _ => None,
        });
        out.push(StrandRecord {
            reference: refs.get(i).ok_or_else(|| missing("refName"))?.to_string(),
            position: tpl.get(i).ok_or_else(|| missing("tpl"))?,
            strand: Strand::from_flag(flag).with_context(|| format!("columnar row {i}: strand flag {flag}"))?,
            base: b.chars().next().and_then(Base::from_char).with_context(|| format!("columnar row {i}: base {b:?}"))?,
            fields: KineticFields {
                score: score.get(i).ok_or_else(|| missing("score"))?,
                t_mean: tmean.get(i).ok_or_else(|| missing("tMean"))?,
                t_err: terr.get(i).ok_or_else(|| missing("tErr"))?,
                model_prediction: pred.get(i).ok_or_else(|| missing("modelPrediction"))?,
                ipd_ratio: ipd.get(i).ok_or_else(|| missing("ipdRatio"))?,
                coverage: cov.get(i).ok_or_else(|| missing("coverage"))?,
                fraction,
            },
        });
    }
    Ok(out)
}
