//! Emission driver: one stream realization per output, encoders in parallel.
//!
//! Each encoder builds its own [`RecordStream`] from the same windows and strand
//! order, so no cursor is shared. The source is only read, so no locking is needed.
//! Parallelism uses a local Rayon pool; `threads = None` uses all logical cores.
use std::path::PathBuf;

use anyhow::Result;
use rayon::ThreadPoolBuilder;

use crate::error::TrackError;
use crate::record::StrandOrder;
use crate::stream::{KineticSource, RecordStream, ReferenceWindow};
use crate::track::PackedTrack;
use crate::{columnar, tabular};

/// What to emit, and where.
#[derive(Clone, Debug, Default)]
pub struct EmitPlan {
    pub windows: Vec<ReferenceWindow>,
    pub order: StrandOrder,
    /// Add `frac`/`fracLow`/`fracUp` to the tabular and columnar outputs.
    pub with_fractions: bool,
    /// Skip coordinates whose ratios overflow the packed range instead of aborting.
    pub skip_overflow: bool,
    pub csv: Option<PathBuf>,
    pub columnar: Option<PathBuf>,
    pub track: Option<PathBuf>,
    pub threads: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmitSummary {
    /// Records in the stream, counted by whichever encoders ran.
    pub rows: usize,
    /// Coordinates written to the packed track.
    pub track_entries: usize,
    /// Coordinates left out of the packed track by the skip policy.
    pub skipped: Vec<TrackError>,
}

/// Write every output requested by `plan`.
pub fn run<S: KineticSource + ?Sized>(source: &S, plan: &EmitPlan) -> Result<EmitSummary> {
    let n = plan.threads.unwrap_or_else(num_cpus::get).max(1);
    let pool = ThreadPoolBuilder::new().num_threads(n).build()?;
    let stream = || RecordStream::new(source, plan.windows.clone(), plan.order);

    let (csv_rows, (col_rows, track)) = pool.install(|| {
        rayon::join(
            || -> Result<Option<usize>> {
                let Some(path) = &plan.csv else { return Ok(None) };
                let mut w = tabular::TabularWriter::create(path, plan.with_fractions)?;
                for r in stream() {
                    w.write(&r)?;
                }
                let rows = w.rows();
                w.finish()?;
                log::info!("wrote {} tabular rows to {}", rows, path.display());
                Ok(Some(rows))
            },
            || {
                rayon::join(
                    || -> Result<Option<usize>> {
                        let Some(path) = &plan.columnar else { return Ok(None) };
                        let mut df = columnar::build_frame(stream(), plan.with_fractions)?;
                        columnar::write_ipc(&mut df, path)?;
                        log::info!("wrote {} columnar rows to {}", df.height(), path.display());
                        Ok(Some(df.height()))
                    },
                    || -> Result<Option<(usize, usize, Vec<TrackError>)>> {
                        let Some(path) = &plan.track else { return Ok(None) };
                        let mut records = 0usize;
                        let counted = stream().inspect(|_| records += 1);
                        let (track, skipped) = if plan.skip_overflow {
                            PackedTrack::fold_lenient(counted)?
                        } else {
                            (PackedTrack::fold(counted)?, Vec::new())
                        };
                        track.write_bedgraph_file(path)?;
                        log::info!("wrote {} packed track values to {}", track.len(), path.display());
                        Ok(Some((records, track.len(), skipped)))
                    },
                )
            },
        )
    });

    let csv_rows = csv_rows?;
    let col_rows = col_rows?;
    let track = track?;

    if let (Some(a), Some(b)) = (csv_rows, col_rows) {
        if a != b {
            anyhow::bail!("tabular wrote {} rows but columnar wrote {}", a, b);
        }
    }
    let (track_rows, track_entries, skipped) = match track {
        Some((n, entries, skipped)) => (Some(n), entries, skipped),
        None => (None, 0, Vec::new()),
    };
    let rows = csv_rows.or(col_rows).or(track_rows).unwrap_or(0);
    Ok(EmitSummary { rows, track_entries, skipped })
}
