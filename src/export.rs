//! CSV tables: validated cells, divisions, region measurements, and the
//! ground-truth division list.

use crate::edit::Measurement;
use crate::lineage::{CellTrace, CheckedDivision, DivisionEvent, TrackLabel};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io;

/// One row per cell per frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellRow {
    pub id: u32,
    pub frame: u32,
    pub mother: Option<u32>,
    pub daughter: Option<u32>,
    pub area: Option<f64>,
    pub fluo1: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    #[serde(rename = "IntDen")]
    pub int_den: Option<f64>,
    pub cid: String,
    pub did1: Option<String>,
    pub did2: Option<String>,
    pub track_label: TrackLabel,
    pub track_error: bool,
}

pub fn cell_rows(trace: &CellTrace) -> Vec<CellRow> {
    let cell = &trace.cell;
    (0..cell.frames.len())
        .map(|i| {
            let center = cell.center(i);
            let did = trace.dids[i];
            CellRow {
                id: cell.id,
                frame: cell.frames[i],
                mother: cell.mother,
                daughter: cell.daughters[i],
                area: cell.area.get(i).copied(),
                fluo1: cell.fluo1.get(i).copied(),
                x: center.map(|c| c[0]),
                y: center.map(|c| c[1]),
                int_den: cell.int_den(i),
                cid: trace.cids[i].to_string(),
                did1: did.map(|(a, _)| a.to_string()),
                did2: did.map(|(_, b)| b.to_string()),
                track_label: trace.track_labels[i],
                track_error: trace.track_errors[i],
            }
        })
        .collect()
}

/// Column layout shared by the ground-truth list and the derived table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct DivisionRow {
    timestep_parent: u32,
    track_id_parent: u32,
    track_id_child1: u32,
    track_id_child2: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correct: Option<bool>,
}

pub fn write_cells<W: io::Write>(w: W, traces: &[CellTrace]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    for trace in traces {
        for row in cell_rows(trace) {
            wtr.serialize(row)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_divisions<W: io::Write>(w: W, divisions: &[CheckedDivision]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    for d in divisions {
        wtr.serialize(DivisionRow {
            timestep_parent: d.event.parent_frame,
            track_id_parent: d.event.parent.0,
            track_id_child1: d.event.child1.0,
            track_id_child2: d.event.child2.0,
            correct: Some(d.correct),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_measurements<W: io::Write>(w: W, rows: &[Measurement]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a ground-truth `divisions.csv`. Columns are found by header name and
/// extra columns are ignored. Rows are kept exactly as written.
pub fn read_divisions<R: io::Read>(r: R) -> Result<Vec<DivisionEvent>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(r);
    let mut out = Vec::new();
    for result in rdr.deserialize() {
        let row: DivisionRow = result?;
        out.push(DivisionEvent {
            parent_frame: row.timestep_parent,
            parent: TrackLabel(row.track_id_parent),
            child1: TrackLabel(row.track_id_child1),
            child2: TrackLabel(row.track_id_child2),
        });
    }
    Ok(out)
}
