//! Cell lineage records, identity strings, and division validation.
//!
//! A cell record comes from the upstream segmentation/tracking pipeline. Its
//! `frames` are 0-based indices into the label-image stacks. Identity strings
//! are `<id>_<generation>`, where the generation counts the divisions seen so
//! far along the record.

use crate::im::LabelIm;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

macro_rules! transparent_newtype_copy {
    ($name:ident($inner:ty)) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);
    };
}

transparent_newtype_copy!(TrackLabel(u32));

impl TrackLabel {
    /// No single manual track label could be attributed.
    pub const UNRESOLVED: TrackLabel = TrackLabel(0);

    pub fn is_resolved(self) -> bool {
        self != Self::UNRESOLVED
    }
}

impl fmt::Display for TrackLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Cell records
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: u32,
    #[serde(default)]
    pub mother: Option<u32>,
    pub frames: Vec<u32>,
    /// Per frame; `Some(d)` where a division produced daughter `d`.
    pub daughters: Vec<Option<u32>>,
    #[serde(default)]
    pub area: Vec<f64>,
    #[serde(default)]
    pub fluo1: Vec<f64>,
    #[serde(default)]
    pub new_pole: Vec<[f64; 2]>,
    #[serde(default)]
    pub old_pole: Vec<[f64; 2]>,
}

impl CellRecord {
    /// Per-frame columns must line up with `frames`; optional ones may be empty.
    pub fn check(&self) -> Result<()> {
        let n = self.frames.len();
        let bad = |msg: String| Err(Error::InvalidRecord { id: self.id, msg });

        if self.daughters.len() != n {
            return bad(format!("{} daughters for {} frames", self.daughters.len(), n));
        }
        for (col, len) in [
            ("area", self.area.len()),
            ("fluo1", self.fluo1.len()),
            ("new_pole", self.new_pole.len()),
            ("old_pole", self.old_pole.len()),
        ] {
            if len != 0 && len != n {
                return bad(format!("{len} {col} values for {n} frames"));
            }
        }
        if self.frames.windows(2).any(|w| w[0] >= w[1]) {
            return bad("frames are not strictly increasing".to_string());
        }
        Ok(())
    }

    /// Midpoint of the two poles at record index `i`.
    pub fn center(&self, i: usize) -> Option<[f64; 2]> {
        let p1 = self.new_pole.get(i)?;
        let p2 = self.old_pole.get(i)?;
        Some([(p1[0] + p2[0]) / 2.0, (p1[1] + p2[1]) / 2.0])
    }

    /// Integrated density, area times mean fluorescence.
    pub fn int_den(&self, i: usize) -> Option<f64> {
        Some(self.area.get(i)? * self.fluo1.get(i)?)
    }
}

pub fn parse_cells_json(json_text: &str) -> Result<Vec<CellRecord>> {
    let cells: Vec<CellRecord> = serde_json::from_str(json_text)?;
    for cell in &cells {
        cell.check()?;
    }
    Ok(cells)
}

// Identity strings
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId {
    pub id: u32,
    pub generation: u32,
}

impl CellId {
    pub fn new(id: u32, generation: u32) -> Self {
        Self { id, generation }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.id, self.generation)
    }
}

/// Identity at every record index. A division at index `i` already counts at `i`.
pub fn cell_ids(cell: &CellRecord) -> Vec<CellId> {
    let mut generation = 0;
    cell.daughters
        .iter()
        .map(|d| {
            if d.is_some() {
                generation += 1;
            }
            CellId::new(cell.id, generation)
        })
        .collect()
}

/// Identities of the two cells the upcoming division will produce.
///
/// Index `i` carries the pair of the first division strictly after `i`:
/// the continuing cell `<id>_<generation + 1>` and the new one `<daughter>_0`.
/// Indices with no later division get `None`.
pub fn daughter_ids(cell: &CellRecord) -> Vec<Option<(CellId, CellId)>> {
    let mut out = vec![None; cell.daughters.len()];
    let mut generation = cell.daughters.iter().filter(|d| d.is_some()).count() as u32;
    let mut upcoming = None;
    for (i, d) in cell.daughters.iter().enumerate().rev() {
        out[i] = upcoming;
        if let Some(d) = *d {
            upcoming = Some((CellId::new(cell.id, generation), CellId::new(d, 0)));
            generation -= 1;
        }
    }
    out
}

// Ground truth
// -----------------------------------------------------------------------------

/// Manual track label under cell `cell_id` (drawn as `cell_id + 1` in `seg`).
///
/// Exactly one distinct non-zero label resolves; none or several give
/// `TrackLabel::UNRESOLVED`.
pub fn ground_truth_label(seg: &LabelIm, trk: &LabelIm, frame: u32, cell_id: u32) -> Result<TrackLabel> {
    if seg.dims() != trk.dims() {
        return Err(Error::ImageSizeMismatch {
            frame,
            a: seg.dims(),
            b: trk.dims(),
        });
    }
    let Some(seg_label) = cell_id.checked_add(1) else {
        debug!(frame, cell_id, "cell id has no segmentation label");
        return Ok(TrackLabel::UNRESOLVED);
    };
    let pixel_iz = seg.pixels_with_value(seg_label);
    match trk.distinct_nonzero_at(&pixel_iz).as_slice() {
        [label] => Ok(TrackLabel(*label)),
        labels => {
            debug!(frame, cell_id, n_labels = labels.len(), "ambiguous ground-truth label");
            Ok(TrackLabel::UNRESOLVED)
        }
    }
}

/// A cell record with everything derived from it for validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CellTrace {
    pub cell: CellRecord,
    pub cids: Vec<CellId>,
    pub dids: Vec<Option<(CellId, CellId)>>,
    pub track_labels: Vec<TrackLabel>,
    pub track_errors: Vec<bool>,
}

/// Resolved track label per frame and identity.
#[derive(Debug, Clone, Default)]
pub struct LabelLut {
    by_frame: HashMap<u32, HashMap<CellId, TrackLabel>>,
}

impl LabelLut {
    pub fn insert(&mut self, frame: u32, cid: CellId, label: TrackLabel) {
        self.by_frame.entry(frame).or_default().insert(cid, label);
    }

    pub fn get(&self, frame: u32, cid: CellId) -> Option<TrackLabel> {
        self.by_frame.get(&frame)?.get(&cid).copied()
    }

    /// Like `get`, but a missing entry reads as unresolved.
    pub fn get_or_unresolved(&self, frame: u32, cid: CellId) -> TrackLabel {
        self.get(frame, cid).unwrap_or_else(|| {
            warn!(frame, %cid, "no track label recorded");
            TrackLabel::UNRESOLVED
        })
    }
}

/// Flag every record index whose label drifted from the label seen when the
/// identity last changed.
pub fn track_errors(cids: &[CellId], labels: &[TrackLabel]) -> Vec<bool> {
    let (Some(&first_cid), Some(&first_label)) = (cids.first(), labels.first()) else {
        return Vec::new();
    };
    let (mut cid, mut reference) = (first_cid, first_label);
    cids.iter()
        .zip(labels)
        .map(|(&c, &label)| {
            if c != cid {
                cid = c;
                reference = label;
            }
            label != reference
        })
        .collect()
}

/// Attach identities and manual track labels to every cell.
///
/// `seg_stack[f]` and `trk_stack[f]` are the label images of frame `f`.
pub fn trace_cells(
    cells: &[CellRecord],
    seg_stack: &[LabelIm],
    trk_stack: &[LabelIm],
) -> Result<(Vec<CellTrace>, LabelLut)> {
    let mut lut = LabelLut::default();
    let mut traces = Vec::with_capacity(cells.len());

    for cell in cells {
        cell.check()?;
        let cids = cell_ids(cell);
        let dids = daughter_ids(cell);

        let mut track_labels = Vec::with_capacity(cell.frames.len());
        for (&frame, &cid) in cell.frames.iter().zip(&cids) {
            let seg = seg_stack.get(frame as usize).ok_or(Error::MissingImage {
                kind: "segmentation",
                frame,
            })?;
            let trk = trk_stack.get(frame as usize).ok_or(Error::MissingImage {
                kind: "tracking",
                frame,
            })?;
            let label = ground_truth_label(seg, trk, frame, cell.id)?;
            lut.insert(frame, cid, label);
            track_labels.push(label);
        }

        let track_errors = track_errors(&cids, &track_labels);
        traces.push(CellTrace {
            cell: cell.clone(),
            cids,
            dids,
            track_labels,
            track_errors,
        });
    }
    Ok((traces, lut))
}

// Divisions
// -----------------------------------------------------------------------------

/// `(parent_frame, parent, child1, child2)` in manual track labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DivisionEvent {
    pub parent_frame: u32,
    pub parent: TrackLabel,
    pub child1: TrackLabel,
    pub child2: TrackLabel,
}

impl DivisionEvent {
    /// Children are stored in ascending label order.
    pub fn new(parent_frame: u32, parent: TrackLabel, a: TrackLabel, b: TrackLabel) -> Self {
        Self {
            parent_frame,
            parent,
            child1: a.min(b),
            child2: a.max(b),
        }
    }
}

/// One event per division in the records, in record order.
pub fn derive_divisions(traces: &[CellTrace], lut: &LabelLut) -> Vec<DivisionEvent> {
    let mut events = Vec::new();
    for trace in traces {
        let cell = &trace.cell;
        for (i, d) in cell.daughters.iter().enumerate() {
            if d.is_none() {
                continue;
            }
            if i == 0 {
                warn!(id = cell.id, "division at the first record frame has no parent frame, skipping");
                continue;
            }
            let Some((continuing, daughter)) = trace.dids[i - 1] else {
                continue;
            };
            let frame = cell.frames[i];
            let parent_frame = frame.saturating_sub(1);
            events.push(DivisionEvent::new(
                parent_frame,
                lut.get_or_unresolved(parent_frame, trace.cids[i - 1]),
                lut.get_or_unresolved(frame, continuing),
                lut.get_or_unresolved(frame, daughter),
            ));
        }
    }
    events
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedDivision {
    pub event: DivisionEvent,
    pub correct: bool,
}

/// Exact-match each derived event against the ground-truth list.
pub fn check_divisions(derived: &[DivisionEvent], truth: &[DivisionEvent]) -> Vec<CheckedDivision> {
    let truth: HashSet<&DivisionEvent> = truth.iter().collect();
    derived
        .iter()
        .map(|&event| CheckedDivision {
            event,
            correct: truth.contains(&event),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::label_im_from_ascii;

    fn record(id: u32, frames: Vec<u32>, daughters: Vec<Option<u32>>) -> CellRecord {
        CellRecord {
            id,
            frames,
            daughters,
            ..Default::default()
        }
    }

    fn ids(v: &[CellId]) -> Vec<String> {
        v.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn generation_counts_divisions() {
        let cell = record(3, vec![0, 1, 2, 3], vec![None, None, Some(7), None]);
        assert_eq!(ids(&cell_ids(&cell)), vec!["3_0", "3_0", "3_1", "3_1"]);
    }

    #[test]
    fn daughter_ids_lead_up_to_each_division() {
        let cell = record(3, vec![0, 1, 2, 3], vec![None, None, Some(7), None]);
        let dids: Vec<Option<(String, String)>> = daughter_ids(&cell)
            .into_iter()
            .map(|d| d.map(|(a, b)| (a.to_string(), b.to_string())))
            .collect();
        let pair = Some(("3_1".to_string(), "7_0".to_string()));
        assert_eq!(dids, vec![pair.clone(), pair, None, None]);

        // With two divisions the earlier frame already announces the later pair.
        let cell = record(1, vec![0, 1, 2, 3, 4], vec![None, Some(4), None, Some(9), None]);
        let dids = daughter_ids(&cell);
        assert_eq!(dids[0], Some((CellId::new(1, 1), CellId::new(4, 0))));
        assert_eq!(dids[1], Some((CellId::new(1, 2), CellId::new(9, 0))));
        assert_eq!(dids[2], Some((CellId::new(1, 2), CellId::new(9, 0))));
        assert_eq!(dids[3], None);
    }

    #[test]
    fn ground_truth_label_resolves_single_label_only() {
        // Cell 0 is drawn as 1, cell 1 as 2.
        let seg = label_im_from_ascii(
            r#"
                1100220
                1100220
            "#,
        );
        let trk = label_im_from_ascii(
            r#"
                5500340
                5000340
            "#,
        );
        assert_eq!(ground_truth_label(&seg, &trk, 0, 0).unwrap(), TrackLabel(5));
        assert_eq!(ground_truth_label(&seg, &trk, 0, 1).unwrap(), TrackLabel::UNRESOLVED);
        // Not present at all.
        assert_eq!(ground_truth_label(&seg, &trk, 0, 8).unwrap(), TrackLabel::UNRESOLVED);
        assert_eq!(ground_truth_label(&seg, &trk, 0, u32::MAX).unwrap(), TrackLabel::UNRESOLVED);

        let small = label_im_from_ascii("11");
        assert!(matches!(
            ground_truth_label(&seg, &small, 4, 0),
            Err(Error::ImageSizeMismatch { frame: 4, .. })
        ));
    }

    #[test]
    fn track_error_compares_against_label_at_last_identity_change() {
        let cids = [CellId::new(1, 0), CellId::new(1, 0), CellId::new(1, 1), CellId::new(1, 1)];
        let labels = [TrackLabel(4), TrackLabel(6), TrackLabel(9), TrackLabel(9)];
        assert_eq!(track_errors(&cids, &labels), vec![false, true, false, false]);
        assert!(track_errors(&[], &[]).is_empty());
    }

    #[test]
    fn division_children_are_sorted() {
        let ev = DivisionEvent::new(5, TrackLabel(12), TrackLabel(8), TrackLabel(3));
        let truth = [DivisionEvent::new(5, TrackLabel(12), TrackLabel(3), TrackLabel(8))];
        assert!(ev.child1 <= ev.child2);
        let checked = check_divisions(&[ev], &truth);
        assert!(checked[0].correct);

        let other = DivisionEvent::new(6, TrackLabel(12), TrackLabel(3), TrackLabel(8));
        assert!(!check_divisions(&[other], &truth)[0].correct);
    }

    #[test]
    fn divisions_from_traced_cells() {
        // Frame 0: mother (cell 0) alone. Frame 1: it divided into cells 0 and 1.
        let seg = vec![
            label_im_from_ascii("1111000"),
            label_im_from_ascii("1100220"),
        ];
        let trk = vec![
            label_im_from_ascii("3333000"),
            label_im_from_ascii("8800550"),
        ];
        let cells = vec![
            record(0, vec![0, 1], vec![None, Some(1)]),
            CellRecord {
                mother: Some(0),
                ..record(1, vec![1], vec![None])
            },
        ];
        let (traces, lut) = trace_cells(&cells, &seg, &trk).unwrap();
        assert_eq!(traces[0].track_labels, vec![TrackLabel(3), TrackLabel(8)]);
        assert_eq!(traces[0].track_errors, vec![false, false]);
        assert_eq!(lut.get(1, CellId::new(1, 0)), Some(TrackLabel(5)));

        let events = derive_divisions(&traces, &lut);
        assert_eq!(
            events,
            vec![DivisionEvent {
                parent_frame: 0,
                parent: TrackLabel(3),
                child1: TrackLabel(5),
                child2: TrackLabel(8),
            }]
        );
    }

    #[test]
    fn division_at_first_record_frame_is_skipped() {
        let seg = vec![label_im_from_ascii("11")];
        let trk = vec![label_im_from_ascii("22")];
        let cells = vec![record(0, vec![0], vec![Some(4)])];
        let (traces, lut) = trace_cells(&cells, &seg, &trk).unwrap();
        assert!(derive_divisions(&traces, &lut).is_empty());
    }

    #[test]
    fn missing_stack_frame_is_an_error() {
        let seg = vec![label_im_from_ascii("11")];
        let cells = vec![record(0, vec![0, 1], vec![None, None])];
        let err = trace_cells(&cells, &seg, &seg).unwrap_err();
        assert!(matches!(err, Error::MissingImage { kind: "segmentation", frame: 1 }));
    }

    #[test]
    fn records_are_checked_on_parse() {
        let ok = r#"[{ "id": 2, "frames": [0, 1], "daughters": [null, 5],
                       "area": [10.0, 12.0], "fluo1": [2.0, 2.5],
                       "new_pole": [[0, 0], [1, 1]], "old_pole": [[4, 2], [5, 3]] }]"#;
        let cells = parse_cells_json(ok).unwrap();
        assert_eq!(cells[0].center(1), Some([3.0, 2.0]));
        assert_eq!(cells[0].int_den(1), Some(30.0));

        let bad = r#"[{ "id": 2, "frames": [0, 1], "daughters": [null] }]"#;
        assert!(matches!(
            parse_cells_json(bad),
            Err(Error::InvalidRecord { id: 2, .. })
        ));
    }
}
