use crate::im::LabelIm;
use crate::mpoly::MPoly;
use crate::name::LineageName;
use crate::region::Region;

/// Label image from rows of digits, `0` is background.
pub fn label_im_from_ascii(grid: &str) -> LabelIm {
    let rows: Vec<&str> = grid
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let h = rows.len();
    assert!(h > 0, "grid must have at least one non-empty row");
    let w = rows[0].len();
    assert!(w > 0, "grid rows must be non-empty");
    for r in &rows {
        assert_eq!(r.len(), w, "all rows must have equal length");
    }

    let mut im = LabelIm::new(w, h);
    for (y, row) in rows.iter().enumerate() {
        for (x, ch) in row.chars().enumerate() {
            let v = ch
                .to_digit(10)
                .unwrap_or_else(|| panic!("invalid label char '{ch}', expected digit"));
            im.arr[y * im.s + x] = v;
        }
    }
    im
}

pub fn name(s: &str) -> LineageName {
    s.parse()
        .unwrap_or_else(|e| panic!("bad test name {s:?}: {e}"))
}

pub fn rect_region(n: &str, l: i64, t: i64, r: i64, b: i64) -> Region {
    Region::new(name(n), MPoly::rect(l, t, r, b))
}

pub fn names_of(regions: &[Region]) -> Vec<String> {
    regions.iter().map(|r| r.name.to_string()).collect()
}
