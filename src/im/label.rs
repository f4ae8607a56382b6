use super::core::{Im, LabelIm};
use super::roi::ROI;

/// Flood-fill a connected component in a single-channel image.
///
/// Returns the pixel count, the sorted row-major pixel indices and the bounding box.
fn flood_im<SrcT>(
    src_im: &Im<SrcT, 1>,
    dst_im: &mut LabelIm,
    start_x: usize,
    start_y: usize,
    fill_val: u32,
) -> (usize, Vec<usize>, ROI)
where
    SrcT: Copy + PartialEq,
{
    assert_eq!(src_im.w, dst_im.w, "src/dst width mismatch");
    assert_eq!(src_im.h, dst_im.h, "src/dst height mismatch");

    let w = src_im.w;
    let h = src_im.h;
    assert!(start_x < w && start_y < h, "start coords out of bounds");

    // Deliberately safe indexing here: if our bounds assumptions are wrong,
    // we want a clear panic rather than UB.
    let group_val = src_im.arr[start_y * src_im.s + start_x];

    let mut visited: Vec<u8> = vec![0; w * h];
    let mut stack: Vec<(usize, usize)> = Vec::with_capacity(w * h / 10 + 1024);
    stack.push((start_x, start_y));

    let mut filled = 0usize;
    let mut pixel_iz: Vec<usize> = Vec::new();
    let mut roi = ROI {
        l: start_x as i64,
        t: start_y as i64,
        r: start_x as i64 + 1,
        b: start_y as i64 + 1,
    };
    while let Some((x, y)) = stack.pop() {
        let v_i = y * w + x;
        if visited[v_i] != 0 {
            continue;
        }
        visited[v_i] = 1;

        let px = unsafe { *src_im.get_unchecked(x, y, 0) };
        if px != group_val {
            continue;
        }

        unsafe {
            *dst_im.get_unchecked_mut(x, y, 0) = fill_val;
        }
        filled += 1;

        pixel_iz.push(y * dst_im.s + x);
        roi.union(ROI {
            l: x as i64,
            t: y as i64,
            r: x as i64 + 1,
            b: y as i64 + 1,
        });

        if y + 1 < h && visited[(y + 1) * w + x] == 0 {
            stack.push((x, y + 1));
        }
        if x + 1 < w && visited[y * w + x + 1] == 0 {
            stack.push((x + 1, y));
        }
        if y > 0 && visited[(y - 1) * w + x] == 0 {
            stack.push((x, y - 1));
        }
        if x > 0 && visited[y * w + x - 1] == 0 {
            stack.push((x - 1, y));
        }
    }

    pixel_iz.sort_unstable();

    (filled, pixel_iz, roi)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub size: usize,
    pub start_x: usize,
    pub start_y: usize,
    pub roi: ROI,
    /// Row-major indices into the labeled image (stride == width).
    pub pixel_iz: Vec<usize>,
}

impl LabelInfo {
    /// Pixel coordinates of the component, row-major order.
    pub fn pixels(&self, w: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pixel_iz.iter().map(move |&i| (i % w, i / w))
    }
}

/// Label a single channel image's 4-connected components of equal value.
///
/// Background is `SrcT::default()`. Components are numbered from 1 in row-major
/// scan order of their first pixel; `infos[0]` is a reserved placeholder.
pub fn label_im<SrcT>(src_im: &Im<SrcT, 1>) -> (LabelIm, Vec<LabelInfo>)
where
    SrcT: Copy + Default + PartialEq,
{
    let w = src_im.w;
    let h = src_im.h;

    let mut dst_im = LabelIm::new(w, h);
    let src_bg = SrcT::default();

    // group_info is indexed by group id (and [0] is reserved, do not use it!).
    let mut group_info: Vec<LabelInfo> = vec![LabelInfo::default()];

    let mut group_i: u32 = 1;
    for y in 0..h {
        for x in 0..w {
            if src_im.arr[y * src_im.s + x] == src_bg {
                continue;
            }
            if dst_im.arr[y * dst_im.s + x] != 0 {
                // Already labeled
                continue;
            }

            let (filled, pixel_iz, roi) = flood_im(src_im, &mut dst_im, x, y, group_i);

            debug_assert_eq!(group_info.len(), group_i as usize);
            group_info.push(LabelInfo {
                size: filled,
                start_x: x,
                start_y: y,
                roi,
                pixel_iz,
            });

            group_i += 1;
        }
    }

    (dst_im, group_info)
}

// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::label_im_from_ascii;

    #[test]
    fn flood_im_fills_connected_component() {
        let src = label_im_from_ascii(
            r#"
                77000
                77000
                00000
                00000
                00007
            "#,
        );
        let mut dst = LabelIm::new(src.w, src.h);

        let (filled, pixel_iz, roi) = flood_im(&src, &mut dst, 0, 0, 1234);
        assert_eq!(filled, 4);
        assert_eq!(pixel_iz, vec![0, 1, 5, 6]);
        assert_eq!(roi, ROI { l: 0, t: 0, r: 2, b: 2 });

        assert_eq!(dst.arr[6], 1234);
        // Not connected, should remain 0
        assert_eq!(dst.arr[24], 0);
        // Background should remain 0
        assert_eq!(dst.arr[12], 0);
    }

    #[test]
    fn label_im_finds_two_groups_and_returns_info() {
        // Group 1: value 9, a horizontal run at y=0, x=4..5
        // Group 2: value 7, a 2x2 block at (1,1)..(2,2)
        let src = label_im_from_ascii(
            r#"
                000099
                077000
                077000
                000000
            "#,
        );

        let (dst, groups) = label_im(&src);

        // [0] is reserved.
        assert_eq!(groups.len(), 3);

        // Scan order is row-major (y then x), so the first group starts at (4,0).
        assert_eq!(groups[1].size, 2);
        assert_eq!((groups[1].start_x, groups[1].start_y), (4, 0));
        assert_eq!(groups[1].roi, ROI { l: 4, t: 0, r: 6, b: 1 });

        assert_eq!(groups[2].size, 4);
        assert_eq!(groups[2].roi, ROI { l: 1, t: 1, r: 3, b: 3 });
        let px: Vec<(usize, usize)> = groups[2].pixels(src.w).collect();
        assert_eq!(px, vec![(1, 1), (2, 1), (1, 2), (2, 2)]);

        assert_eq!(dst.arr[4], 1);
        assert_eq!(dst.arr[5], 1);
        assert_eq!(dst.arr[7], 2);
        assert_eq!(dst.arr[0], 0);
    }

    #[test]
    fn touching_labels_stay_separate() {
        let src = label_im_from_ascii(
            r#"
                1122
                1122
            "#,
        );
        let (_, groups) = label_im(&src);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].size, 4);
        assert_eq!(groups[2].size, 4);
    }
}
