#![allow(dead_code)]

#[derive(Debug, Clone, PartialEq)]
pub struct Im<T, const N_CH: usize> {
    pub w: usize,
    pub h: usize,
    pub s: usize, // stride in elements (w * N_CH)
    pub arr: Vec<T>,
}

// Constructor
// -----------------------------------------------------------------------------
impl<T: Copy + Default, const N_CH: usize> Im<T, N_CH> {
    pub fn new(w: usize, h: usize) -> Self {
        let s = w * N_CH;
        let arr = vec![T::default(); s * h];
        Self { w, h, s, arr }
    }
}

impl<T, const N_CH: usize> Im<T, N_CH> {
    /// Wrap an already packed buffer. Returns `None` if `arr` is not `w * h * N_CH` long.
    pub fn from_vec(w: usize, h: usize, arr: Vec<T>) -> Option<Self> {
        let s = w * N_CH;
        if arr.len() != s * h {
            return None;
        }
        Some(Self { w, h, s, arr })
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.w, self.h)
    }

    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize, ch: usize) -> &T {
        unsafe { self.arr.get_unchecked(y * self.s + x * N_CH + ch) }
    }

    #[inline(always)]
    pub unsafe fn get_unchecked_mut(&mut self, x: usize, y: usize, ch: usize) -> &mut T {
        unsafe { self.arr.get_unchecked_mut(y * self.s + x * N_CH + ch) }
    }

    pub fn get(&self, x: usize, y: usize, ch: usize) -> Option<&T> {
        if x >= self.w || y >= self.h || ch >= N_CH {
            return None;
        }
        self.arr.get(y * self.s + x * N_CH + ch)
    }
}

// Label helpers
// -----------------------------------------------------------------------------

impl Im<u32, 1> {
    /// Distinct non-zero values found at the given pixel indices, in ascending order.
    pub fn distinct_nonzero_at(&self, pixel_iz: &[usize]) -> Vec<u32> {
        let mut vals: Vec<u32> = pixel_iz
            .iter()
            .filter_map(|&i| self.arr.get(i).copied())
            .filter(|&v| v != 0)
            .collect();
        vals.sort_unstable();
        vals.dedup();
        vals
    }

    /// Pixel indices (row-major) holding exactly `label`.
    pub fn pixels_with_value(&self, label: u32) -> Vec<usize> {
        let mut out = Vec::new();
        for y in 0..self.h {
            let row = y * self.s;
            for x in 0..self.w {
                if self.arr[row + x] == label {
                    out.push(row + x);
                }
            }
        }
        out
    }
}

pub type LabelIm = Im<u32, 1>;
