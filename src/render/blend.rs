//! Premultiplied RGBA8 source-over blending on raw byte buffers.

use crate::foundation::math::mul_div255_u16;

pub type PremulRgba8 = [u8; 4];

pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        let dc = mul_div255_u16(u16::from(dst[i]), inv);
        out[i] = (u16::from(src[i]) + dc).min(255) as u8;
    }
    out
}

/// Blend a `width`-wide layer of `src_rows` rows onto `dst`, with the layer's first row placed
/// at `top` (which may be negative or run past the bottom; out-of-range rows are clipped).
pub fn over_rows(dst: &mut [u8], width: u32, height: u32, src: &[u8], top: i64) {
    let row_bytes = (width as usize) * 4;
    if row_bytes == 0 {
        return;
    }
    for (row, src_row) in src.chunks_exact(row_bytes).enumerate() {
        let y = top + row as i64;
        if y < 0 || y >= i64::from(height) {
            continue;
        }
        let start = (y as usize) * row_bytes;
        let Some(dst_row) = dst.get_mut(start..start + row_bytes) else {
            continue;
        };
        for (d, s) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
            d.copy_from_slice(&out);
        }
    }
}

/// `src` over `dst` for two equally sized layers, written into `dst`.
pub fn over_in_place(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_src_alpha_0_is_noop() {
        let dst = [10, 20, 30, 40];
        let src = [0, 0, 0, 0];
        assert_eq!(over(dst, src), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src), src);
    }

    #[test]
    fn half_black_over_white_is_mid_grey() {
        let out = over([255, 255, 255, 255], [0, 0, 0, 128]);
        assert_eq!(out, [127, 127, 127, 255]);
    }

    #[test]
    fn over_rows_clips_above_and_below() {
        let (w, h) = (1u32, 2u32);
        let mut dst = vec![0u8, 0, 0, 255, 0, 0, 0, 255];
        let src = vec![
            255, 0, 0, 255, // row -1: clipped
            0, 255, 0, 255, // row 0
            0, 0, 255, 255, // row 1
            9, 9, 9, 255, // row 2: clipped
        ];
        over_rows(&mut dst, w, h, &src, -1);
        assert_eq!(dst, vec![0, 255, 0, 255, 0, 0, 255, 255]);
    }
}
