pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn mul_div255_u8(x: u8, y: u8) -> u8 {
    mul_div255_u16(u16::from(x), u16::from(y)) as u8
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3];
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = mul_div255_u8(px[0], a);
        px[1] = mul_div255_u8(px[1], a);
        px[2] = mul_div255_u8(px[2], a);
    }
}

/// Convert a unit-interval float to an 8-bit channel value.
pub(crate) fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div255_rounds() {
        assert_eq!(mul_div255_u16(255, 255), 255);
        assert_eq!(mul_div255_u16(128, 255), 128);
        assert_eq!(mul_div255_u16(0, 200), 0);
        assert_eq!(mul_div255_u8(100, 128), 50);
    }

    #[test]
    fn premultiply_clears_transparent_pixels() {
        let mut px = vec![200, 100, 50, 0, 255, 255, 255, 255];
        premultiply_rgba8_in_place(&mut px);
        assert_eq!(px, vec![0, 0, 0, 0, 255, 255, 255, 255]);
    }

    #[test]
    fn unit_to_u8_clamps() {
        assert_eq!(unit_to_u8(-1.0), 0);
        assert_eq!(unit_to_u8(0.8), 204);
        assert_eq!(unit_to_u8(2.0), 255);
    }
}
