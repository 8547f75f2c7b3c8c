//! RSA security strength estimate
//!
//! Maps a modulus size to the NIST security strength in bits. Standard
//! sizes come from SP 800-56B rev 2 Appendix D and FIPS 140-2 IG 7.5; every
//! other size is computed with the IG 7.5 formula
//!
//! ```text
//! E = (1.923 * cbrt(n * ln 2) * ln(n * ln 2)^(2/3) - 4.69) / ln 2
//! ```
//!
//! in fixed point, then rounded to a multiple of eight. The result is
//! non-decreasing in the modulus size.

/// Fixed point scale. A power of two whose exponent is a multiple of three
const SCALE: u64 = 1 << 18;
/// Cube root of [`SCALE`]
const CBRT_SCALE: u64 = 1 << (2 * 18 / 3);

/// `SCALE * ln(2)`
const LOG_2: u64 = 0x02c5c8;
/// `SCALE * log2(e)`
const LOG_E: u64 = 0x05c551;
/// `SCALE * 1.923`
const C1_923: u64 = 0x07b126;
/// `SCALE * 4.690`
const C4_690: u64 = 0x12c28f;

/// Smallest modulus size whose exact strength is 1200 bits
const MAX_STRENGTH_THRESHOLD: u32 = 687_737;

fn mul2(a: u64, b: u64) -> u64 {
    a * b / SCALE
}

/// Cube root of a scaled integer using the shifting nth root algorithm
fn icbrt64(mut x: u64) -> u64 {
    let mut r: u64 = 0;
    let mut s: i32 = 63;
    while s >= 0 {
        r <<= 1;
        let b = 3 * r * (r + 1) + 1;
        if (x >> s) >= b {
            x -= b << s;
            r += 1;
        }
        s -= 3;
    }
    r * CBRT_SCALE
}

/// Natural logarithm of a scaled integer greater than one
fn ilog_e(mut v: u64) -> u64 {
    let mut r: u64 = 0;

    // range reduction into [1, 2)
    while v >= 2 * SCALE {
        v >>= 1;
        r += SCALE;
    }
    let mut i = SCALE / 2;
    while i != 0 {
        v = mul2(v, v);
        if v >= 2 * SCALE {
            v >>= 1;
            r += i;
        }
        i /= 2;
    }
    r * SCALE / LOG_E
}

/// Estimate the security strength in bits of an RSA modulus of `modulus_bits` bits
pub fn estimate_security_bits(modulus_bits: u32) -> u32 {
    match modulus_bits {
        2048 => return 112,
        3072 => return 128,
        4096 => return 152,
        6144 => return 176,
        7680 => return 192,
        8192 => return 200,
        15360 => return 256,
        _ => {}
    }

    if modulus_bits >= MAX_STRENGTH_THRESHOLD {
        return 1200;
    }
    if modulus_bits < 8 {
        return 0;
    }

    // caps keep the formula from overshooting the fast path above
    let cap: u16 = if modulus_bits <= 7680 {
        192
    } else if modulus_bits <= 15360 {
        256
    } else {
        1200
    };

    let x = u64::from(modulus_bits) * LOG_2;
    let lx = ilog_e(x);
    let scaled = mul2(C1_923, icbrt64(mul2(mul2(x, lx), lx))).saturating_sub(C4_690);
    let y = (scaled / LOG_2) as u16;
    let y = y.wrapping_add(4) & !7;
    u32::from(y.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_sizes() {
        for (bits, expected) in [
            (2048, 112),
            (3072, 128),
            (4096, 152),
            (6144, 176),
            (7680, 192),
            (8192, 200),
            (15360, 256),
        ] {
            assert_eq!(estimate_security_bits(bits), expected, "{bits} bits");
        }
    }

    #[test]
    fn test_computed_sizes() {
        for (bits, expected) in [
            (256, 40),
            (512, 56),
            (1024, 80),
            (2468, 120),
            (7679, 192),
            (7681, 200),
            (8888, 208),
            (13456, 248),
            (15359, 256),
            (15361, 264),
            (16384, 272),
            (687_736, 1192),
        ] {
            assert_eq!(estimate_security_bits(bits), expected, "{bits} bits");
        }
    }

    #[test]
    fn test_small_and_huge() {
        for bits in 0..8 {
            assert_eq!(estimate_security_bits(bits), 0);
        }
        assert_eq!(estimate_security_bits(15), 0);
        assert_eq!(estimate_security_bits(16), 8);
        assert_eq!(estimate_security_bits(687_737), 1200);
        assert_eq!(estimate_security_bits(u32::MAX), 1200);
    }

    #[test]
    fn test_monotonic() {
        let mut previous = 0;
        for bits in 0..=700_000 {
            let current = estimate_security_bits(bits);
            assert!(
                current >= previous,
                "estimate dropped from {previous} to {current} at {bits} bits"
            );
            previous = current;
        }
    }

    #[test]
    fn test_fixed_point_helpers() {
        assert_eq!(icbrt64(27 * SCALE), 3 * SCALE);
        assert_eq!(icbrt64(0), 0);
        // ln(e^1) within one scaled unit
        let one = ilog_e(2 * SCALE * 1359 / 1000);
        assert!(one.abs_diff(SCALE) < SCALE / 100, "{one}");
    }
}
