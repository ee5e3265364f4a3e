//! Signed 17.14 fixed-point numbers.
//!
//! A value is a 32-bit word read as 1 sign bit, 17 integer bits and 14
//! fraction bits, so the range is about +/-131072 with a precision of 2^-14.
//! The scheduler uses it for `recent_cpu` and `load_avg` without touching
//! floating-point hardware.
//!
//! Overflow is not checked anywhere: out-of-range results wrap.

use core::fmt;
use core::ops::{Add, Div, Mul, Sub};

use crate::kassert;

pub const FRACTION_BITS: u32 = 14;
pub const INTEGER_BITS: u32 = 32 - FRACTION_BITS - 1;

const ONE: i32 = 1 << FRACTION_BITS;
const HALF: i32 = ONE / 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(ONE);

    /// `numerator / denominator`, computed as `(numerator << 14) / denominator`.
    pub fn new(numerator: i32, denominator: i32) -> Fixed {
        kassert!(denominator != 0, "fixed-point value with zero denominator");
        Fixed((numerator << FRACTION_BITS).wrapping_div(denominator))
    }

    pub const fn from_int(n: i32) -> Fixed {
        Fixed(n << FRACTION_BITS)
    }

    pub const fn from_raw(raw: i32) -> Fixed {
        Fixed(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Drops the fraction with an arithmetic shift. Negative values move
    /// toward negative infinity: -1.5 becomes -2.
    pub const fn to_int_truncate(self) -> i32 {
        self.0 >> FRACTION_BITS
    }

    /// Nearest integer, halves away from zero.
    pub const fn to_int_round(self) -> i32 {
        if self.is_negative() {
            self.0.wrapping_sub(HALF) / ONE
        } else {
            self.0.wrapping_add(HALF) >> FRACTION_BITS
        }
    }

    pub const fn add(self, other: Fixed) -> Fixed {
        Fixed(self.0.wrapping_add(other.0))
    }

    pub const fn add_int(self, n: i32) -> Fixed {
        Fixed(self.0.wrapping_add(n << FRACTION_BITS))
    }

    pub const fn sub(self, other: Fixed) -> Fixed {
        Fixed(self.0.wrapping_sub(other.0))
    }

    pub const fn sub_int(self, n: i32) -> Fixed {
        Fixed(self.0.wrapping_sub(n << FRACTION_BITS))
    }

    pub const fn mul(self, other: Fixed) -> Fixed {
        Fixed(((self.0 as i64 * other.0 as i64) >> FRACTION_BITS) as i32)
    }

    pub const fn mul_int(self, n: i32) -> Fixed {
        Fixed(self.0.wrapping_mul(n))
    }

    pub fn div(self, other: Fixed) -> Fixed {
        kassert!(other.0 != 0, "fixed-point division by zero");
        Fixed((((self.0 as i64) << FRACTION_BITS) / other.0 as i64) as i32)
    }

    pub fn div_int(self, n: i32) -> Fixed {
        kassert!(n != 0, "fixed-point division by zero");
        Fixed(self.0.wrapping_div(n))
    }
}

impl Add for Fixed {
    type Output = Fixed;

    fn add(self, rhs: Fixed) -> Fixed {
        Fixed::add(self, rhs)
    }
}

impl Sub for Fixed {
    type Output = Fixed;

    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed::sub(self, rhs)
    }
}

impl Mul for Fixed {
    type Output = Fixed;

    fn mul(self, rhs: Fixed) -> Fixed {
        Fixed::mul(self, rhs)
    }
}

impl Div for Fixed {
    type Output = Fixed;

    fn div(self, rhs: Fixed) -> Fixed {
        Fixed::div(self, rhs)
    }
}

impl Add<i32> for Fixed {
    type Output = Fixed;

    fn add(self, rhs: i32) -> Fixed {
        self.add_int(rhs)
    }
}

impl Sub<i32> for Fixed {
    type Output = Fixed;

    fn sub(self, rhs: i32) -> Fixed {
        self.sub_int(rhs)
    }
}

impl Mul<i32> for Fixed {
    type Output = Fixed;

    fn mul(self, rhs: i32) -> Fixed {
        self.mul_int(rhs)
    }
}

impl Div<i32> for Fixed {
    type Output = Fixed;

    fn div(self, rhs: i32) -> Fixed {
        self.div_int(rhs)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hundredths = self.mul_int(100).to_int_round();
        let sign = if hundredths < 0 { "-" } else { "" };
        let abs = hundredths.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
