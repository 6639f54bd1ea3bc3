//! Sample encodings.

use std::fmt;

/// How one sample of one channel is encoded in memory.
///
/// 24-bit formats occupy the low three bytes of a 4-byte word, so
/// [`bytes_per_sample`](Self::bytes_per_sample) is 4 for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 8 bit.
    S8,
    /// Unsigned 8 bit.
    U8,
    /// Signed 16 bit little endian.
    S16Le,
    /// Signed 16 bit big endian.
    S16Be,
    /// Unsigned 16 bit little endian.
    U16Le,
    /// Unsigned 16 bit big endian.
    U16Be,
    /// Signed 24 bit little endian, in a 32 bit word.
    S24Le,
    /// Signed 24 bit big endian, in a 32 bit word.
    S24Be,
    /// Unsigned 24 bit little endian, in a 32 bit word.
    U24Le,
    /// Unsigned 24 bit big endian, in a 32 bit word.
    U24Be,
    /// Signed 32 bit little endian.
    S32Le,
    /// Signed 32 bit big endian.
    S32Be,
    /// Unsigned 32 bit little endian.
    U32Le,
    /// Unsigned 32 bit big endian.
    U32Be,
    /// IEEE 754 single precision little endian, nominal range -1.0 to 1.0.
    Float32Le,
    /// IEEE 754 single precision big endian, nominal range -1.0 to 1.0.
    Float32Be,
    /// IEEE 754 double precision little endian, nominal range -1.0 to 1.0.
    Float64Le,
    /// IEEE 754 double precision big endian, nominal range -1.0 to 1.0.
    Float64Be,
}

macro_rules! endian_aliases {
    ($($ne:ident, $fe:ident => $le:ident, $be:ident;)*) => {
        impl SampleFormat {
            $(
                #[doc = concat!("`", stringify!($le), "` or `", stringify!($be), "`, whichever is native.")]
                #[cfg(target_endian = "little")]
                pub const $ne: Self = Self::$le;
                #[doc = concat!("`", stringify!($le), "` or `", stringify!($be), "`, whichever is native.")]
                #[cfg(target_endian = "big")]
                pub const $ne: Self = Self::$be;
                #[doc = concat!("`", stringify!($le), "` or `", stringify!($be), "`, whichever is foreign.")]
                #[cfg(target_endian = "little")]
                pub const $fe: Self = Self::$be;
                #[doc = concat!("`", stringify!($le), "` or `", stringify!($be), "`, whichever is foreign.")]
                #[cfg(target_endian = "big")]
                pub const $fe: Self = Self::$le;
            )*
        }
    };
}

endian_aliases! {
    S16_NE, S16_FE => S16Le, S16Be;
    U16_NE, U16_FE => U16Le, U16Be;
    S24_NE, S24_FE => S24Le, S24Be;
    U24_NE, U24_FE => U24Le, U24Be;
    S32_NE, S32_FE => S32Le, S32Be;
    U32_NE, U32_FE => U32Le, U32Be;
    FLOAT32_NE, FLOAT32_FE => Float32Le, Float32Be;
    FLOAT64_NE, FLOAT64_FE => Float64Le, Float64Be;
}

impl SampleFormat {
    /// Every format, in declaration order.
    pub const ALL: [Self; 18] = [
        Self::S8,
        Self::U8,
        Self::S16Le,
        Self::S16Be,
        Self::U16Le,
        Self::U16Be,
        Self::S24Le,
        Self::S24Be,
        Self::U24Le,
        Self::U24Be,
        Self::S32Le,
        Self::S32Be,
        Self::U32Le,
        Self::U32Be,
        Self::Float32Le,
        Self::Float32Be,
        Self::Float64Le,
        Self::Float64Be,
    ];

    /// Bytes one sample occupies in a buffer.
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S8 | Self::U8 => 1,
            Self::S16Le | Self::S16Be | Self::U16Le | Self::U16Be => 2,
            Self::S24Le
            | Self::S24Be
            | Self::U24Le
            | Self::U24Be
            | Self::S32Le
            | Self::S32Be
            | Self::U32Le
            | Self::U32Be
            | Self::Float32Le
            | Self::Float32Be => 4,
            Self::Float64Le | Self::Float64Be => 8,
        }
    }

    /// Significant bits per sample.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::S8 | Self::U8 => 8,
            Self::S16Le | Self::S16Be | Self::U16Le | Self::U16Be => 16,
            Self::S24Le | Self::S24Be | Self::U24Le | Self::U24Be => 24,
            Self::Float64Le | Self::Float64Be => 64,
            _ => 32,
        }
    }

    /// Whether samples are IEEE floats.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Self::Float32Le | Self::Float32Be | Self::Float64Le | Self::Float64Be
        )
    }

    /// Whether samples are signed. Floats count as signed.
    #[must_use]
    pub fn is_signed(self) -> bool {
        !matches!(
            self,
            Self::U8
                | Self::U16Le
                | Self::U16Be
                | Self::U24Le
                | Self::U24Be
                | Self::U32Le
                | Self::U32Be
        )
    }

    /// Whether multi-byte samples are stored little endian.
    ///
    /// Single-byte formats report `true`.
    #[must_use]
    pub fn is_little_endian(self) -> bool {
        !matches!(
            self,
            Self::S16Be
                | Self::U16Be
                | Self::S24Be
                | Self::U24Be
                | Self::S32Be
                | Self::U32Be
                | Self::Float32Be
                | Self::Float64Be
        )
    }

    /// Whether the format uses the host's byte order.
    #[must_use]
    pub fn is_native_endian(self) -> bool {
        self.bytes_per_sample() == 1 || self.is_little_endian() == cfg!(target_endian = "little")
    }

    /// Short lowercase name, e.g. `s16le` or `float32be`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::S8 => "s8",
            Self::U8 => "u8",
            Self::S16Le => "s16le",
            Self::S16Be => "s16be",
            Self::U16Le => "u16le",
            Self::U16Be => "u16be",
            Self::S24Le => "s24le",
            Self::S24Be => "s24be",
            Self::U24Le => "u24le",
            Self::U24Be => "u24be",
            Self::S32Le => "s32le",
            Self::S32Be => "s32be",
            Self::U32Le => "u32le",
            Self::U32Be => "u32be",
            Self::Float32Le => "float32le",
            Self::Float32Be => "float32be",
            Self::Float64Le => "float64le",
            Self::Float64Be => "float64be",
        }
    }

    /// Encodes a normalized sample into `out`.
    ///
    /// `value` is clamped to -1.0..=1.0. Integer formats scale it to their
    /// full range; unsigned formats are offset so that 0.0 maps to the
    /// midpoint. Only the first [`bytes_per_sample`](Self::bytes_per_sample)
    /// bytes of `out` are written; a shorter `out` is left untouched.
    pub fn write_sample(self, value: f64, out: &mut [u8]) {
        let size = self.bytes_per_sample();
        let Some(out) = out.get_mut(..size) else {
            return;
        };
        let value = value.clamp(-1.0, 1.0);
        let le = self.is_little_endian();

        match self {
            Self::Float32Le | Self::Float32Be => {
                let v = value as f32;
                out.copy_from_slice(&if le { v.to_le_bytes() } else { v.to_be_bytes() });
            }
            Self::Float64Le | Self::Float64Be => {
                out.copy_from_slice(&if le {
                    value.to_le_bytes()
                } else {
                    value.to_be_bytes()
                });
            }
            _ => {
                let bits = self.bits();
                let max = ((1_i64 << (bits - 1)) - 1) as f64;
                let mut int = (value * max).round() as i64;
                if !self.is_signed() {
                    int += 1_i64 << (bits - 1);
                }
                // Truncating the two's complement value to `size` bytes also
                // sign-extends 24-bit samples into their 32-bit word.
                if le {
                    out.copy_from_slice(&int.to_le_bytes()[..size]);
                } else {
                    out.copy_from_slice(&int.to_be_bytes()[8 - size..]);
                }
            }
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(SampleFormat::S8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16Le.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::S24Be.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::U32Le.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::Float64Be.bytes_per_sample(), 8);
    }

    #[test]
    fn test_native_and_foreign_aliases() {
        assert!(SampleFormat::S16_NE.is_native_endian());
        assert!(!SampleFormat::S16_FE.is_native_endian());
        assert!(SampleFormat::FLOAT32_NE.is_float());
        assert_ne!(SampleFormat::FLOAT64_NE, SampleFormat::FLOAT64_FE);
        assert!(SampleFormat::U8.is_native_endian());
    }

    #[test]
    fn test_signedness() {
        assert!(SampleFormat::S24Le.is_signed());
        assert!(SampleFormat::Float32Be.is_signed());
        assert!(!SampleFormat::U16Be.is_signed());
    }

    #[test]
    fn test_write_sample_s16() {
        let mut buf = [0u8; 2];
        SampleFormat::S16Le.write_sample(1.0, &mut buf);
        assert_eq!(i16::from_le_bytes(buf), i16::MAX);
        SampleFormat::S16Be.write_sample(-1.0, &mut buf);
        assert_eq!(i16::from_be_bytes(buf), -i16::MAX);
    }

    #[test]
    fn test_write_sample_unsigned_midpoint() {
        let mut buf = [0u8; 1];
        SampleFormat::U8.write_sample(0.0, &mut buf);
        assert_eq!(buf[0], 128);

        let mut buf = [0u8; 2];
        SampleFormat::U16Le.write_sample(1.0, &mut buf);
        assert_eq!(u16::from_le_bytes(buf), u16::MAX);
    }

    #[test]
    fn test_write_sample_s24_sign_extends() {
        let mut buf = [0u8; 4];
        SampleFormat::S24Le.write_sample(-1.0, &mut buf);
        assert_eq!(i32::from_le_bytes(buf), -((1 << 23) - 1));

        SampleFormat::S24Be.write_sample(1.0, &mut buf);
        assert_eq!(i32::from_be_bytes(buf), (1 << 23) - 1);
    }

    #[test]
    fn test_write_sample_float_clamps() {
        let mut buf = [0u8; 4];
        SampleFormat::Float32Le.write_sample(2.5, &mut buf);
        assert_eq!(f32::from_le_bytes(buf), 1.0);

        let mut buf = [0u8; 8];
        SampleFormat::Float64Be.write_sample(-0.25, &mut buf);
        assert_eq!(f64::from_be_bytes(buf), -0.25);
    }

    #[test]
    fn test_write_sample_short_buffer_is_ignored() {
        let mut buf = [7u8; 2];
        SampleFormat::S32Le.write_sample(0.5, &mut buf);
        assert_eq!(buf, [7, 7]);
    }
}
