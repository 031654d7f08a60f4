//! Rational media time
//!
//! Presentation timestamps and track ranges are kept as `value / timescale`
//! so frame `i` at `fps` frames per second is exactly `i / fps` seconds.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

/// A point (or span) on a media timeline, expressed as `value / timescale` seconds
#[derive(Debug, Clone, Copy)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: i32,
}

impl MediaTime {
    /// Time zero, the start of every composition and encoding session
    pub const fn zero() -> Self {
        Self { value: 0, timescale: 1 }
    }

    /// Create a time value; a non-positive timescale is clamped to 1
    pub fn new(value: i64, timescale: i32) -> Self {
        Self {
            value,
            timescale: timescale.max(1),
        }
    }

    /// Presentation time of frame `index` at a fixed frame rate
    pub fn from_frame(index: i64, fps: u32) -> Self {
        Self::new(index, fps.min(i32::MAX as u32) as i32)
    }

    /// Convert floating-point seconds, rounding to the nearest tick of `timescale`
    pub fn from_seconds(seconds: f64, timescale: i32) -> Self {
        let timescale = timescale.max(1);
        Self {
            value: (seconds * timescale as f64).round() as i64,
            timescale,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Render as a decimal seconds string accepted by ffmpeg's `-t` / `-ss`
    pub fn to_ffmpeg_arg(&self) -> String {
        format!("{:.6}", self.as_secs_f64())
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.value as i128 * other.timescale as i128;
        let rhs = other.value as i128 * self.timescale as i128;
        lhs.cmp(&rhs)
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    /// Exact sum over the least common multiple of both timescales
    ///
    /// When that timescale or the summed value does not fit, the result is
    /// rounded to the nearest tick of the finer of the two timescales.
    fn add(self, rhs: MediaTime) -> MediaTime {
        let (a, b) = (self.timescale as i128, rhs.timescale as i128);
        let timescale = a / gcd(a, b) * b;
        let value = self.value as i128 * (timescale / a) + rhs.value as i128 * (timescale / b);

        match (i32::try_from(timescale), i64::try_from(value)) {
            (Ok(timescale), Ok(value)) => MediaTime::new(value, timescale),
            _ => {
                let target = a.max(b);
                let scaled = div_round(value * target, timescale);
                MediaTime::new(
                    scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
                    target as i32,
                )
            }
        }
    }
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs().max(1)
}

/// `num / den` rounded half away from zero; `den` is positive
fn div_round(num: i128, den: i128) -> i128 {
    if num >= 0 {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:.3}s)", self.value, self.timescale, self.as_secs_f64())
    }
}

/// A span of media time starting at `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: MediaTime,
    pub duration: MediaTime,
}

impl TimeRange {
    pub fn new(start: MediaTime, duration: MediaTime) -> Self {
        Self { start, duration }
    }

    /// Range starting at zero with the given duration
    pub fn from_zero(duration: MediaTime) -> Self {
        Self {
            start: MediaTime::zero(),
            duration,
        }
    }

    pub fn end(&self) -> MediaTime {
        self.start + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timestamps_are_exact() {
        let pts: Vec<MediaTime> = (0..4).map(|i| MediaTime::from_frame(i, 1)).collect();
        assert_eq!(pts[0], MediaTime::zero());
        assert_eq!(pts[3].as_secs_f64(), 3.0);
        assert!(pts.windows(2).all(|w| w[0] < w[1]));

        // 30 fps frame 15 is exactly half a second
        assert_eq!(MediaTime::from_frame(15, 30), MediaTime::new(1, 2));
    }

    #[test]
    fn test_ordering_across_timescales() {
        assert!(MediaTime::new(1, 3) < MediaTime::new(1, 2));
        assert_eq!(MediaTime::new(2, 4), MediaTime::new(1, 2));
        assert!(MediaTime::new(-1, 10) < MediaTime::zero());
    }

    #[test]
    fn test_add_and_range_end() {
        let sum = MediaTime::new(1, 2) + MediaTime::new(1, 3);
        assert_eq!(sum, MediaTime::new(5, 6));

        let range = TimeRange::new(MediaTime::new(1, 1), MediaTime::new(5, 1));
        assert_eq!(range.end(), MediaTime::new(6, 1));
        assert_eq!(TimeRange::from_zero(MediaTime::new(3, 1)).start, MediaTime::zero());
    }

    #[test]
    fn test_add_mixed_stream_time_bases() {
        // a video tick at 1/90000 plus an audio tick at 1/44100
        let sum = MediaTime::new(1, 90_000) + MediaTime::new(1, 44_100);
        assert_eq!(sum, MediaTime::new(149, 4_410_000));
        assert_eq!(sum.timescale, 4_410_000);
        assert!((sum.as_secs_f64() - 3.3787e-5).abs() < 1e-9);

        let range = TimeRange::new(MediaTime::new(45_000, 90_000), MediaTime::new(44_100 * 3, 44_100));
        assert_eq!(range.end(), MediaTime::new(7, 2));
    }

    #[test]
    fn test_add_without_common_timescale_rounds() {
        // coprime timescales whose product exceeds i32
        let a = MediaTime::new(1, 2_147_483_647);
        let b = MediaTime::new(1_000_000, 1_000_000);
        let sum = a + b;
        assert_eq!(sum.timescale, 2_147_483_647);
        assert!((sum.as_secs_f64() - 1.0).abs() < 1e-9);
        assert!(sum > b);

        // huge values never overflow
        let big = MediaTime::new(i64::MAX / 2, 3) + MediaTime::new(i64::MAX / 2, 7);
        assert!(big.as_secs_f64() > 0.0);
    }

    #[test]
    fn test_from_seconds_rounds_to_timescale() {
        let t = MediaTime::from_seconds(2.0004, 1000);
        assert_eq!(t.value, 2000);
        assert_eq!(t.to_ffmpeg_arg(), "2.000000");
    }
}
