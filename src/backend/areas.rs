//! Channel areas: where each channel's samples live inside a frame batch.

use crate::error::{BackendError, BackendErrorKind};

/// Location of one channel inside a batch buffer.
///
/// Sample `n` of the channel starts at `offset + n * step` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelArea {
    /// Byte offset of the channel's first sample.
    pub offset: usize,
    /// Bytes between consecutive samples of the channel.
    pub step: usize,
}

impl ChannelArea {
    /// Areas for interleaved frames: channel `ch` at `ch * bytes_per_sample`,
    /// stepping by one frame.
    pub fn interleaved(channel_count: usize, bytes_per_sample: usize) -> Vec<Self> {
        let step = channel_count * bytes_per_sample;
        (0..channel_count)
            .map(|ch| Self {
                offset: ch * bytes_per_sample,
                step,
            })
            .collect()
    }

    /// Areas for planar buffers: channel `ch` occupies its own block of
    /// `frame_capacity` contiguous samples.
    pub fn planar(channel_count: usize, bytes_per_sample: usize, frame_capacity: usize) -> Vec<Self> {
        (0..channel_count)
            .map(|ch| Self {
                offset: ch * frame_capacity * bytes_per_sample,
                step: bytes_per_sample,
            })
            .collect()
    }
}

fn validate(
    len: usize,
    areas: &[ChannelArea],
    frame_count: usize,
    bytes_per_sample: usize,
) -> Result<(), BackendError> {
    if frame_count == 0 {
        return Ok(());
    }
    for (ch, area) in areas.iter().enumerate() {
        let end = (frame_count - 1)
            .checked_mul(area.step)
            .and_then(|last| last.checked_add(area.offset))
            .and_then(|last| last.checked_add(bytes_per_sample));
        match end {
            Some(end) if end <= len => {}
            _ => {
                return Err(BackendError::new(
                    BackendErrorKind::Invalid,
                    format!(
                        "channel {ch} area (offset {}, step {}) exceeds {len}-byte buffer for {frame_count} frames",
                        area.offset, area.step
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Captured frames of one read transaction.
///
/// Bounds are checked once at construction, so [`sample`](Self::sample) never
/// panics for in-range channel and frame indices.
#[derive(Debug)]
pub struct ReadAreas<'a> {
    data: &'a [u8],
    areas: &'a [ChannelArea],
    frame_count: usize,
    bytes_per_sample: usize,
}

impl<'a> ReadAreas<'a> {
    /// Wraps a batch buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BackendErrorKind::Invalid`] if any channel's last sample
    /// would fall outside `data`.
    pub fn new(
        data: &'a [u8],
        areas: &'a [ChannelArea],
        frame_count: usize,
        bytes_per_sample: usize,
    ) -> Result<Self, BackendError> {
        validate(data.len(), areas, frame_count, bytes_per_sample)?;
        Ok(Self {
            data,
            areas,
            frame_count,
            bytes_per_sample,
        })
    }

    /// Frames in the batch.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Channels in the batch.
    pub fn channel_count(&self) -> usize {
        self.areas.len()
    }

    /// Bytes of sample `frame` of channel `channel`.
    ///
    /// Returns an empty slice for out-of-range indices.
    pub fn sample(&self, channel: usize, frame: usize) -> &[u8] {
        match self.areas.get(channel) {
            Some(area) if frame < self.frame_count => {
                let start = area.offset + frame * area.step;
                &self.data[start..start + self.bytes_per_sample]
            }
            _ => &[],
        }
    }
}

/// Destination frames of one write transaction.
#[derive(Debug)]
pub struct WriteAreas<'a> {
    data: &'a mut [u8],
    areas: &'a [ChannelArea],
    frame_count: usize,
    bytes_per_sample: usize,
}

impl<'a> WriteAreas<'a> {
    /// Wraps a batch buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BackendErrorKind::Invalid`] if any channel's last sample
    /// would fall outside `data`.
    pub fn new(
        data: &'a mut [u8],
        areas: &'a [ChannelArea],
        frame_count: usize,
        bytes_per_sample: usize,
    ) -> Result<Self, BackendError> {
        validate(data.len(), areas, frame_count, bytes_per_sample)?;
        Ok(Self {
            data,
            areas,
            frame_count,
            bytes_per_sample,
        })
    }

    /// Frames in the batch.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Channels in the batch.
    pub fn channel_count(&self) -> usize {
        self.areas.len()
    }

    /// Mutable bytes of sample `frame` of channel `channel`.
    ///
    /// Returns an empty slice for out-of-range indices.
    pub fn sample_mut(&mut self, channel: usize, frame: usize) -> &mut [u8] {
        match self.areas.get(channel) {
            Some(area) if frame < self.frame_count => {
                let start = area.offset + frame * area.step;
                &mut self.data[start..start + self.bytes_per_sample]
            }
            _ => &mut [],
        }
    }

    /// Writes zero bytes into every sample of the batch.
    pub fn fill_silence(&mut self) {
        for channel in 0..self.channel_count() {
            for frame in 0..self.frame_count {
                self.sample_mut(channel, frame).fill(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_areas() {
        let areas = ChannelArea::interleaved(2, 2);
        assert_eq!(areas[0], ChannelArea { offset: 0, step: 4 });
        assert_eq!(areas[1], ChannelArea { offset: 2, step: 4 });
    }

    #[test]
    fn test_planar_areas() {
        let areas = ChannelArea::planar(2, 2, 10);
        assert_eq!(areas[1], ChannelArea { offset: 20, step: 2 });
    }

    #[test]
    fn test_read_areas_sample_access() {
        // Two frames of stereo 16-bit: L0 R0 L1 R1
        let data = [1, 1, 2, 2, 3, 3, 4, 4];
        let layout = ChannelArea::interleaved(2, 2);
        let areas = ReadAreas::new(&data, &layout, 2, 2).unwrap();
        assert_eq!(areas.sample(0, 0), &[1, 1]);
        assert_eq!(areas.sample(1, 0), &[2, 2]);
        assert_eq!(areas.sample(0, 1), &[3, 3]);
        assert_eq!(areas.sample(1, 1), &[4, 4]);
        assert!(areas.sample(2, 0).is_empty());
        assert!(areas.sample(0, 2).is_empty());
    }

    #[test]
    fn test_read_areas_rejects_short_buffer() {
        let data = [0u8; 7];
        let layout = ChannelArea::interleaved(2, 2);
        let err = ReadAreas::new(&data, &layout, 2, 2).unwrap_err();
        assert_eq!(err.kind(), BackendErrorKind::Invalid);
    }

    #[test]
    fn test_zero_frames_always_valid() {
        let layout = ChannelArea::interleaved(2, 2);
        assert!(ReadAreas::new(&[], &layout, 0, 2).is_ok());
    }

    #[test]
    fn test_write_areas_planar() {
        let mut data = [0u8; 8];
        let layout = ChannelArea::planar(2, 2, 2);
        {
            let mut areas = WriteAreas::new(&mut data, &layout, 2, 2).unwrap();
            areas.sample_mut(1, 0).copy_from_slice(&[9, 9]);
            areas.sample_mut(0, 1).copy_from_slice(&[5, 5]);
        }
        assert_eq!(data, [0, 0, 5, 5, 9, 9, 0, 0]);
    }

    #[test]
    fn test_fill_silence() {
        let mut data = [0xAAu8; 8];
        let layout = ChannelArea::interleaved(2, 2);
        let mut areas = WriteAreas::new(&mut data, &layout, 2, 2).unwrap();
        areas.fill_silence();
        drop(areas);
        assert_eq!(data, [0; 8]);
    }
}
