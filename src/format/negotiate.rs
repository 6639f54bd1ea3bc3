//! Format negotiation between devices.

use tracing::debug;

use super::{ChannelLayout, SampleFormat, StreamFormat};
use crate::backend::DeviceInfo;
use crate::error::DuplexAudioError;

/// Sample formats in order of preference.
///
/// Floats first, then wider integers before narrower ones, native endian
/// before foreign endian at each width.
pub const FORMAT_PRIORITY: [SampleFormat; 18] = [
    SampleFormat::FLOAT32_NE,
    SampleFormat::FLOAT32_FE,
    SampleFormat::FLOAT64_NE,
    SampleFormat::FLOAT64_FE,
    SampleFormat::S32_NE,
    SampleFormat::S32_FE,
    SampleFormat::S24_NE,
    SampleFormat::S24_FE,
    SampleFormat::S16_NE,
    SampleFormat::S16_FE,
    SampleFormat::U32_NE,
    SampleFormat::U32_FE,
    SampleFormat::U24_NE,
    SampleFormat::U24_FE,
    SampleFormat::U16_NE,
    SampleFormat::U16_FE,
    SampleFormat::S8,
    SampleFormat::U8,
];

/// Sample rates tried before falling back to the devices' current rates.
pub const SAMPLE_RATE_PRIORITY: [u32; 4] = [48000, 44100, 96000, 24000];

/// Picks a [`StreamFormat`] both sides of a pipeline can run at.
///
/// The negotiator walks priority lists and takes the first candidate every
/// device accepts. It never falls back to conversion: if nothing matches,
/// negotiation fails.
///
/// # Example
///
/// ```
/// use duplex_audio::{
///     ChannelLayout, DeviceInfo, Direction, FormatNegotiator, SampleFormat, SampleRateRange,
/// };
///
/// let mic = DeviceInfo::new("mic", "Mic", Direction::Input)
///     .with_formats(vec![SampleFormat::S16_NE])
///     .with_sample_rates(vec![SampleRateRange::exact(44100), SampleRateRange::exact(48000)])
///     .with_layouts(vec![ChannelLayout::stereo()]);
/// let speakers = DeviceInfo::new("out", "Speakers", Direction::Output)
///     .with_formats(vec![SampleFormat::FLOAT32_NE, SampleFormat::S16_NE])
///     .with_sample_rates(vec![SampleRateRange::exact(48000), SampleRateRange::exact(96000)])
///     .with_layouts(vec![ChannelLayout::stereo(), ChannelLayout::mono()]);
///
/// let format = FormatNegotiator::new().negotiate(&mic, &speakers).unwrap();
/// assert_eq!(format.sample_rate, 48000);
/// assert_eq!(format.sample_format, SampleFormat::S16_NE);
/// assert_eq!(format.layout, ChannelLayout::stereo());
/// ```
#[derive(Debug, Clone)]
pub struct FormatNegotiator {
    formats: Vec<SampleFormat>,
    sample_rates: Vec<u32>,
}

impl Default for FormatNegotiator {
    fn default() -> Self {
        Self {
            formats: FORMAT_PRIORITY.to_vec(),
            sample_rates: SAMPLE_RATE_PRIORITY.to_vec(),
        }
    }
}

impl FormatNegotiator {
    /// Creates a negotiator with the default priority lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the sample format priority list.
    #[must_use]
    pub fn with_formats(mut self, formats: Vec<SampleFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Replaces the sample rate priority list.
    ///
    /// Devices' current rates are still tried after the list.
    #[must_use]
    pub fn with_sample_rates(mut self, rates: Vec<u32>) -> Self {
        self.sample_rates = rates;
        self
    }

    /// Picks the format for a capture device feeding a playback device.
    ///
    /// The layout is the first of the playback device's layouts (most
    /// channels first) that the capture device also has.
    ///
    /// # Errors
    ///
    /// `NoCompatibleChannelLayout`, `NoCompatibleSampleRate` or
    /// `NoCompatibleFormat`, checked in that order.
    pub fn negotiate(
        &self,
        input: &DeviceInfo,
        output: &DeviceInfo,
    ) -> Result<StreamFormat, DuplexAudioError> {
        let mut preferred = output.layouts().to_vec();
        ChannelLayout::sort_by_channel_count(&mut preferred);
        let layout = ChannelLayout::best_matching(&preferred, input.layouts())
            .cloned()
            .ok_or(DuplexAudioError::NoCompatibleChannelLayout)?;

        let devices = [input, output];
        let sample_rate = self.pick_sample_rate(&devices)?;
        let sample_format = self.pick_format(&devices)?;

        debug!(
            %sample_format,
            sample_rate,
            %layout,
            input = input.name(),
            output = output.name(),
            "Negotiated duplex format"
        );
        Ok(StreamFormat::new(sample_format, sample_rate, layout))
    }

    /// Picks a format for a single device.
    ///
    /// Uses the device's current layout, or its first layout.
    ///
    /// # Errors
    ///
    /// `NoCompatibleChannelLayout` if the device reports no layout, otherwise
    /// `NoCompatibleSampleRate` or `NoCompatibleFormat`.
    pub fn negotiate_single(&self, device: &DeviceInfo) -> Result<StreamFormat, DuplexAudioError> {
        let layout = device
            .current_layout()
            .or_else(|| device.layouts().first())
            .cloned()
            .ok_or(DuplexAudioError::NoCompatibleChannelLayout)?;
        let sample_rate = self.pick_sample_rate(&[device])?;
        let sample_format = self.pick_format(&[device])?;

        debug!(
            %sample_format,
            sample_rate,
            %layout,
            device = device.name(),
            "Negotiated single-device format"
        );
        Ok(StreamFormat::new(sample_format, sample_rate, layout))
    }

    /// Picks the first rate of the priority list every device supports,
    /// then the first current device rate every device supports.
    ///
    /// # Errors
    ///
    /// `NoCompatibleSampleRate` if no candidate is accepted by all devices.
    pub fn pick_sample_rate(&self, devices: &[&DeviceInfo]) -> Result<u32, DuplexAudioError> {
        let current = devices.iter().filter_map(|d| d.current_sample_rate());
        self.sample_rates
            .iter()
            .copied()
            .chain(current)
            .find(|&rate| devices.iter().all(|d| d.supports_sample_rate(rate)))
            .ok_or(DuplexAudioError::NoCompatibleSampleRate)
    }

    /// Picks the first format of the priority list every device supports.
    ///
    /// # Errors
    ///
    /// `NoCompatibleFormat` if no format is accepted by all devices.
    pub fn pick_format(&self, devices: &[&DeviceInfo]) -> Result<SampleFormat, DuplexAudioError> {
        self.formats
            .iter()
            .copied()
            .find(|&format| devices.iter().all(|d| d.supports_format(format)))
            .ok_or(DuplexAudioError::NoCompatibleFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Direction, SampleRateRange};

    fn device(direction: Direction, rates: &[u32]) -> DeviceInfo {
        DeviceInfo::new("dev", "dev", direction)
            .with_formats(vec![SampleFormat::S16_NE, SampleFormat::FLOAT32_NE])
            .with_sample_rates(rates.iter().map(|&r| SampleRateRange::exact(r)).collect())
            .with_layouts(vec![ChannelLayout::mono(), ChannelLayout::stereo()])
    }

    #[test]
    fn test_picks_common_rate() {
        let a = device(Direction::Input, &[44100, 48000]);
        let b = device(Direction::Output, &[48000, 96000]);
        let format = FormatNegotiator::new().negotiate(&a, &b).unwrap();
        assert_eq!(format.sample_rate, 48000);
    }

    #[test]
    fn test_no_common_rate() {
        let a = device(Direction::Input, &[44100]);
        let b = device(Direction::Output, &[96000]);
        let err = FormatNegotiator::new().negotiate(&a, &b).unwrap_err();
        assert!(matches!(err, DuplexAudioError::NoCompatibleSampleRate));
    }

    #[test]
    fn test_rate_priority_order() {
        let a = device(Direction::Input, &[96000, 44100]);
        let b = device(Direction::Output, &[96000, 44100]);
        let format = FormatNegotiator::new().negotiate(&a, &b).unwrap();
        assert_eq!(format.sample_rate, 44100);
    }

    #[test]
    fn test_falls_back_to_current_rate() {
        let a = device(Direction::Input, &[22050]).with_current_sample_rate(22050);
        let b = DeviceInfo::new("out", "out", Direction::Output)
            .with_formats(vec![SampleFormat::S16_NE])
            .with_sample_rates(vec![SampleRateRange {
                min: 8000,
                max: 32000,
            }])
            .with_layouts(vec![ChannelLayout::stereo()]);
        let format = FormatNegotiator::new().negotiate(&a, &b).unwrap();
        assert_eq!(format.sample_rate, 22050);
        assert_eq!(format.sample_format, SampleFormat::S16_NE);
    }

    #[test]
    fn test_float32_preferred() {
        let a = device(Direction::Input, &[48000]);
        let b = device(Direction::Output, &[48000]);
        let format = FormatNegotiator::new().negotiate(&a, &b).unwrap();
        assert_eq!(format.sample_format, SampleFormat::FLOAT32_NE);
    }

    #[test]
    fn test_float64_before_integers() {
        let both = vec![SampleFormat::S32_NE, SampleFormat::FLOAT64_NE];
        let a = device(Direction::Input, &[48000]).with_formats(both.clone());
        let b = device(Direction::Output, &[48000]).with_formats(both);
        let format = FormatNegotiator::new().negotiate(&a, &b).unwrap();
        assert_eq!(format.sample_format, SampleFormat::FLOAT64_NE);
    }

    #[test]
    fn test_no_common_format() {
        let a = device(Direction::Input, &[48000]).with_formats(vec![SampleFormat::U8]);
        let b = device(Direction::Output, &[48000]).with_formats(vec![SampleFormat::S8]);
        let err = FormatNegotiator::new().negotiate(&a, &b).unwrap_err();
        assert!(matches!(err, DuplexAudioError::NoCompatibleFormat));
    }

    #[test]
    fn test_layout_prefers_most_channels_of_output() {
        let five_one = ChannelLayout::default_for(6).unwrap();
        let a = device(Direction::Input, &[48000]).with_layouts(vec![
            ChannelLayout::mono(),
            ChannelLayout::stereo(),
            five_one.clone(),
        ]);
        let b = device(Direction::Output, &[48000]).with_layouts(vec![
            ChannelLayout::stereo(),
            five_one.clone(),
        ]);
        let format = FormatNegotiator::new().negotiate(&a, &b).unwrap();
        assert_eq!(format.layout, five_one);
    }

    #[test]
    fn test_no_common_layout_checked_first() {
        let a = device(Direction::Input, &[44100]).with_layouts(vec![ChannelLayout::mono()]);
        let b = device(Direction::Output, &[96000]).with_layouts(vec![ChannelLayout::stereo()]);
        let err = FormatNegotiator::new().negotiate(&a, &b).unwrap_err();
        assert!(matches!(err, DuplexAudioError::NoCompatibleChannelLayout));
    }

    #[test]
    fn test_negotiate_single_uses_current_layout() {
        let dev = device(Direction::Output, &[44100]).with_current_layout(ChannelLayout::stereo());
        let format = FormatNegotiator::new().negotiate_single(&dev).unwrap();
        assert_eq!(format.layout, ChannelLayout::stereo());
        assert_eq!(format.sample_rate, 44100);

        let dev = device(Direction::Output, &[44100]);
        let format = FormatNegotiator::new().negotiate_single(&dev).unwrap();
        assert_eq!(format.layout, ChannelLayout::mono());
    }

    #[test]
    fn test_custom_format_priority() {
        let a = device(Direction::Input, &[48000]);
        let negotiator = FormatNegotiator::new().with_formats(vec![SampleFormat::S16_NE]);
        let format = negotiator.negotiate_single(&a).unwrap();
        assert_eq!(format.sample_format, SampleFormat::S16_NE);
    }
}
