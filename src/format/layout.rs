//! Channel roles and channel layouts.

use std::fmt;
use std::str::FromStr;

/// The role of one channel in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// Front left.
    FrontLeft,
    /// Front right.
    FrontRight,
    /// Front center.
    FrontCenter,
    /// Low frequency effects.
    Lfe,
    /// Back left.
    BackLeft,
    /// Back right.
    BackRight,
    /// Front left of center.
    FrontLeftCenter,
    /// Front right of center.
    FrontRightCenter,
    /// Back center.
    BackCenter,
    /// Side left.
    SideLeft,
    /// Side right.
    SideRight,
    /// Top center.
    TopCenter,
    /// Top front left.
    TopFrontLeft,
    /// Top front center.
    TopFrontCenter,
    /// Top front right.
    TopFrontRight,
    /// Top back left.
    TopBackLeft,
    /// Top back center.
    TopBackCenter,
    /// Top back right.
    TopBackRight,
    /// An unnamed auxiliary channel.
    Aux(u16),
}

const NAMED: [(ChannelId, &str, &[&str]); 18] = [
    (ChannelId::FrontLeft, "Front Left", &["fl", "left", "front-left"]),
    (ChannelId::FrontRight, "Front Right", &["fr", "right", "front-right"]),
    (ChannelId::FrontCenter, "Front Center", &["fc", "center", "front-center"]),
    (ChannelId::Lfe, "LFE", &["lfe", "low frequency"]),
    (ChannelId::BackLeft, "Back Left", &["bl", "rear left", "back-left"]),
    (ChannelId::BackRight, "Back Right", &["br", "rear right", "back-right"]),
    (ChannelId::FrontLeftCenter, "Front Left Center", &["flc", "front-left-of-center"]),
    (ChannelId::FrontRightCenter, "Front Right Center", &["frc", "front-right-of-center"]),
    (ChannelId::BackCenter, "Back Center", &["bc", "rear center", "back-center"]),
    (ChannelId::SideLeft, "Side Left", &["sl", "side-left"]),
    (ChannelId::SideRight, "Side Right", &["sr", "side-right"]),
    (ChannelId::TopCenter, "Top Center", &["tc", "top-center"]),
    (ChannelId::TopFrontLeft, "Top Front Left", &["tfl", "top-front-left"]),
    (ChannelId::TopFrontCenter, "Top Front Center", &["tfc", "top-front-center"]),
    (ChannelId::TopFrontRight, "Top Front Right", &["tfr", "top-front-right"]),
    (ChannelId::TopBackLeft, "Top Back Left", &["tbl", "top-back-left"]),
    (ChannelId::TopBackCenter, "Top Back Center", &["tbc", "top-back-center"]),
    (ChannelId::TopBackRight, "Top Back Right", &["tbr", "top-back-right"]),
];

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Self::Aux(n) = self {
            return write!(f, "Aux {n}");
        }
        let name = NAMED
            .iter()
            .find(|(id, _, _)| id == self)
            .map_or("Unknown", |(_, name, _)| *name);
        f.write_str(name)
    }
}

/// Error returned when a channel name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel name: {0}")]
pub struct ParseChannelIdError(String);

impl FromStr for ChannelId {
    type Err = ParseChannelIdError;

    /// Parses a display name (`"Front Left"`) or an alias (`"fl"`, `"left"`),
    /// ignoring case. `"Aux N"` parses to [`ChannelId::Aux`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        for (id, name, aliases) in NAMED {
            if name.eq_ignore_ascii_case(&needle) || aliases.contains(&needle.as_str()) {
                return Ok(id);
            }
        }
        needle
            .strip_prefix("aux")
            .and_then(|n| n.trim().parse().ok())
            .map(ChannelId::Aux)
            .ok_or_else(|| ParseChannelIdError(s.to_string()))
    }
}

/// An ordered list of channel roles, optionally named.
///
/// Two layouts are equal when their channels are equal, regardless of name.
#[derive(Debug, Clone)]
pub struct ChannelLayout {
    name: Option<String>,
    channels: Vec<ChannelId>,
}

use ChannelId::{
    BackCenter as BC, BackLeft as BL, BackRight as BR, FrontCenter as FC, FrontLeft as FL,
    FrontRight as FR, Lfe as LFE, SideLeft as SL, SideRight as SR,
};

const BUILTIN: [(&str, &[ChannelId]); 18] = [
    ("Mono", &[FC]),
    ("Stereo", &[FL, FR]),
    ("2.1", &[FL, FR, LFE]),
    ("3.0", &[FL, FR, FC]),
    ("3.0 (back)", &[FL, FR, BC]),
    ("3.1", &[FL, FR, FC, LFE]),
    ("4.0", &[FL, FR, FC, BC]),
    ("Quad", &[FL, FR, BL, BR]),
    ("Quad (side)", &[FL, FR, SL, SR]),
    ("4.1", &[FL, FR, FC, LFE, BC]),
    ("5.0 (back)", &[FL, FR, FC, BL, BR]),
    ("5.0 (side)", &[FL, FR, FC, SL, SR]),
    ("5.1", &[FL, FR, FC, SL, SR, LFE]),
    ("5.1 (back)", &[FL, FR, FC, BL, BR, LFE]),
    ("6.0 (side)", &[FL, FR, FC, SL, SR, BC]),
    ("6.1", &[FL, FR, FC, SL, SR, BC, LFE]),
    ("7.0", &[FL, FR, FC, SL, SR, BL, BR]),
    ("7.1", &[FL, FR, FC, SL, SR, BL, BR, LFE]),
];

impl ChannelLayout {
    /// Creates an unnamed layout from a channel list.
    ///
    /// If the channels match a built-in layout, that layout's name is used.
    pub fn new(channels: Vec<ChannelId>) -> Self {
        let name = BUILTIN
            .iter()
            .find(|(_, builtin)| *builtin == channels.as_slice())
            .map(|(name, _)| (*name).to_string());
        Self { name, channels }
    }

    /// Creates a layout with an explicit name.
    pub fn named(name: impl Into<String>, channels: Vec<ChannelId>) -> Self {
        Self {
            name: Some(name.into()),
            channels,
        }
    }

    /// Single front-center channel.
    pub fn mono() -> Self {
        Self::new(vec![FC])
    }

    /// Front left and front right.
    pub fn stereo() -> Self {
        Self::new(vec![FL, FR])
    }

    /// Every built-in layout.
    pub fn builtin() -> Vec<Self> {
        BUILTIN
            .iter()
            .map(|(name, channels)| Self::named(*name, channels.to_vec()))
            .collect()
    }

    /// The conventional layout for a channel count, if one exists (1 to 8).
    pub fn default_for(channel_count: usize) -> Option<Self> {
        let name = match channel_count {
            1 => "Mono",
            2 => "Stereo",
            3 => "3.0",
            4 => "4.0",
            5 => "5.0 (back)",
            6 => "5.1 (back)",
            7 => "6.1",
            8 => "7.1",
            _ => return None,
        };
        BUILTIN
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(name, channels)| Self::named(*name, channels.to_vec()))
    }

    /// A layout of `channel_count` unnamed auxiliary channels.
    pub fn aux(channel_count: usize) -> Self {
        let channels = (0..channel_count)
            .map(|n| ChannelId::Aux(u16::try_from(n).unwrap_or(u16::MAX)))
            .collect();
        Self {
            name: None,
            channels,
        }
    }

    /// The layout's name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Channel roles in buffer order.
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Index of `channel` in this layout.
    pub fn find_channel(&self, channel: ChannelId) -> Option<usize> {
        self.channels.iter().position(|&c| c == channel)
    }

    /// Name of the built-in layout with the same channels, if any.
    pub fn builtin_name(&self) -> Option<&'static str> {
        BUILTIN
            .iter()
            .find(|(_, channels)| *channels == self.channels.as_slice())
            .map(|(name, _)| *name)
    }

    /// Returns the first layout in `preferred` that also appears in `available`.
    pub fn best_matching<'a>(
        preferred: &'a [ChannelLayout],
        available: &[ChannelLayout],
    ) -> Option<&'a ChannelLayout> {
        preferred
            .iter()
            .find(|layout| available.iter().any(|other| other == *layout))
    }

    /// Sorts layouts so that those with more channels come first.
    ///
    /// The sort is stable, so layouts with equal channel counts keep their
    /// relative order.
    pub fn sort_by_channel_count(layouts: &mut [ChannelLayout]) {
        layouts.sort_by(|a, b| b.channel_count().cmp(&a.channel_count()));
    }
}

impl PartialEq for ChannelLayout {
    fn eq(&self, other: &Self) -> bool {
        self.channels == other.channels
    }
}

impl Eq for ChannelLayout {}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return f.write_str(name);
        }
        for (i, channel) in self.channels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{channel}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_layouts_are_named() {
        for layout in ChannelLayout::builtin() {
            assert!(layout.channel_count() > 0);
            assert_eq!(layout.builtin_name(), layout.name());
        }
    }

    #[test]
    fn test_default_for_counts() {
        assert!(ChannelLayout::default_for(0).is_none());
        for count in 1..=8 {
            let layout = ChannelLayout::default_for(count).unwrap();
            assert_eq!(layout.channel_count(), count);
            assert!(layout.builtin_name().is_some());
        }
        assert!(ChannelLayout::default_for(9).is_none());
    }

    #[test]
    fn test_equality_ignores_name() {
        let named = ChannelLayout::named("My Stereo", vec![FL, FR]);
        assert_eq!(named, ChannelLayout::stereo());
        assert_ne!(ChannelLayout::mono(), ChannelLayout::stereo());
    }

    #[test]
    fn test_new_detects_builtin_name() {
        let layout = ChannelLayout::new(vec![FL, FR, LFE]);
        assert_eq!(layout.name(), Some("2.1"));
        let odd = ChannelLayout::new(vec![LFE, FL]);
        assert_eq!(odd.name(), None);
        assert_eq!(odd.to_string(), "LFE, Front Left");
    }

    #[test]
    fn test_find_channel() {
        let layout = ChannelLayout::default_for(6).unwrap();
        assert_eq!(layout.find_channel(LFE), Some(5));
        assert_eq!(layout.find_channel(SL), None);
    }

    #[test]
    fn test_best_matching_follows_preferred_order() {
        let preferred = vec![
            ChannelLayout::default_for(6).unwrap(),
            ChannelLayout::stereo(),
            ChannelLayout::mono(),
        ];
        let available = vec![ChannelLayout::mono(), ChannelLayout::stereo()];
        let best = ChannelLayout::best_matching(&preferred, &available).unwrap();
        assert_eq!(best, &ChannelLayout::stereo());

        let none = vec![ChannelLayout::aux(3)];
        assert!(ChannelLayout::best_matching(&preferred, &none).is_none());
    }

    #[test]
    fn test_sort_by_channel_count() {
        let mut layouts = vec![
            ChannelLayout::mono(),
            ChannelLayout::default_for(8).unwrap(),
            ChannelLayout::stereo(),
        ];
        ChannelLayout::sort_by_channel_count(&mut layouts);
        let counts: Vec<_> = layouts.iter().map(ChannelLayout::channel_count).collect();
        assert_eq!(counts, vec![8, 2, 1]);
    }

    #[test]
    fn test_parse_channel_id() {
        assert_eq!("Front Left".parse::<ChannelId>(), Ok(FL));
        assert_eq!("fr".parse::<ChannelId>(), Ok(FR));
        assert_eq!("LFE".parse::<ChannelId>(), Ok(LFE));
        assert_eq!("aux 3".parse::<ChannelId>(), Ok(ChannelId::Aux(3)));
        assert!("nowhere".parse::<ChannelId>().is_err());
    }
}
