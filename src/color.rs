/// Tab group colors
///
/// Chrome only accepts a fixed set of group colors. Rules may carry any CSS hex
/// color picked in the options page, so hex values are snapped to the nearest
/// Chrome color before they reach the store.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    Grey,
    #[default]
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

/// Colors handed out to AI groups that come back without one, by position
pub const AI_PALETTE: [GroupColor; 9] = [
    GroupColor::Blue,
    GroupColor::Red,
    GroupColor::Green,
    GroupColor::Yellow,
    GroupColor::Purple,
    GroupColor::Cyan,
    GroupColor::Orange,
    GroupColor::Pink,
    GroupColor::Grey,
];

const HEX_TABLE: [(&str, GroupColor); 9] = [
    ("#4285F4", GroupColor::Blue),
    ("#EA4335", GroupColor::Red),
    ("#34A853", GroupColor::Green),
    ("#FBBC05", GroupColor::Yellow),
    ("#A142F4", GroupColor::Purple),
    ("#24C1E0", GroupColor::Cyan),
    ("#FA7B17", GroupColor::Orange),
    ("#F06292", GroupColor::Pink),
    ("#9AA0A6", GroupColor::Grey),
];

impl GroupColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupColor::Grey => "grey",
            GroupColor::Blue => "blue",
            GroupColor::Red => "red",
            GroupColor::Yellow => "yellow",
            GroupColor::Green => "green",
            GroupColor::Pink => "pink",
            GroupColor::Purple => "purple",
            GroupColor::Cyan => "cyan",
            GroupColor::Orange => "orange",
        }
    }

    pub fn from_name(name: &str) -> Option<GroupColor> {
        let color = match name.trim().to_ascii_lowercase().as_str() {
            "grey" | "gray" => GroupColor::Grey,
            "blue" => GroupColor::Blue,
            "red" => GroupColor::Red,
            "yellow" => GroupColor::Yellow,
            "green" => GroupColor::Green,
            "pink" => GroupColor::Pink,
            "purple" => GroupColor::Purple,
            "cyan" => GroupColor::Cyan,
            "orange" => GroupColor::Orange,
            _ => return None,
        };
        Some(color)
    }

    /// Resolve a user or classifier supplied color: a Chrome color name, or a
    /// `#rrggbb` value snapped to the nearest Chrome color. Anything else is blue.
    pub fn resolve(value: &str) -> GroupColor {
        let value = value.trim();
        if value.starts_with('#') {
            return nearest_to_hex(value).unwrap_or_default();
        }
        GroupColor::from_name(value).unwrap_or_default()
    }

    /// Like `resolve`, with blue for a missing value
    pub fn resolve_or_default(value: Option<&str>) -> GroupColor {
        value.map(GroupColor::resolve).unwrap_or_default()
    }

    pub fn palette(index: usize) -> GroupColor {
        AI_PALETTE[index % AI_PALETTE.len()]
    }
}

fn parse_rgb(hex: &str) -> Option<(i32, i32, i32)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| i32::from_str_radix(&digits[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn nearest_to_hex(hex: &str) -> Option<GroupColor> {
    if let Some((_, color)) = HEX_TABLE.iter().find(|(known, _)| known.eq_ignore_ascii_case(hex)) {
        return Some(*color);
    }

    let (r, g, b) = parse_rgb(hex)?;
    HEX_TABLE
        .iter()
        .filter_map(|(known, color)| {
            let (r2, g2, b2) = parse_rgb(known)?;
            let distance = (r - r2).pow(2) + (g - g2).pow(2) + (b - b2).pow(2);
            Some((distance, *color))
        })
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, color)| color)
}

/// Where a selectable color came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorOrigin {
    China,
    Japan,
    Chrome,
    Custom,
}

/// A user-visible color choice stored in settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorOption {
    pub name: String,
    pub value: String,
    pub label: String,
    pub origin: ColorOrigin,
}
