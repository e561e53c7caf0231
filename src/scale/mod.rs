use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};


/// ColorBrewer OrRd, 9 classes
pub const OR_RD_9: [&str; 9] = [
    "#fff7ec", "#fee8c8", "#fdd49e", "#fdbb84", "#fc8d59", "#ef6548", "#d7301f", "#b30000",
    "#7f0000",
];

/// ColorBrewer Greys, 9 classes
pub const GREYS_9: [&str; 9] = [
    "#ffffff", "#f0f0f0", "#d9d9d9", "#bdbdbd", "#969696", "#737373", "#525252", "#252525",
    "#000000",
];

/// Maps a data value onto a numeric visual channel (radius, opacity, axis position)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NumericScale {
    Linear { domain: [f64; 2], range: [f64; 2] },
    Sqrt { domain: [f64; 2], range: [f64; 2] },
    Log { domain: [f64; 2], range: [f64; 2] },
    Quantize { domain: [f64; 2], range: Vec<f64> },
    Threshold { domain: Vec<f64>, range: Vec<f64> },
}

impl NumericScale {
    pub fn linear(domain: [f64; 2], range: [f64; 2]) -> Self {
        NumericScale::Linear { domain, range }
    }

    pub fn sqrt(domain: [f64; 2], range: [f64; 2]) -> Self {
        NumericScale::Sqrt { domain, range }
    }

    /// `None` for non-finite input, or non-positive input to a log scale.
    pub fn apply(&self, x: f64) -> Option<f64> {
        if !x.is_finite() {
            return None;
        }
        match self {
            NumericScale::Linear { domain, range } => Some(interpolate(*domain, *range, x)),
            NumericScale::Sqrt { domain, range } => {
                let d = [signed_sqrt(domain[0]), signed_sqrt(domain[1])];
                Some(interpolate(d, *range, signed_sqrt(x)))
            }
            NumericScale::Log { domain, range } => {
                if x <= 0.0 || domain[0] <= 0.0 || domain[1] <= 0.0 {
                    return None;
                }
                let d = [domain[0].log10(), domain[1].log10()];
                Some(interpolate(d, *range, x.log10()))
            }
            NumericScale::Quantize { domain, range } => {
                quantize_index(*domain, range.len(), x).map(|i| range[i])
            }
            NumericScale::Threshold { domain, range } => {
                threshold_index(domain, range.len(), x).map(|i| range[i])
            }
        }
    }
}

/// Maps a data value onto a colour
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColorScale {
    Quantize { domain: [f64; 2], range: Vec<String> },
    Threshold { domain: Vec<f64>, range: Vec<String> },
}

impl ColorScale {
    pub fn quantize(domain: [f64; 2], palette: &[&str]) -> Self {
        ColorScale::Quantize {
            domain,
            range: palette.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn apply(&self, x: f64) -> Option<&str> {
        if !x.is_finite() {
            return None;
        }
        match self {
            ColorScale::Quantize { domain, range } => {
                quantize_index(*domain, range.len(), x).map(|i| range[i].as_str())
            }
            ColorScale::Threshold { domain, range } => {
                threshold_index(domain, range.len(), x).map(|i| range[i].as_str())
            }
        }
    }

    /// Largest domain value (where a colour-bar pointer saturates)
    pub fn domain_max(&self) -> Option<f64> {
        match self {
            ColorScale::Quantize { domain, .. } => Some(domain[0].max(domain[1])),
            ColorScale::Threshold { domain, .. } => domain.iter().copied().reduce(f64::max),
        }
    }
}

fn interpolate(domain: [f64; 2], range: [f64; 2], x: f64) -> f64 {
    let span = domain[1] - domain[0];
    let t = if span == 0.0 { 0.0 } else { (x - domain[0]) / span };
    range[0] + t * (range[1] - range[0])
}

fn signed_sqrt(x: f64) -> f64 {
    if x < 0.0 {
        -(-x).sqrt()
    } else {
        x.sqrt()
    }
}

/// Uniform bucket of `x` over `domain` split into `buckets` pieces (clamped)
pub(crate) fn quantize_index(domain: [f64; 2], buckets: usize, x: f64) -> Option<usize> {
    if buckets == 0 {
        return None;
    }
    let span = domain[1] - domain[0];
    if span == 0.0 {
        return Some(0);
    }
    let i = ((x - domain[0]) / span * buckets as f64).floor();
    Some(i.clamp(0.0, (buckets - 1) as f64) as usize)
}

/// Number of thresholds `<= x`, capped at the last range slot
pub(crate) fn threshold_index(thresholds: &[f64], slots: usize, x: f64) -> Option<usize> {
    if slots == 0 {
        return None;
    }
    let i = thresholds.iter().take_while(|t| **t <= x).count();
    Some(i.min(slots - 1))
}

/// A node attribute paired with the scale that styles it
/// (the `[attribute, scale]` pairs of the `node_attr_2_*` options)
#[derive(Clone, Debug, PartialEq)]
pub struct AttrBinding<S> {
    pub attribute: String,
    pub scale: S,
}

impl<S> AttrBinding<S> {
    pub fn new(attribute: impl Into<String>, scale: S) -> Self {
        Self {
            attribute: attribute.into(),
            scale,
        }
    }
}

impl<'de, S: Deserialize<'de>> Deserialize<'de> for AttrBinding<S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (attribute, scale) = <(String, S)>::deserialize(deserializer)?;
        Ok(Self { attribute, scale })
    }
}

impl<S: Serialize> Serialize for AttrBinding<S> {
    fn serialize<Z: Serializer>(&self, serializer: Z) -> Result<Z::Ok, Z::Error> {
        (&self.attribute, &self.scale).serialize(serializer)
    }
}
