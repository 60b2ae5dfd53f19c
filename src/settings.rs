use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const MAX_CASCADES: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowSettings {
    #[serde(default = "ShadowSettings::default_atlas_size")]
    pub atlas_size: u32,
    #[serde(default = "ShadowSettings::default_max_distance")]
    pub max_distance: f32,
    #[serde(default = "ShadowSettings::default_distance_fade")]
    pub distance_fade: f32,
    #[serde(default = "ShadowSettings::default_cascade_count")]
    pub cascade_count: u32,
    #[serde(default = "ShadowSettings::default_cascade_ratios")]
    pub cascade_ratios: [f32; MAX_CASCADES - 1],
    #[serde(default = "ShadowSettings::default_cascade_fade")]
    pub cascade_fade: f32,
    #[serde(default)]
    pub filter: FilterQuality,
    #[serde(default)]
    pub blend: CascadeBlend,
    #[serde(default)]
    pub shadowmask: ShadowmaskQuality,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            atlas_size: Self::default_atlas_size(),
            max_distance: Self::default_max_distance(),
            distance_fade: Self::default_distance_fade(),
            cascade_count: Self::default_cascade_count(),
            cascade_ratios: Self::default_cascade_ratios(),
            cascade_fade: Self::default_cascade_fade(),
            filter: FilterQuality::default(),
            blend: CascadeBlend::default(),
            shadowmask: ShadowmaskQuality::default(),
        }
    }
}

impl ShadowSettings {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ShadowSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded shadow settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default shadow settings.",
                        path, err
                    );
                    ShadowSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Shadow settings file {:?} not found. Using default settings.",
                    path
                );
                ShadowSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default shadow settings.",
                    path, err
                );
                ShadowSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.atlas_size == 0 || !self.atlas_size.is_power_of_two() {
            warn!(
                "Atlas size {} is not a power of two. Using default value.",
                self.atlas_size
            );
            self.atlas_size = Self::default_atlas_size();
        }

        if self.max_distance <= 0.0 {
            warn!("Max shadow distance must be positive. Using default value.");
            self.max_distance = Self::default_max_distance();
        }

        if self.distance_fade <= 0.0 || self.distance_fade > 1.0 {
            warn!("Distance fade must lie in (0, 1]. Using default value.");
            self.distance_fade = Self::default_distance_fade();
        }

        if self.cascade_count == 0 || self.cascade_count > MAX_CASCADES as u32 {
            warn!(
                "Cascade count {} outside 1..={}. Using default value.",
                self.cascade_count,
                MAX_CASCADES
            );
            self.cascade_count = Self::default_cascade_count();
        }

        // Ratios are fractions of max distance; the final 1.0 is implied.
        let mut previous = 0.0f32;
        let mut monotone = true;
        for ratio in self.cascade_ratios {
            if ratio <= previous || ratio > 1.0 {
                monotone = false;
                break;
            }
            previous = ratio;
        }
        if !monotone {
            warn!(
                "Cascade ratios {:?} are not strictly increasing within (0, 1]. Using defaults.",
                self.cascade_ratios
            );
            self.cascade_ratios = Self::default_cascade_ratios();
        }

        if self.cascade_fade < 0.0 || self.cascade_fade >= 1.0 {
            warn!("Cascade fade must lie in [0, 1). Using default value.");
            self.cascade_fade = Self::default_cascade_fade();
        }

        self
    }

    pub fn tile_count(&self, reserved_lights: u32) -> u32 {
        reserved_lights * self.cascade_count
    }

    const fn default_atlas_size() -> u32 {
        2048
    }

    const fn default_max_distance() -> f32 {
        100.0
    }

    const fn default_distance_fade() -> f32 {
        0.1
    }

    const fn default_cascade_count() -> u32 {
        4
    }

    const fn default_cascade_ratios() -> [f32; MAX_CASCADES - 1] {
        [0.1, 0.25, 0.5]
    }

    const fn default_cascade_fade() -> f32 {
        0.1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterQuality {
    #[default]
    Hard,
    Pcf3,
    Pcf5,
    Pcf7,
}

impl FilterQuality {
    /// Kernel ordinal: the number of extra texels a PCF tap may reach.
    pub fn ordinal(self) -> u32 {
        match self {
            FilterQuality::Hard => 0,
            FilterQuality::Pcf3 => 1,
            FilterQuality::Pcf5 => 2,
            FilterQuality::Pcf7 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CascadeBlend {
    #[default]
    Hard,
    Soft,
    Dither,
}

impl CascadeBlend {
    pub fn ordinal(self) -> u32 {
        match self {
            CascadeBlend::Hard => 0,
            CascadeBlend::Soft => 1,
            CascadeBlend::Dither => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShadowmaskQuality {
    Always,
    #[default]
    Distance,
}
