use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{anyhow, Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub legend: LegendConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub graticule: GraticuleConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub geojson: PathBuf,
    #[serde(default = "default_year")]
    pub year: String, // key into data.population
}

fn default_year() -> String {
    "2022".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self { width: 960.0, height: 500.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScaleConfig {
    pub domain: [f64; 2],
    pub palette: Vec<String>, // Hex codes, low to high
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            domain: crate::scale::POPULATION_DOMAIN,
            palette: crate::scale::BLUES_7.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LegendConfig {
    pub min_label: String,
    pub max_label: String,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self { min_label: "0".to_string(), max_label: "13M".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InteractionConfig {
    pub focus_scale: f64,
    pub transition_ms: f64,
    pub tooltip_offset: [f64; 2],
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self { focus_scale: 1.75, transition_ms: 1000.0, tooltip_offset: [20.0, 0.0] }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraticuleConfig {
    pub step: f64,   // degrees between lines
    pub margin: f64, // degrees drawn past the visible area
}

impl Default for GraticuleConfig {
    fn default() -> Self {
        Self { step: 1.0, margin: 1.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub svg: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { svg: PathBuf::from("output/map.svg") }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080, static_dir: PathBuf::from("static") }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scale.palette.is_empty() {
            return Err(anyhow!("scale.palette must contain at least one color"));
        }
        if !(self.scale.domain[0] < self.scale.domain[1]) {
            return Err(anyhow!(
                "scale.domain must be ascending, got {:?}",
                self.scale.domain
            ));
        }
        if self.canvas.width <= 0.0 || self.canvas.height <= 0.0 {
            return Err(anyhow!(
                "canvas must have a positive size, got {}x{}",
                self.canvas.width,
                self.canvas.height
            ));
        }
        if self.graticule.step <= 0.0 {
            return Err(anyhow!("graticule.step must be positive"));
        }
        Ok(())
    }
}
