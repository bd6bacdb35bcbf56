use crate::os;
use crate::gfx;
use crate::Error;

use serde::{Deserialize, Serialize};

/// Default file name for the launch configuration, looked up next to the executable.
pub const CONFIG_FILE_NAME: &str = "nilwindows.json";

/// Imgui configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GuiConfig {
    /// Enable imgui docking
    pub docking: bool,
    /// Enable multi-viewports, gui windows dragged outside the main window get their own os window
    pub viewports: bool,
    /// Keyboard navigation of imgui windows
    pub nav_keyboard: bool,
    /// Submit a dock space covering the main viewport each frame
    pub dock_space: bool,
    /// Where imgui saves window layout, `None` disables saving
    pub ini_filename: Option<String>,
}

impl Default for GuiConfig {
    fn default() -> Self {
        GuiConfig {
            docking: true,
            viewports: true,
            nav_keyboard: true,
            dock_space: false,
            ini_filename: Some("imgui.ini".to_string()),
        }
    }
}

/// Serialisable launch configuration, every field has a default so partial files are valid
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Window title and window class name
    pub title: String,
    /// Main window rect {pos_x pos_y, width, height}
    pub window_rect: os::Rect<i32>,
    /// Allow the user to resize the main window
    pub resizable: bool,
    /// Number of buffers in the swap chain (2 for double buffered, 3 for tripple etc)
    pub num_buffers: u32,
    /// Clear colour of the back buffer each frame
    pub clear_colour: gfx::ClearColour,
    /// Present locked to vertical sync
    pub vsync: bool,
    /// Enable the d3d12 debug layer and dxgi debug factory
    pub debug_layer: bool,
    /// Optional name of gpu adaptor, use None for the default / primary device
    pub adapter_name: Option<String>,
    /// Size of the shader visible heap, the imgui font texture uses 1 slot
    pub shader_heap_size: usize,
    /// Draw the hard coded triangle
    pub draw_triangle: bool,
    pub gui: GuiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            title: "NilWindows".to_string(),
            window_rect: os::Rect {
                x: 100,
                y: 100,
                width: 1280,
                height: 720,
            },
            resizable: true,
            num_buffers: 2,
            clear_colour: gfx::ClearColour {
                r: 0.0,
                g: 0.2,
                b: 0.4,
                a: 1.0,
            },
            vsync: true,
            debug_layer: cfg!(debug_assertions),
            adapter_name: None,
            shader_heap_size: 1,
            draw_triangle: true,
            gui: GuiConfig::default(),
        }
    }
}

impl Config {
    /// Reads and validates a config from a json file at `path`
    pub fn load(path: &str) -> Result<Config, Error> {
        let data = std::fs::read(path)?;
        let config: Config = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the default config. A malformed file is still an error.
    pub fn load_or_default(path: &str) -> Result<Config, Error> {
        if std::path::Path::new(path).exists() {
            log::info!("nilwindows::config: loading {}", path);
            Config::load(path)
        }
        else {
            log::debug!("nilwindows::config: {} not found, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Writes the config as pretty json to `path`
    pub fn save(&self, path: &str) -> Result<(), Error> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Checks value ranges the device and swap chain depend on
    pub fn validate(&self) -> Result<(), Error> {
        if !(2..=16).contains(&self.num_buffers) {
            return Err(Error::Config(format!(
                "num_buffers must be in 2..=16, got {}", self.num_buffers)));
        }
        if self.shader_heap_size < 1 {
            return Err(Error::Config(
                "shader_heap_size must be at least 1 for the imgui font texture".to_string()));
        }
        if self.window_rect.width <= 0 || self.window_rect.height <= 0 {
            return Err(Error::Config(format!(
                "window_rect must have a positive size, got {}x{}",
                self.window_rect.width, self.window_rect.height)));
        }
        Ok(())
    }

    /// Window style flags derived from the config
    pub fn window_style(&self) -> os::WindowStyleFlags {
        if self.resizable {
            os::WindowStyleFlags::RESIZABLE
        }
        else {
            os::WindowStyleFlags::NONE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_buffers, 2);
        assert_eq!(config.shader_heap_size, 1);
        assert_eq!(config.clear_colour.g, 0.2);
        assert!(config.gui.docking);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{ "title": "custom", "gui": { "viewports": false } }"#).unwrap();
        assert_eq!(config.title, "custom");
        assert!(!config.gui.viewports);
        assert!(config.gui.docking);
        assert_eq!(config.window_rect, Config::default().window_rect);
    }

    #[test]
    fn out_of_range_buffers_rejected() {
        let config = Config {
            num_buffers: 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_heap_rejected() {
        let config = Config {
            shader_heap_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join("nilwindows_config_test.json");
        let path = path.to_str().unwrap();
        let config = Config {
            title: "saved".to_string(),
            num_buffers: 3,
            ..Default::default()
        };
        config.save(path).unwrap();
        let loaded = Config::load(path).unwrap();
        std::fs::remove_file(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_gives_default() {
        let config = Config::load_or_default("this/path/does/not/exist.json").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_is_error() {
        let path = std::env::temp_dir().join("nilwindows_config_malformed.json");
        let path = path.to_str().unwrap();
        std::fs::write(path, "{ not json").unwrap();
        let result = Config::load_or_default(path);
        std::fs::remove_file(path).unwrap();
        assert!(matches!(result, Err(Error::Json(_))));
    }
}
