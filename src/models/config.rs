use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Settings declared by the user configuration script (`rc.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default = "default_homepage")]
    pub homepage: String,

    #[serde(default)]
    pub window: WindowSettings,

    /// Search engine name to URL template containing `%s`.
    #[serde(default)]
    pub search_engines: IndexMap<String, String>,

    /// Key into `search_engines` used for bare words typed as a target.
    #[serde(default)]
    pub default_search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default)]
    pub fullscreen: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fullscreen: false,
        }
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            homepage: default_homepage(),
            window: WindowSettings::default(),
            search_engines: IndexMap::new(),
            default_search: None,
        }
    }
}

fn default_homepage() -> String {
    "about:blank".to_string()
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

impl UserSettings {
    /// Semantic checks the deserializer cannot express.
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.homepage.trim().is_empty() {
            return Err("homepage must not be empty".to_string());
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(format!(
                "window size {}x{} is not drawable",
                self.window.width, self.window.height
            ));
        }
        if let Some((name, _)) = self
            .search_engines
            .iter()
            .find(|(_, template)| !template.contains("%s"))
        {
            return Err(format!("search engine '{}' has no %s placeholder", name));
        }
        if let Some(default) = &self.default_search {
            if !self.search_engines.contains_key(default) {
                return Err(format!("default_search '{}' is not a known engine", default));
            }
        }
        Ok(())
    }

    /// URL for a search on the default engine, if one is configured.
    pub fn search_url(&self, terms: &str) -> Option<String> {
        let engine = self.default_search.as_ref()?;
        let template = self.search_engines.get(engine)?;
        Some(template.replace("%s", terms))
    }
}
