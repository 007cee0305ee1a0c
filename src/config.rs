use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Deserialize;

use crate::assistant::persona::{self, DEFAULT_PERSONA, Persona};

pub const DEFAULT_PROXY_URL: &str = "http://localhost:3000";
pub const DEFAULT_API_URL: &str = "http://localhost:3333";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const TOKEN_ENV: &str = "LEGIS_API_TOKEN";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProfileConfig {
    pub proxy_url: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub persona: Option<String>,
    pub function_calling: Option<bool>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaConfig {
    pub prompt: String,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    profiles: Option<HashMap<String, ProfileConfig>>,
    personas: Option<BTreeMap<String, PersonaConfig>>,
}

impl ConfigFile {
    fn persona_prompts(&self) -> BTreeMap<String, String> {
        self.personas
            .iter()
            .flatten()
            .map(|(name, persona)| (name.clone(), persona.prompt.clone()))
            .collect()
    }
}

fn read_config(path: &PathBuf) -> Result<ConfigFile, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;

    toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))
}

/// Like [`read_config`], but a missing file is an empty config.
fn read_optional_config(path: &PathBuf) -> Result<ConfigFile, String> {
    match fs::metadata(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(ConfigFile::default()),
        _ => read_config(path),
    }
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, String> {
    let path = config_path()?;
    let config = read_config(&path)?;
    find_profile(config, name, &path)
}

fn find_profile(config: ConfigFile, name: &str, path: &PathBuf) -> Result<ProfileConfig, String> {
    let profiles = config.profiles.ok_or_else(|| {
        format!(
            "Config file '{}' does not contain a [profiles] section.",
            path.display()
        )
    })?;

    profiles.get(name).cloned().ok_or_else(|| {
        format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        )
    })
}

/// Persona prompts declared in the config file, if any.
pub fn load_personas() -> Result<BTreeMap<String, String>, String> {
    let path = config_path()?;
    Ok(read_optional_config(&path)?.persona_prompts())
}

/// Parses the config file and checks the selected profile, if any.
pub fn validate_config(profile: Option<&str>) -> Result<PathBuf, String> {
    let path = config_path()?;
    let config = read_config(&path)?;
    let personas = config.persona_prompts();

    if let Some(name) = profile {
        let selected = find_profile(config, name, &path)?;
        check_profile(name, &selected, &personas)?;
    } else {
        for (name, selected) in config.profiles.iter().flatten() {
            check_profile(name, selected, &personas)?;
        }
    }

    Ok(path)
}

fn check_profile(
    name: &str,
    profile: &ProfileConfig,
    personas: &BTreeMap<String, String>,
) -> Result<(), String> {
    for (field, value) in [("proxy_url", &profile.proxy_url), ("api_url", &profile.api_url)] {
        if let Some(url) = value {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!(
                    "Invalid profile {field} '{url}' in profile '{name}': expected an http(s) URL."
                ));
            }
        }
    }
    if let Some(selected) = &profile.persona {
        if persona::resolve(selected, personas).is_none() {
            return Err(format!(
                "Invalid profile persona '{selected}' in profile '{name}'."
            ));
        }
    }
    Ok(())
}

fn config_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var("LEGIS_CONFIG") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed).join("legis").join("config.toml"));
        }
    }

    let home = env::var("HOME").map_err(|_| {
        "Cannot resolve config path: set LEGIS_CONFIG or HOME/XDG_CONFIG_HOME.".to_string()
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("legis")
        .join("config.toml"))
}

/// Values given on the command line; `None` falls through to env and profile.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub profile: Option<String>,
    pub proxy_url: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub persona: Option<String>,
    pub timeout: Option<u64>,
    pub no_tools: bool,
}

/// Fully resolved connection and chat settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub proxy_url: String,
    pub api_url: String,
    pub model: String,
    pub persona: Persona,
    pub function_calling: bool,
    /// Connect timeout for both clients; also bounds backend and title calls.
    pub timeout_secs: Option<u64>,
    pub token: Option<String>,
}

impl Settings {
    /// Resolves CLI > environment > profile > defaults.
    pub fn resolve(overrides: &Overrides) -> Result<Self, String> {
        let profile = match &overrides.profile {
            Some(name) => load_profile(name)?,
            None => ProfileConfig::default(),
        };
        let personas = load_personas()?;
        Self::resolve_with(overrides, profile, &personas, |key| env::var(key).ok())
    }

    pub fn resolve_with<F>(
        overrides: &Overrides,
        profile: ProfileConfig,
        personas: &BTreeMap<String, String>,
        env_var: F,
    ) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = |key: &str| env_var(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        let env_timeout = from_env("LEGIS_TIMEOUT")
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|_| format!("Invalid LEGIS_TIMEOUT '{raw}'. Expected seconds."))
            })
            .transpose()?;

        let persona_name = overrides
            .persona
            .clone()
            .or_else(|| from_env("LEGIS_PERSONA"))
            .or(profile.persona)
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string());
        let persona = persona::resolve(&persona_name, personas).ok_or_else(|| {
            let known: Vec<_> = persona::personas(personas).into_keys().collect();
            format!(
                "Unknown persona '{persona_name}'. Available: {}.",
                known.join(", ")
            )
        })?;

        Ok(Self {
            proxy_url: overrides
                .proxy_url
                .clone()
                .or_else(|| from_env("LEGIS_PROXY_URL"))
                .or(profile.proxy_url)
                .unwrap_or_else(|| DEFAULT_PROXY_URL.to_string()),
            api_url: overrides
                .api_url
                .clone()
                .or_else(|| from_env("LEGIS_API_URL"))
                .or(profile.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: overrides
                .model
                .clone()
                .or_else(|| from_env("LEGIS_MODEL"))
                .or(profile.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            persona,
            function_calling: !overrides.no_tools && profile.function_calling.unwrap_or(true),
            timeout_secs: overrides.timeout.or(env_timeout).or(profile.timeout),
            token: from_env(TOKEN_ENV),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let settings =
            Settings::resolve_with(&Overrides::default(), ProfileConfig::default(), &BTreeMap::new(), no_env)
                .unwrap();

        assert_eq!(settings.proxy_url, DEFAULT_PROXY_URL);
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.persona.name, DEFAULT_PERSONA);
        assert!(settings.function_calling);
        assert_eq!(settings.timeout_secs, None);
        assert_eq!(settings.token, None);
    }

    #[test]
    fn cli_beats_env_beats_profile() {
        let profile = ProfileConfig {
            model: Some("profile-model".to_string()),
            api_url: Some("https://profile".to_string()),
            proxy_url: Some("https://profile-proxy".to_string()),
            timeout: Some(7),
            ..ProfileConfig::default()
        };
        let env = |key: &str| match key {
            "LEGIS_MODEL" => Some("env-model".to_string()),
            "LEGIS_API_URL" => Some("https://env".to_string()),
            "LEGIS_TIMEOUT" => Some("21".to_string()),
            _ => None,
        };
        let overrides = Overrides {
            model: Some("cli-model".to_string()),
            ..Overrides::default()
        };

        let settings = Settings::resolve_with(&overrides, profile, &BTreeMap::new(), env).unwrap();

        assert_eq!(settings.model, "cli-model");
        assert_eq!(settings.api_url, "https://env");
        assert_eq!(settings.proxy_url, "https://profile-proxy");
        assert_eq!(settings.timeout_secs, Some(21));
    }

    #[test]
    fn no_tools_flag_wins_over_profile() {
        let profile = ProfileConfig {
            function_calling: Some(true),
            ..ProfileConfig::default()
        };
        let overrides = Overrides {
            no_tools: true,
            ..Overrides::default()
        };
        let settings = Settings::resolve_with(&overrides, profile, &BTreeMap::new(), no_env).unwrap();
        assert!(!settings.function_calling);
    }

    #[test]
    fn invalid_env_timeout_is_reported() {
        let env = |key: &str| (key == "LEGIS_TIMEOUT").then(|| "soon".to_string());
        let err = Settings::resolve_with(&Overrides::default(), ProfileConfig::default(), &BTreeMap::new(), env)
            .unwrap_err();
        assert_eq!(err, "Invalid LEGIS_TIMEOUT 'soon'. Expected seconds.");
    }

    #[test]
    fn unknown_persona_lists_available_ones() {
        let overrides = Overrides {
            persona: Some("astrologo".to_string()),
            ..Overrides::default()
        };
        let err = Settings::resolve_with(&overrides, ProfileConfig::default(), &BTreeMap::new(), no_env)
            .unwrap_err();
        assert_eq!(
            err,
            "Unknown persona 'astrologo'. Available: contabil, legislativo, politico."
        );
    }

    #[test]
    fn token_is_read_from_env_only() {
        let env = |key: &str| (key == TOKEN_ENV).then(|| " secret ".to_string());
        let settings =
            Settings::resolve_with(&Overrides::default(), ProfileConfig::default(), &BTreeMap::new(), env)
                .unwrap();
        assert_eq!(settings.token.as_deref(), Some("secret"));
    }
}
