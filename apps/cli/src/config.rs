use std::{collections::HashMap, fs, path::Path};

use client_core::SessionConfig;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub session: SessionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".into(),
            session: SessionConfig::default(),
        }
    }
}

pub fn load_settings(config_path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(error = %err, "config: ignoring unreadable config file");
            return;
        }
    };

    if let Some(v) = file_cfg.get("server_url") {
        settings.server_url = v.clone();
    }
    if let Some(v) = file_cfg.get("endpoint") {
        settings.session.endpoint = v.clone();
    }
    if let Some(v) = file_cfg.get("topic") {
        settings.session.topic = v.clone();
    }
    if let Some(v) = file_cfg.get("join_destination") {
        settings.session.join_destination = v.clone();
    }
    if let Some(v) = file_cfg.get("chat_destination") {
        settings.session.chat_destination = v.clone();
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CHAT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = var("APP__ENDPOINT") {
        settings.session.endpoint = v;
    }
    if let Some(v) = var("APP__TOPIC") {
        settings.session.topic = v;
    }
    if let Some(v) = var("APP__JOIN_DESTINATION") {
        settings.session.join_destination = v;
    }
    if let Some(v) = var("APP__CHAT_DESTINATION") {
        settings.session.chat_destination = v;
    }
}
