use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{BackboneError, Result};

/// The configuration surface spec §6 recognises, each field defaulted the
/// way the original's config getters default a missing key.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackboneConfig {
    pub net: NetConfig,
    pub account: AccountConfig,
    pub character: CharacterConfig,
    pub chat: ChatConfig,
    pub mail: MailConfig,
    pub game: GameConfig,
    pub command: CommandConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub account_listen_to_client_port: u16,
    pub game_listen_to_client_port: u16,
    pub chat_listen_to_client_port: u16,
    pub password: String,
    pub max_clients: u32,
    pub default_update_host: String,
    pub client_data_url: String,
    /// Host clients are told to dial for chat after `CharSelect` (the
    /// original's `net_publicChatHost`, falling back to `net_chatHost`).
    pub chat_host: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            account_listen_to_client_port: 9601,
            game_listen_to_client_port: 9601 + 3,
            chat_listen_to_client_port: 9601 + 2,
            password: String::new(),
            max_clients: 2000,
            default_update_host: String::new(),
            client_data_url: String::new(),
            chat_host: "localhost".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub max_characters: u8,
    pub allow_register: bool,
    pub deny_register_reason: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            max_characters: 3,
            allow_register: true,
            deny_register_reason: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub num_hair_styles: u8,
    pub num_hair_colors: u8,
    pub num_genders: u8,
    pub min_name_length: u8,
    pub max_name_length: u8,
    pub start_map: i16,
    pub start_x: i16,
    pub start_y: i16,
    pub starting_points: i32,
    pub attribute_min: i32,
    pub attribute_max: i32,
    pub modifiable_attributes: Vec<i16>,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            num_hair_styles: 6,
            num_hair_colors: 10,
            num_genders: 2,
            min_name_length: 4,
            max_name_length: 16,
            start_map: 1,
            start_x: 100,
            start_y: 100,
            starting_points: 60,
            attribute_min: 1,
            attribute_max: 20,
            modifiable_attributes: vec![1, 2, 3],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_channel_name_length: u8,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_channel_name_length: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub max_letters: u32,
    pub max_attachments: u32,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            max_letters: 100,
            max_attachments: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub floor_item_decay_time: u32,
    /// Static `(mapId, ownerServerName)` table consulted on `REGISTER` (spec
    /// §4.4 step 3) to decide which maps a newly connected game server owns.
    pub map_assignments: Vec<(i16, String)>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            floor_item_decay_time: 600,
            map_assignments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub default_mute_length: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            default_mute_length: 600,
        }
    }
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            net: NetConfig::default(),
            account: AccountConfig::default(),
            character: CharacterConfig::default(),
            chat: ChatConfig::default(),
            mail: MailConfig::default(),
            game: GameConfig::default(),
            command: CommandConfig::default(),
        }
    }
}

impl BackboneConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BackboneError::Config(format!("failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| BackboneError::Config(format!("failed to parse config file: {e}")))
    }

    /// Required non-empty per spec §6's `net_password` entry: an empty
    /// shared secret means every `GameLinkMessage::Register` would pass.
    pub fn validate(&self) -> Result<()> {
        if self.net.password.is_empty() {
            return Err(BackboneError::Config(
                "net.password must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BackboneConfig::default();
        assert_eq!(config.account.max_characters, 3);
        assert_eq!(config.character.modifiable_attributes, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_empty_shared_secret() {
        let config = BackboneConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml_content = r#"
[net]
password = "s3cret"
max_clients = 500
"#;
        let config: BackboneConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.net.password, "s3cret");
        assert_eq!(config.net.max_clients, 500);
        assert_eq!(config.account.max_characters, 3);
        assert!(config.validate().is_ok());
    }
}
